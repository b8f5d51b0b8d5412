use std::fmt;

use thiserror::Error;

use super::keyboard::LinkState;

/// Number of slots in the transmit ring. One slot always stays empty so that
/// a full ring can be told apart from an empty one.
pub const QUEUE_LEN: usize = 8;
const _: () = assert!(QUEUE_LEN.is_power_of_two());

/// A byte waiting to be sent, and the state the link adopts once it has
/// gone out.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PendingFrame {
    pub state: LinkState,
    pub byte: u8,
}

impl PendingFrame {
    pub const fn new(state: LinkState, byte: u8) -> Self {
        Self { state, byte }
    }
}

impl fmt::Debug for PendingFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} ({:?})", self.byte, self.state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("transmit queue full, dropped {0:?}")]
pub struct QueueFull(pub PendingFrame);

/// Fixed-capacity FIFO of frames waiting for the link to go idle.
#[derive(Debug, Clone)]
pub struct TransmitQueue {
    slots: [PendingFrame; QUEUE_LEN],
    read: usize,
    write: usize,
}

impl Default for TransmitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TransmitQueue {
    pub fn new() -> Self {
        Self {
            slots: [PendingFrame::new(LinkState::Idle, 0); QUEUE_LEN],
            read: 0,
            write: 0,
        }
    }

    fn next(index: usize) -> usize {
        (index + 1) & (QUEUE_LEN - 1)
    }

    /// Frames the queue can hold at once.
    pub const fn capacity(&self) -> usize {
        QUEUE_LEN - 1
    }

    pub fn len(&self) -> usize {
        self.write.wrapping_sub(self.read) & (QUEUE_LEN - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    pub fn is_full(&self) -> bool {
        Self::next(self.write) == self.read
    }

    pub fn enqueue(&mut self, frame: PendingFrame) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull(frame));
        }
        self.slots[self.write] = frame;
        self.write = Self::next(self.write);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<PendingFrame> {
        if self.is_empty() {
            return None;
        }
        let frame = self.slots[self.read];
        self.read = Self::next(self.read);
        Some(frame)
    }

    pub fn peek(&self) -> Option<&PendingFrame> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[self.read])
        }
    }

    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Queued frames, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PendingFrame> + '_ {
        (0..self.len()).map(move |i| &self.slots[(self.read + i) & (QUEUE_LEN - 1)])
    }
}
