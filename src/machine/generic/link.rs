use std::sync::mpsc;

use tracing::trace;

/// One end of a byte-oriented serial link.
///
/// Sending is fire-and-forget and receiving never blocks: at most one byte is
/// returned per call, so a caller that polls at a steady cadence sees the
/// link's bytes one at a time.
pub trait Transport {
    fn transmit_byte(&mut self, byte: u8);
    fn poll_receive(&mut self) -> Option<u8>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transmit_byte(&mut self, byte: u8) {
        (**self).transmit_byte(byte)
    }

    fn poll_receive(&mut self) -> Option<u8> {
        (**self).poll_receive()
    }
}

/// An in-memory link end. Created in connected pairs: whatever one end
/// transmits, the other end receives.
pub struct ChannelTransport {
    pub rx: mpsc::Receiver<u8>,
    pub tx: mpsc::Sender<u8>,
    name: &'static str,
}

impl ChannelTransport {
    pub fn pair(a: &'static str, b: &'static str) -> (ChannelTransport, ChannelTransport) {
        let (tx, rx2) = mpsc::channel();
        let (tx2, rx) = mpsc::channel();
        (
            Self { rx, tx, name: a },
            Self {
                rx: rx2,
                tx: tx2,
                name: b,
            },
        )
    }

    /// Collect every byte currently waiting on this end.
    pub fn drain(&mut self) -> Vec<u8> {
        self.rx.try_iter().collect()
    }
}

impl Transport for ChannelTransport {
    fn transmit_byte(&mut self, byte: u8) {
        trace!("{} pipe send {byte:02X}", self.name);
        // A hung-up peer simply stops listening; the link has no error path.
        _ = self.tx.send(byte);
    }

    fn poll_receive(&mut self) -> Option<u8> {
        let byte = self.rx.try_recv().ok()?;
        trace!("{} pipe receive {byte:02X}", self.name);
        Some(byte)
    }
}
