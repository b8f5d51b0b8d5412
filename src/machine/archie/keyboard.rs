//! # Archimedes keyboard link, keyboard side.
//!
//! The keyboard owns a single-outstanding-byte link: every data byte it sends
//! must be acknowledged by the controller before the next one goes out. Key
//! and mouse events that arrive while a byte is in flight wait in a small
//! ring buffer. Acknowledgments that never arrive are abandoned after a
//! timeout, and a reset handshake (`HRST`, `RAK1`, `RAK2`) resynchronizes
//! both ends whenever either side gets confused.
//!
//! Everything runs from [`ArchieKeyboard::poll`] and the `submit_*` calls on
//! one thread of control; nothing blocks and timeouts are polled.

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::machine::generic::link::Transport;
use crate::machine::generic::timer::{Clock, Timestamp};

use super::buttons::ButtonState;
use super::key::KeyEvent;
use super::mouse::MouseAccumulator;
use super::protocol::{Command, HRST, KBID, KEYBOARD_ID, Leds, ModeFlags, PDAT, RAK1, RAK2};
use super::queue::{PendingFrame, QueueFull, TransmitQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Waiting for the controller to start a handshake
    AwaitingHardReset,
    /// `HRST` sent, waiting for `RAK1`
    AwaitingAck1,
    /// `RAK1` echoed, waiting for `RAK2`
    AwaitingAck2,
    Idle,
    /// First byte of a pair sent, waiting for `BACK`
    WaitingAckByte1,
    /// Second byte of a pair sent, waiting for a mode ack
    WaitingAckByte2,
    /// Quiet period after an acknowledgment
    HoldOff,
}

impl LinkState {
    pub fn in_handshake(self) -> bool {
        matches!(
            self,
            LinkState::AwaitingHardReset | LinkState::AwaitingAck1 | LinkState::AwaitingAck2
        )
    }

    pub fn awaiting_ack(self) -> bool {
        matches!(self, LinkState::WaitingAckByte1 | LinkState::WaitingAckByte2)
    }
}

/// Link timing, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// How long to wait for the acknowledgment of a data byte
    pub ack_timeout_ms: u64,
    /// How long to wait for each step of the reset handshake
    pub handshake_timeout_ms: u64,
    /// Optional quiet period after each acknowledgment
    pub hold_off_ms: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 10,
            handshake_timeout_ms: 20,
            hold_off_ms: None,
        }
    }
}

/// Running counters for everything the link recovers from on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub queue_overflows: u64,
    pub ack_timeouts: u64,
    pub handshake_timeouts: u64,
    pub protocol_violations: u64,
    pub resets: u64,
}

/// Link faults. None of these are fatal; each one is counted, logged and
/// resolved by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("tx queue overflow, dropped {frame:?}")]
    QueueOverflow { frame: PendingFrame },
    #[error("ack timeout in {state:?}, frame abandoned")]
    AckTimeout { state: LinkState },
    #[error("handshake timeout in {state:?}, restarting")]
    HandshakeTimeout { state: LinkState },
    #[error("unexpected {byte:02X} in {state:?}, resetting")]
    ProtocolViolation { state: LinkState, byte: u8 },
}

impl From<QueueFull> for LinkError {
    fn from(err: QueueFull) -> Self {
        LinkError::QueueOverflow { frame: err.0 }
    }
}

pub struct ArchieKeyboard<T, C> {
    transport: T,
    clock: C,
    config: LinkConfig,

    state: LinkState,
    ack_timeout: Timestamp,
    hold_off_timeout: Timestamp,
    mode: ModeFlags,
    queue: TransmitQueue,
    mouse: MouseAccumulator,
    buttons: ButtonState,
    leds: Leds,

    stats: LinkStats,
}

impl<T: Transport, C: Clock> ArchieKeyboard<T, C> {
    /// Create a keyboard waiting for the controller's `HRST`. If none arrives
    /// within the handshake timeout, the keyboard starts the handshake itself.
    pub fn new(transport: T, clock: C, config: LinkConfig) -> Self {
        let ack_timeout = clock.deadline(config.handshake_timeout_ms);
        Self {
            transport,
            clock,
            config,
            state: LinkState::AwaitingHardReset,
            ack_timeout,
            hold_off_timeout: Timestamp::default(),
            mode: ModeFlags::default(),
            queue: TransmitQueue::new(),
            mouse: MouseAccumulator::new(),
            buttons: ButtonState::new(),
            leds: Leds::default(),
            stats: LinkStats::default(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn mode(&self) -> ModeFlags {
        self.mode
    }

    pub fn leds(&self) -> Leds {
        self.leds
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn queue(&self) -> &TransmitQueue {
        &self.queue
    }

    pub fn mouse(&self) -> &MouseAccumulator {
        &self.mouse
    }

    pub fn buttons(&self) -> ButtonState {
        self.buttons
    }

    /// Drop all link state and restart the handshake from scratch.
    pub fn reset(&mut self) {
        info!("KBD reset");
        self.stats.resets += 1;
        self.clear();
        self.ack_timeout = self.clock.deadline(self.config.handshake_timeout_ms);
    }

    /// Report a key transition. `identifier` is the key's matrix position.
    pub fn submit_key(&mut self, identifier: u16, pressed: bool) {
        self.submit_key_event(KeyEvent::new(identifier, pressed));
    }

    /// Report a key transition packed as a code with bit 15 set on release.
    pub fn submit_key_code(&mut self, code: u16) {
        self.submit_key_event(KeyEvent::from_code(code));
    }

    fn submit_key_event(&mut self, event: KeyEvent) {
        trace!("KBD key {event:?}");

        if self.state.in_handshake() {
            debug!("KBD still in reset, key ignored");
            return;
        }
        if !self.mode.scan_enabled {
            debug!("KBD keyboard scan is disabled, key ignored");
            return;
        }

        let [row, column] = event.to_bytes();
        self.send_pair(row, column);
    }

    /// Report a mouse sample: the current button mask and the motion since
    /// the previous sample, in host coordinates (y grows downwards).
    pub fn submit_mouse(&mut self, buttons: u8, dx: i8, dy: i8) {
        trace!("KBD mouse x:{dx} y:{dy} b:{buttons:03b}");

        // Motion is gathered even while the link is down
        self.mouse.accumulate(dx as i16, -(dy as i16));

        if self.state.in_handshake() {
            debug!("KBD still in reset, mouse held");
            return;
        }

        if self.mode.mouse_enabled && !self.mouse.is_zero() && self.is_idle() {
            self.flush_mouse();
        }

        if self.mode.scan_enabled {
            for edge in self.buttons.changes(buttons) {
                let [row, column] = edge.frame;
                if self.send_pair(row, column) {
                    self.buttons.record(edge);
                }
            }
        }
    }

    /// Advance the link: expire timers, then handle at most one byte from the
    /// controller.
    pub fn poll(&mut self) {
        if self.state == LinkState::HoldOff && self.clock.expired(self.hold_off_timeout) {
            trace!("KBD resume after hold off");
            self.state = LinkState::Idle;
            self.drain();
        }

        if self.state.awaiting_ack() && self.clock.expired(self.ack_timeout) {
            self.report(LinkError::AckTimeout { state: self.state });
            self.state = LinkState::Idle;
            self.drain();
        }

        if self.state.in_handshake() && self.clock.expired(self.ack_timeout) {
            if self.state == LinkState::AwaitingHardReset {
                debug!("KBD no reset from controller, starting handshake");
            } else {
                self.report(LinkError::HandshakeTimeout { state: self.state });
            }
            self.clear();
            self.start_handshake();
        }

        if let Some(byte) = self.transport.poll_receive() {
            self.stats.bytes_received += 1;
            trace!("KBD RX {byte:02X}");
            self.receive(byte);
        }
    }

    fn receive(&mut self, byte: u8) {
        let command = Command::from(byte);
        match (self.state, command) {
            (_, Command::HardReset) => {
                info!("KBD reset requested by controller");
                self.stats.resets += 1;
                self.clear();
                self.start_handshake();
            }
            (LinkState::AwaitingHardReset, _) => {
                debug!("KBD ignoring {command:?} while awaiting reset");
            }
            (LinkState::AwaitingAck1, Command::ResetAck1) => {
                self.transmit(LinkState::AwaitingAck2, RAK1);
                self.ack_timeout = self.clock.deadline(self.config.handshake_timeout_ms);
            }
            (LinkState::AwaitingAck2, Command::ResetAck2) => {
                self.transmit(LinkState::Idle, RAK2);
                self.ack_timeout = self.clock.deadline(self.config.handshake_timeout_ms);
                info!("KBD handshake complete");
            }
            (LinkState::AwaitingAck1 | LinkState::AwaitingAck2, _) => self.violation(byte),
            (_, Command::ResetAck1 | Command::ResetAck2) => self.violation(byte),

            (LinkState::WaitingAckByte1, Command::ByteAck) => self.acknowledged(),
            (_, Command::ByteAck) => self.violation(byte),
            (LinkState::WaitingAckByte1, Command::ModeAck(_)) => self.violation(byte),
            (_, Command::ModeAck(mode)) => {
                self.set_mode(mode);
                self.acknowledged();
            }

            (_, Command::RequestId) => self.send(PendingFrame::new(
                LinkState::Idle,
                KBID | KEYBOARD_ID,
            )),
            (_, Command::RequestPeripheralData(data)) => {
                self.send(PendingFrame::new(LinkState::Idle, PDAT | data))
            }
            (_, Command::RequestMouse) => self.flush_mouse(),
            (_, Command::Leds(leds)) => {
                debug!("KBD {leds:?}");
                self.leds = leds;
            }
            (_, Command::PeripheralReset) => {}
            (_, Command::Unknown(byte)) => {
                debug!("KBD ignoring unknown command {byte:02X}");
            }
        }
    }

    fn set_mode(&mut self, mode: ModeFlags) {
        if mode.scan_enabled != self.mode.scan_enabled {
            if mode.scan_enabled {
                debug!("KBD enabling key scanning");
            } else {
                debug!("KBD disabling key scanning");
            }
        }
        if mode.mouse_enabled != self.mode.mouse_enabled {
            if mode.mouse_enabled {
                debug!("KBD enabling mouse");
            } else {
                debug!("KBD disabling mouse");
            }
        }
        self.mode = mode;
    }

    /// The controller accepted the byte in flight.
    fn acknowledged(&mut self) {
        match self.config.hold_off_ms {
            Some(ms) => {
                trace!("KBD starting hold off");
                self.state = LinkState::HoldOff;
                self.hold_off_timeout = self.clock.deadline(ms);
            }
            None => {
                self.state = LinkState::Idle;
                self.drain();
            }
        }
    }

    fn violation(&mut self, byte: u8) {
        self.report(LinkError::ProtocolViolation {
            state: self.state,
            byte,
        });
        self.clear();
        self.ack_timeout = self.clock.deadline(self.config.handshake_timeout_ms);
    }

    fn report(&mut self, error: LinkError) {
        match error {
            LinkError::QueueOverflow { .. } => self.stats.queue_overflows += 1,
            LinkError::AckTimeout { .. } => self.stats.ack_timeouts += 1,
            LinkError::HandshakeTimeout { .. } => self.stats.handshake_timeouts += 1,
            LinkError::ProtocolViolation { .. } => self.stats.protocol_violations += 1,
        }
        warn!("KBD {error}");
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.state = LinkState::AwaitingHardReset;
        self.mode = ModeFlags::default();
        self.mouse.clear();
        self.buttons.clear();
    }

    fn is_idle(&self) -> bool {
        self.state == LinkState::Idle && self.queue.is_empty()
    }

    fn start_handshake(&mut self) {
        self.transmit(LinkState::AwaitingAck1, HRST);
        self.ack_timeout = self.clock.deadline(self.config.handshake_timeout_ms);
    }

    fn flush_mouse(&mut self) {
        let (x, y) = self.mouse.to_bytes();
        if self.send_pair(x, y) {
            self.mouse.clear();
        }
    }

    fn transmit(&mut self, state: LinkState, byte: u8) {
        trace!("KBD TX {byte:02X} ({state:?})");
        self.transport.transmit_byte(byte);
        self.stats.bytes_sent += 1;
        self.state = state;
        self.ack_timeout = self.clock.deadline(self.config.ack_timeout_ms);
    }

    /// Send a two-byte data frame, or drop it whole if the queue can't take
    /// every byte that would have to wait. Returns false if it was dropped.
    fn send_pair(&mut self, first: u8, second: u8) -> bool {
        let first = PendingFrame::new(LinkState::WaitingAckByte1, first);
        let second = PendingFrame::new(LinkState::WaitingAckByte2, second);

        let waiting = if self.is_idle() { 1 } else { 2 };
        if self.queue.capacity() - self.queue.len() < waiting {
            self.report(LinkError::QueueOverflow { frame: first });
            return false;
        }
        self.send(first);
        self.send(second);
        true
    }

    /// Transmit now if the link is idle, otherwise queue behind whatever is
    /// already waiting.
    fn send(&mut self, frame: PendingFrame) {
        if self.is_idle() {
            self.transmit(frame.state, frame.byte);
            return;
        }

        match self.queue.enqueue(frame) {
            Ok(()) => trace!("KBD ENQUEUE {frame:?}"),
            Err(err) => self.report(err.into()),
        }
        if self.state == LinkState::Idle {
            self.drain();
        }
    }

    /// Send queued frames until one of them needs an acknowledgment.
    fn drain(&mut self) {
        while self.state == LinkState::Idle {
            let Some(frame) = self.queue.dequeue() else {
                break;
            };
            self.transmit(frame.state, frame.byte);
        }
    }
}
