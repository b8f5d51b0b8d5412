//! Controller end of the keyboard link, as the computer's keyboard interface
//! drives it: start the reset handshake, grant a scan/mouse mode, and
//! acknowledge every data byte, `BACK` for the first of a pair and the mode
//! ack for the second.

use std::collections::VecDeque;

use tracing::{debug, info, trace, warn};

use crate::machine::generic::link::Transport;

use super::buttons::BUTTON_ROW;
use super::protocol::{Command, Leds, ModeFlags, Reply};

/// Something the keyboard told the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardMessage {
    HandshakeComplete,
    Key { id: u8, pressed: bool },
    /// Mouse button, by protocol column (0 left, 1 middle, 2 right)
    Button { column: u8, pressed: bool },
    /// Mouse motion, y growing upwards
    Mouse { dx: i8, dy: i8 },
    KeyboardId(u8),
    PeripheralData(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Offline,
    AwaitHardReset,
    AwaitAck1,
    AwaitAck2,
    Ready,
}

pub struct Controller<T> {
    transport: T,
    phase: Phase,
    mode: ModeFlags,
    first: Option<Reply>,
    messages: VecDeque<KeyboardMessage>,
    drop_every: Option<u32>,
    data_count: u32,
}

impl<T: Transport> Controller<T> {
    pub fn new(transport: T, mode: ModeFlags) -> Self {
        Self {
            transport,
            phase: Phase::Offline,
            mode,
            first: None,
            messages: VecDeque::new(),
            drop_every: None,
            data_count: 0,
        }
    }

    /// Ignore every `n`th data byte, as if it were lost on the wire.
    pub fn with_drop_every(mut self, n: u32) -> Self {
        self.drop_every = Some(n).filter(|&n| n > 0);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn mode(&self) -> ModeFlags {
        self.mode
    }

    /// Begin (or restart) the reset handshake.
    pub fn start(&mut self) {
        debug!("IOC starting handshake");
        self.first = None;
        self.phase = Phase::AwaitHardReset;
        self.send(Command::HardReset);
    }

    pub fn request_id(&mut self) {
        self.send(Command::RequestId);
    }

    pub fn request_mouse(&mut self) {
        self.send(Command::RequestMouse);
    }

    pub fn request_peripheral_data(&mut self, data: u8) {
        self.send(Command::RequestPeripheralData(data & 0x0f));
    }

    pub fn set_leds(&mut self, leds: Leds) {
        self.send(Command::Leds(leds));
    }

    /// Change the granted mode. Takes effect with the next second-byte ack,
    /// or immediately if no pair is in progress.
    pub fn set_mode(&mut self, mode: ModeFlags) {
        self.mode = mode;
        if self.phase == Phase::Ready && self.first.is_none() {
            self.send(Command::ModeAck(mode));
        }
    }

    pub fn take_messages(&mut self) -> Vec<KeyboardMessage> {
        self.messages.drain(..).collect()
    }

    /// Handle every byte the keyboard has sent so far.
    pub fn tick(&mut self) {
        while let Some(byte) = self.transport.poll_receive() {
            trace!("IOC RX {byte:02X}");
            self.receive(Reply::from(byte));
        }
    }

    fn send(&mut self, command: Command) {
        trace!("IOC TX {command:?}");
        self.transport.transmit_byte(command.into());
    }

    fn receive(&mut self, reply: Reply) {
        match (self.phase, reply) {
            (Phase::AwaitHardReset, Reply::HardReset) => {
                self.phase = Phase::AwaitAck1;
                self.send(Command::ResetAck1);
            }
            (Phase::AwaitAck1, Reply::ResetAck1) => {
                self.phase = Phase::AwaitAck2;
                self.send(Command::ResetAck2);
            }
            (Phase::AwaitAck2, Reply::ResetAck2) => {
                info!("IOC keyboard online, granting {:?}", self.mode);
                self.phase = Phase::Ready;
                self.messages.push_back(KeyboardMessage::HandshakeComplete);
                self.send(Command::ModeAck(self.mode));
            }
            (_, Reply::HardReset | Reply::ResetAck1 | Reply::ResetAck2) => {
                debug!("IOC keyboard asked for reset ({reply:?})");
                self.start();
            }
            (Phase::Ready, Reply::KeyboardId(id)) => {
                self.messages.push_back(KeyboardMessage::KeyboardId(id));
            }
            (Phase::Ready, Reply::PeripheralData(data)) => {
                self.messages.push_back(KeyboardMessage::PeripheralData(data));
            }
            (Phase::Ready, reply) if reply.needs_ack() => self.data(reply),
            (phase, reply) => {
                warn!("IOC unexpected {reply:?} in {phase:?}");
            }
        }
    }

    fn data(&mut self, reply: Reply) {
        self.data_count = self.data_count.wrapping_add(1);
        if let Some(n) = self.drop_every {
            if self.data_count % n == 0 {
                debug!("IOC dropping {reply:?}");
                return;
            }
        }

        let Some(first) = self.first.take() else {
            self.first = Some(reply);
            self.send(Command::ByteAck);
            return;
        };

        let message = match (first, reply) {
            (Reply::KeyDown(row), Reply::KeyDown(column)) => Some(Self::key(row, column, true)),
            (Reply::KeyUp(row), Reply::KeyUp(column)) => Some(Self::key(row, column, false)),
            (Reply::MouseData(dx), Reply::MouseData(dy)) => Some(KeyboardMessage::Mouse { dx, dy }),
            _ => None,
        };
        match message {
            Some(message) => {
                debug!("IOC {message:?}");
                self.messages.push_back(message);
            }
            None => warn!("IOC mismatched pair {first:?} {reply:?}"),
        }
        self.send(Command::ModeAck(self.mode));
    }

    fn key(row: u8, column: u8, pressed: bool) -> KeyboardMessage {
        if row == BUTTON_ROW && column <= 2 {
            KeyboardMessage::Button { column, pressed }
        } else {
            KeyboardMessage::Key {
                id: (row << 4) | column,
                pressed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::archie::keyboard::{ArchieKeyboard, LinkConfig, LinkState};
    use crate::machine::generic::link::ChannelTransport;
    use crate::machine::generic::timer::ManualClock;

    struct Session {
        kbd: ArchieKeyboard<ChannelTransport, ManualClock>,
        ctrl: Controller<ChannelTransport>,
        clock: ManualClock,
    }

    impl Session {
        fn new(mode: ModeFlags) -> Self {
            let (kbd_end, ctrl_end) = ChannelTransport::pair("kbd", "ioc");
            let clock = ManualClock::new();
            let kbd = ArchieKeyboard::new(kbd_end, clock.clone(), LinkConfig::default());
            let ctrl = Controller::new(ctrl_end, mode);
            Self { kbd, ctrl, clock }
        }

        fn online(mode: ModeFlags) -> Self {
            let mut s = Self::new(mode);
            s.ctrl.start();
            s.run(10);
            assert!(s.ctrl.is_ready());
            assert_eq!(s.kbd.state(), LinkState::Idle);
            assert_eq!(s.kbd.mode(), mode);
            assert_eq!(s.ctrl.take_messages(), [KeyboardMessage::HandshakeComplete]);
            s
        }

        fn run(&mut self, ms: u64) {
            for _ in 0..ms {
                self.ctrl.tick();
                self.kbd.poll();
                self.clock.advance(1);
            }
            self.ctrl.tick();
        }
    }

    #[test]
    fn test_controller_started_handshake() {
        let s = Session::online(ModeFlags::new(true, true));
        assert_eq!(s.kbd.stats().bytes_sent, 3);
        assert_eq!(s.kbd.stats().handshake_timeouts, 0);
    }

    #[test]
    fn test_keyboard_started_handshake() {
        // The controller stays quiet until the keyboard asks for a reset
        let mut s = Session::new(ModeFlags::new(true, false));
        s.run(40);
        assert!(s.ctrl.is_ready());
        assert_eq!(s.kbd.state(), LinkState::Idle);
        assert_eq!(s.kbd.mode(), ModeFlags::new(true, false));
        assert_eq!(
            s.ctrl.take_messages(),
            [KeyboardMessage::HandshakeComplete]
        );
    }

    #[test]
    fn test_events_arrive_in_order() {
        let mut s = Session::online(ModeFlags::new(true, true));
        s.kbd.submit_key(0x012, true);
        s.kbd.submit_mouse(0b001, 5, -3);
        s.kbd.submit_key(0x012, false);
        s.run(10);
        // Motion held back while the link was busy goes out with the next sample
        s.kbd.submit_mouse(0b001, 0, 0);
        s.run(10);

        assert_eq!(
            s.ctrl.take_messages(),
            [
                KeyboardMessage::Key {
                    id: 0x12,
                    pressed: true
                },
                KeyboardMessage::Button {
                    column: 0,
                    pressed: true
                },
                KeyboardMessage::Key {
                    id: 0x12,
                    pressed: false
                },
                KeyboardMessage::Mouse { dx: 5, dy: 3 },
            ]
        );
        assert_eq!(s.kbd.state(), LinkState::Idle);
        assert_eq!(s.kbd.stats().ack_timeouts, 0);
    }

    #[test]
    fn test_requests() {
        let mut s = Session::online(ModeFlags::new(true, false));
        s.ctrl.request_id();
        s.run(2);
        s.ctrl.request_peripheral_data(0x9);
        s.run(2);
        s.ctrl.set_leds(Leds::new(0x02));
        s.run(2);
        s.kbd.submit_mouse(0, -1, 0);
        s.ctrl.request_mouse();
        s.run(5);

        assert_eq!(
            s.ctrl.take_messages(),
            [
                KeyboardMessage::KeyboardId(1),
                KeyboardMessage::PeripheralData(9),
                KeyboardMessage::Mouse { dx: -1, dy: 0 },
            ]
        );
        assert!(s.kbd.leds().is_num_lock());
    }

    #[test]
    fn test_mode_change_disables_keys() {
        let mut s = Session::online(ModeFlags::new(true, true));
        s.ctrl.set_mode(ModeFlags::new(false, true));
        s.run(2);
        assert_eq!(s.kbd.mode(), ModeFlags::new(false, true));
        s.kbd.submit_key(0x20, true);
        s.run(5);
        assert!(s.ctrl.take_messages().is_empty());
    }

    #[test]
    fn test_silent_controller_frames_are_abandoned() {
        let mut s = Session::online(ModeFlags::new(true, false));
        s.ctrl = s.ctrl.with_drop_every(1);
        s.kbd.submit_key(0x012, true);
        s.run(25);

        assert!(s.ctrl.take_messages().is_empty());
        assert_eq!(s.kbd.stats().ack_timeouts, 2);
        assert_eq!(s.kbd.state(), LinkState::Idle);
    }

    #[test]
    fn test_lost_byte_recovers_through_reset() {
        let mut s = Session::online(ModeFlags::new(true, false));
        s.ctrl = s.ctrl.with_drop_every(2);
        s.kbd.submit_key(0x012, true);
        s.run(15);
        s.kbd.submit_key(0x034, true);
        s.run(60);

        // The pairing got out of step, so both ends went back through the
        // handshake and the link is usable again
        assert!(s.kbd.stats().protocol_violations >= 1);
        assert_eq!(s.kbd.state(), LinkState::Idle);
        assert!(s.ctrl.is_ready());
    }
}
