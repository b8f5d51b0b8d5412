//! Byte vocabulary of the Archimedes keyboard link.
//!
//! The controller (the computer's keyboard interface) and the keyboard talk
//! over a half-duplex serial line, one byte at a time. Controller bytes are
//! commands and acknowledgments; keyboard bytes are key, mouse and id data.
//! Every keyboard data byte must be acknowledged before the next is sent.

use std::fmt;

// Controller -> keyboard
pub const HRST: u8 = 0xff;
pub const RAK1: u8 = 0xfe;
pub const RAK2: u8 = 0xfd;
pub const RQPD: u8 = 0x40; // mask 0xf0
pub const RQID: u8 = 0x20;
pub const PRST: u8 = 0x21; // nop
pub const RQMP: u8 = 0x22;
pub const BACK: u8 = 0x3f;
pub const NACK: u8 = 0x30; // scan off, mouse off
pub const SACK: u8 = 0x31; // scan on, mouse off
pub const MACK: u8 = 0x32; // scan off, mouse on
pub const SMAK: u8 = 0x33; // scan on, mouse on
pub const LEDS: u8 = 0x00; // mask 0xf8

// Keyboard -> controller
pub const KBID: u8 = 0x80; // mask 0xc0
pub const KDDA: u8 = 0xc0; // mask 0xf0
pub const KUDA: u8 = 0xd0; // mask 0xf0
pub const PDAT: u8 = 0xe0; // mask 0xf0
pub const MDAT: u8 = 0x00; // mask 0x80

/// Id reported in reply to [`RQID`].
pub const KEYBOARD_ID: u8 = 1;

/// Scan and mouse enables, as granted by the controller's second-byte ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeFlags {
    pub scan_enabled: bool,
    pub mouse_enabled: bool,
}

impl ModeFlags {
    pub const fn new(scan_enabled: bool, mouse_enabled: bool) -> Self {
        Self {
            scan_enabled,
            mouse_enabled,
        }
    }

    /// Decode one of `NACK`, `SACK`, `MACK` or `SMAK`.
    pub fn from_ack(byte: u8) -> Option<Self> {
        if byte & 0xfc != NACK {
            return None;
        }
        Some(Self::new(byte & 0x01 != 0, byte & 0x02 != 0))
    }

    pub fn to_ack(self) -> u8 {
        NACK | (self.scan_enabled as u8) | ((self.mouse_enabled as u8) << 1)
    }
}

/// Keyboard LED state carried by the `LEDS` command.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Leds(u8);

impl Leds {
    pub fn new(byte: u8) -> Self {
        Leds(byte & 0x07)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_caps_lock(&self) -> bool {
        self.0 & 0x01 == 0x01
    }

    pub fn is_num_lock(&self) -> bool {
        self.0 & 0x02 == 0x02
    }

    pub fn is_scroll_lock(&self) -> bool {
        self.0 & 0x04 == 0x04
    }
}

impl fmt::Debug for Leds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Leds({:02X}=", self.0)?;
        let mut first = true;
        for led in [
            ("Caps", self.is_caps_lock()),
            ("Num", self.is_num_lock()),
            ("Scroll", self.is_scroll_lock()),
        ] {
            if led.1 {
                if first {
                    first = false;
                } else {
                    write!(f, "+")?;
                }
                write!(f, "{}", led.0)?;
            }
        }
        write!(f, ")")
    }
}

/// A byte received from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Reset request, also the first byte of the handshake
    HardReset,
    /// First reset acknowledgment
    ResetAck1,
    /// Second reset acknowledgment
    ResetAck2,
    /// Request keyboard id
    RequestId,
    /// Reset peripheral (no-op)
    PeripheralReset,
    /// Request mouse position
    RequestMouse,
    /// Acknowledge the first byte of a pair
    ByteAck,
    /// Acknowledge the second byte of a pair and set the scan/mouse mode
    ModeAck(ModeFlags),
    /// Request peripheral data
    RequestPeripheralData(u8),
    /// Set LED state
    Leds(Leds),
    Unknown(u8),
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        match byte {
            HRST => Command::HardReset,
            RAK1 => Command::ResetAck1,
            RAK2 => Command::ResetAck2,
            RQID => Command::RequestId,
            PRST => Command::PeripheralReset,
            RQMP => Command::RequestMouse,
            BACK => Command::ByteAck,
            NACK..=SMAK => match ModeFlags::from_ack(byte) {
                Some(mode) => Command::ModeAck(mode),
                None => Command::Unknown(byte),
            },
            b if b & 0xf0 == RQPD => Command::RequestPeripheralData(b & 0x0f),
            b if b & 0xf8 == LEDS => Command::Leds(Leds::new(b)),
            _ => Command::Unknown(byte),
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> u8 {
        match command {
            Command::HardReset => HRST,
            Command::ResetAck1 => RAK1,
            Command::ResetAck2 => RAK2,
            Command::RequestId => RQID,
            Command::PeripheralReset => PRST,
            Command::RequestMouse => RQMP,
            Command::ByteAck => BACK,
            Command::ModeAck(mode) => mode.to_ack(),
            Command::RequestPeripheralData(data) => RQPD | (data & 0x0f),
            Command::Leds(leds) => LEDS | leds.bits(),
            Command::Unknown(byte) => byte,
        }
    }
}

/// A byte sent by the keyboard, as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    HardReset,
    ResetAck1,
    ResetAck2,
    KeyboardId(u8),
    /// One nibble of a key-down (or button-down) pair
    KeyDown(u8),
    /// One nibble of a key-up (or button-up) pair
    KeyUp(u8),
    PeripheralData(u8),
    /// One axis of a mouse pair, sign-extended from 7 bits
    MouseData(i8),
    Unknown(u8),
}

impl Reply {
    /// True if the controller must acknowledge this byte.
    pub fn needs_ack(&self) -> bool {
        matches!(
            self,
            Reply::KeyDown(_) | Reply::KeyUp(_) | Reply::MouseData(_)
        )
    }
}

impl From<u8> for Reply {
    fn from(byte: u8) -> Self {
        match byte {
            HRST => Reply::HardReset,
            RAK1 => Reply::ResetAck1,
            RAK2 => Reply::ResetAck2,
            b if b & 0x80 == MDAT => Reply::MouseData(((b << 1) as i8) >> 1),
            b if b & 0xc0 == KBID => Reply::KeyboardId(b & 0x3f),
            b if b & 0xf0 == KDDA => Reply::KeyDown(b & 0x0f),
            b if b & 0xf0 == KUDA => Reply::KeyUp(b & 0x0f),
            b if b & 0xf0 == PDAT => Reply::PeripheralData(b & 0x0f),
            _ => Reply::Unknown(byte),
        }
    }
}

impl From<Reply> for u8 {
    fn from(reply: Reply) -> u8 {
        match reply {
            Reply::HardReset => HRST,
            Reply::ResetAck1 => RAK1,
            Reply::ResetAck2 => RAK2,
            Reply::KeyboardId(id) => KBID | (id & 0x3f),
            Reply::KeyDown(nibble) => KDDA | (nibble & 0x0f),
            Reply::KeyUp(nibble) => KUDA | (nibble & 0x0f),
            Reply::PeripheralData(nibble) => PDAT | (nibble & 0x0f),
            Reply::MouseData(delta) => MDAT | (delta as u8 & 0x7f),
            Reply::Unknown(byte) => byte,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0xff, Command::HardReset)]
    #[case(0xfe, Command::ResetAck1)]
    #[case(0xfd, Command::ResetAck2)]
    #[case(0x20, Command::RequestId)]
    #[case(0x21, Command::PeripheralReset)]
    #[case(0x22, Command::RequestMouse)]
    #[case(0x3f, Command::ByteAck)]
    #[case(0x30, Command::ModeAck(ModeFlags::new(false, false)))]
    #[case(0x31, Command::ModeAck(ModeFlags::new(true, false)))]
    #[case(0x32, Command::ModeAck(ModeFlags::new(false, true)))]
    #[case(0x33, Command::ModeAck(ModeFlags::new(true, true)))]
    #[case(0x4a, Command::RequestPeripheralData(0x0a))]
    #[case(0x05, Command::Leds(Leds::new(0x05)))]
    #[case(0x34, Command::Unknown(0x34))]
    #[case(0x08, Command::Unknown(0x08))]
    #[case(0x80, Command::Unknown(0x80))]
    fn test_command_decode(#[case] byte: u8, #[case] expected: Command) {
        let command = Command::from(byte);
        assert_eq!(command, expected);
        assert_eq!(u8::from(command), byte);
    }

    #[rstest]
    #[case(0xff, Reply::HardReset)]
    #[case(0x81, Reply::KeyboardId(1))]
    #[case(0xc1, Reply::KeyDown(1))]
    #[case(0xd2, Reply::KeyUp(2))]
    #[case(0xe7, Reply::PeripheralData(7))]
    #[case(0x05, Reply::MouseData(5))]
    #[case(0x7d, Reply::MouseData(-3))]
    #[case(0x40, Reply::MouseData(-64))]
    #[case(0x3f, Reply::MouseData(63))]
    #[case(0xf0, Reply::Unknown(0xf0))]
    fn test_reply_decode(#[case] byte: u8, #[case] expected: Reply) {
        let reply = Reply::from(byte);
        assert_eq!(reply, expected);
        assert_eq!(u8::from(reply), byte);
    }

    #[test]
    fn test_leds_debug() {
        assert_eq!(format!("{:?}", Leds::new(0x05)), "Leds(05=Caps+Scroll)");
        assert_eq!(format!("{:?}", Leds::new(0x00)), "Leds(00=)");
        assert!(Leds::new(0x02).is_num_lock());
    }

    #[test]
    fn test_mode_flags_ack_bytes() {
        assert_eq!(ModeFlags::from_ack(0x2f), None);
        assert_eq!(ModeFlags::from_ack(0x34), None);
        assert_eq!(ModeFlags::new(true, true).to_ack(), SMAK);
        assert_eq!(ModeFlags::default().to_ack(), NACK);
    }
}
