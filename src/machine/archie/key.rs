use tracing::debug;

use super::protocol::{KDDA, KUDA};

/// Bit set in a packed key code when the key was released.
pub const KEY_UP: u16 = 0x8000;

/// A key transition, identified by its keyboard matrix position.
///
/// The identifier's high nibble is the matrix row and its low nibble the
/// column; both travel as separate bytes, row first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub id: u8,
    pub pressed: bool,
}

impl KeyEvent {
    /// Only the low 8 bits of `id` name a key; higher bits are dropped.
    pub fn new(id: u16, pressed: bool) -> Self {
        let truncated = (id & 0xff) as u8;
        if u16::from(truncated) != id {
            debug!("KBD key id {id:03X} truncated to {truncated:02X}");
        }
        Self {
            id: truncated,
            pressed,
        }
    }

    /// Unpack a code whose bit 15 flags a release.
    pub fn from_code(code: u16) -> Self {
        Self::new(code & 0xff, code & KEY_UP == 0)
    }

    pub fn to_bytes(self) -> [u8; 2] {
        let prefix = if self.pressed { KDDA } else { KUDA };
        [prefix | (self.id >> 4), prefix | (self.id & 0x0f)]
    }
}
