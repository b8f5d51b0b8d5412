use super::protocol::{KDDA, KUDA};

/// Row nibble shared by all mouse button frames.
pub const BUTTON_ROW: u8 = 0x07;

/// Logical button (left, middle, right in host order) to protocol column.
const REMAP: [u8; 3] = [0, 2, 1];

/// One button transition and the frame pair that reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEdge {
    mask: u8,
    pub pressed: bool,
    pub frame: [u8; 2],
}

/// Last reported button mask, used to turn samples into press/release edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState(u8);

impl ButtonState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mask(&self) -> u8 {
        self.0
    }

    /// Every button whose state in `buttons` differs from the stored mask,
    /// lowest bit first. Nothing is recorded until [`ButtonState::record`].
    pub fn changes(&self, buttons: u8) -> Vec<ButtonEdge> {
        let mut edges = Vec::new();
        for (bit, &column) in REMAP.iter().enumerate() {
            let mask = 1u8 << bit;
            if (buttons ^ self.0) & mask == 0 {
                continue;
            }
            let pressed = buttons & mask != 0;
            let prefix = if pressed { KDDA } else { KUDA };
            edges.push(ButtonEdge {
                mask,
                pressed,
                frame: [prefix | BUTTON_ROW, prefix | column],
            });
        }
        edges
    }

    /// Mark an edge as reported.
    pub fn record(&mut self, edge: ButtonEdge) {
        if edge.pressed {
            self.0 |= edge.mask;
        } else {
            self.0 &= !edge.mask;
        }
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}
