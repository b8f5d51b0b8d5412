/// Smallest delta a mouse byte can carry.
pub const MOUSE_MIN: i16 = -64;
/// Largest delta a mouse byte can carry.
pub const MOUSE_MAX: i16 = 63;

/// Relative motion gathered since the last report.
///
/// Each axis is clamped to the 7-bit signed range after every update, so a
/// burst of motion while the link is busy saturates instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseAccumulator {
    dx: i16,
    dy: i16,
}

impl MouseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, dx: i16, dy: i16) {
        self.dx = self.dx.saturating_add(dx).clamp(MOUSE_MIN, MOUSE_MAX);
        self.dy = self.dy.saturating_add(dy).clamp(MOUSE_MIN, MOUSE_MAX);
    }

    pub fn delta(&self) -> (i16, i16) {
        (self.dx, self.dy)
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    /// The accumulated delta as a pair of mouse bytes.
    pub fn to_bytes(&self) -> (u8, u8) {
        (encode(self.dx), encode(self.dy))
    }

    pub fn clear(&mut self) {
        self.dx = 0;
        self.dy = 0;
    }
}

/// Two's-complement delta in the low 7 bits; bit 7 stays clear.
fn encode(delta: i16) -> u8 {
    (delta as u8) & 0x7f
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clamps_each_axis() {
        let mut mouse = MouseAccumulator::new();
        mouse.accumulate(100, -100);
        assert_eq!(mouse.delta(), (63, -64));
        mouse.accumulate(-10, 10);
        assert_eq!(mouse.delta(), (53, -54));
    }

    #[test]
    fn test_encodes_low_seven_bits() {
        let mut mouse = MouseAccumulator::new();
        mouse.accumulate(5, -3);
        assert_eq!(mouse.to_bytes(), (0x05, 0x7d));
        assert_eq!(mouse.to_bytes(), (0x05, 0x7d));
        mouse.clear();
        assert!(mouse.is_zero());

        mouse.accumulate(-64, 63);
        assert_eq!(mouse.to_bytes(), (0x40, 0x3f));
    }

    proptest! {
        #[test]
        fn stays_in_range(moves in prop::collection::vec((any::<i8>(), any::<i8>()), 0..64)) {
            let mut mouse = MouseAccumulator::new();
            for (dx, dy) in moves {
                mouse.accumulate(dx as i16, dy as i16);
                let (x, y) = mouse.delta();
                prop_assert!((MOUSE_MIN..=MOUSE_MAX).contains(&x));
                prop_assert!((MOUSE_MIN..=MOUSE_MAX).contains(&y));
            }
        }

        #[test]
        fn matches_clamped_running_sum(moves in prop::collection::vec((any::<i8>(), any::<i8>()), 0..64)) {
            let mut mouse = MouseAccumulator::new();
            let (mut x, mut y) = (0i32, 0i32);
            for (dx, dy) in moves {
                mouse.accumulate(dx as i16, dy as i16);
                x = (x + dx as i32).clamp(-64, 63);
                y = (y + dy as i32).clamp(-64, 63);
            }
            prop_assert_eq!(mouse.delta(), (x as i16, y as i16));
        }

        #[test]
        fn encoded_bytes_have_bit7_clear(dx in -64i16..=63, dy in -64i16..=63) {
            let mut mouse = MouseAccumulator::new();
            mouse.accumulate(dx, dy);
            let (bx, by) = mouse.to_bytes();
            prop_assert_eq!(bx & 0x80, 0);
            prop_assert_eq!(by & 0x80, 0);
        }
    }
}
