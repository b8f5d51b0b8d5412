use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

/// An absolute point on a monotonic millisecond timeline.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn after(self, ms: u64) -> Self {
        Timestamp(self.0.saturating_add(ms))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Source of monotonic time for deadline checks.
pub trait Clock {
    fn now(&self) -> Timestamp;

    /// A deadline `ms` milliseconds from now.
    fn deadline(&self, ms: u64) -> Timestamp {
        self.now().after(ms)
    }

    /// True once `deadline` has been reached.
    fn expired(&self, deadline: Timestamp) -> bool {
        self.now() >= deadline
    }
}

/// Wall-clock backed timer, counting from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.start.elapsed().as_millis() as u64)
    }
}

/// A clock that only moves when told to. Clones share the same time, so a
/// test can hold one handle while the link owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let deadline = clock.deadline(10);
        assert!(!clock.expired(deadline));
        handle.advance(9);
        assert!(!clock.expired(deadline));
        handle.advance(1);
        assert!(clock.expired(deadline));
        assert_eq!(clock.now(), Timestamp(10));
    }

    #[test]
    fn test_deadline_saturates() {
        let clock = ManualClock::new();
        clock.set(u64::MAX - 1);
        assert_eq!(clock.deadline(10), Timestamp(u64::MAX));
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(clock.expired(a));
    }
}
