//! Recording Timestamps
//!
//! Timestamps in a recording are a `{sec, nsec}` pair, always non-negative
//! and monotonic within one recording. On the wire they travel as a single
//! u64 nanosecond count (delta-encoded, see `robolog-core::varint`), so the
//! conversions here are used on every record.

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point in time within a recording.
///
/// Ordered first by seconds, then by nanoseconds (the derived ordering
/// relies on the field order below).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Time {
    /// Whole seconds
    pub sec: u32,

    /// Nanoseconds within the second (0..1_000_000_000)
    pub nsec: u32,
}

impl Time {
    pub const ZERO: Time = Time { sec: 0, nsec: 0 };

    /// Maximum representable time, used as an open upper bound for ranges.
    pub const MAX: Time = Time {
        sec: u32::MAX,
        nsec: (NANOS_PER_SEC - 1) as u32,
    };

    pub fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// Build a `Time` from a u64 nanosecond count.
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            sec: (nanos / NANOS_PER_SEC) as u32,
            nsec: (nanos % NANOS_PER_SEC) as u32,
        }
    }

    /// Total nanoseconds since the zero time.
    pub fn to_nanos(self) -> u64 {
        self.sec as u64 * NANOS_PER_SEC + self.nsec as u64
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nanos_roundtrip() {
        let t = Time::new(12, 345_678_901);
        assert_eq!(Time::from_nanos(t.to_nanos()), t);
        assert_eq!(t.to_nanos(), 12_345_678_901);
    }

    #[test]
    fn test_ordering() {
        assert!(Time::new(1, 0) < Time::new(2, 0));
        assert!(Time::new(1, 5) < Time::new(1, 6));
        assert!(Time::new(0, 999_999_999) < Time::new(1, 0));
        assert!(Time::ZERO < Time::MAX);
    }

    #[test]
    fn test_zero() {
        assert_eq!(Time::ZERO.to_nanos(), 0);
        assert_eq!(Time::from_nanos(0), Time::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Time::new(3, 7).to_string(), "3.000000007");
    }
}
