//! Wraparound-safe delta arithmetic for fixed-width unsigned counters.
//!
//! Kernel counters are exported with a fixed width (32 or 64 bits) and wrap
//! silently when they overflow. As long as a counter wraps at most once between
//! two observations, the modular difference `(curr - prev) mod 2^width` is the
//! exact number of events that occurred in the interval.
//!
//! # Examples
//!
//! ```rust
//! use variazioni::delta::{delta, CounterWidth};
//!
//! assert_eq!(delta(15, 10, CounterWidth::W64), 5);
//!
//! // A 32-bit counter that wrapped between the two observations:
//! assert_eq!(delta(3, u32::MAX as u64 - 1, CounterWidth::W32), 5);
//! ```

use num_traits::WrappingSub;
use std::fmt;

/// Width of a wrapping counter, in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CounterWidth {
    /// Counter wraps at `2^32`.
    W32,
    /// Counter wraps at `2^64`.
    W64,
}

impl CounterWidth {
    /// Returns the number of bits of the counter.
    pub const fn bits(self) -> u32 {
        match self {
            CounterWidth::W32 => 32,
            CounterWidth::W64 => 64,
        }
    }

    /// Returns the largest value representable at this width.
    pub const fn max_value(self) -> u64 {
        match self {
            CounterWidth::W32 => u32::MAX as u64,
            CounterWidth::W64 => u64::MAX,
        }
    }
}

impl fmt::Display for CounterWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.bits())
    }
}

/// Returns `curr - prev` with wrapping semantics of the underlying type.
#[inline]
pub fn wrapping_delta<T: WrappingSub>(curr: T, prev: T) -> T {
    curr.wrapping_sub(&prev)
}

/// Returns `(curr - prev) mod 2^width`.
///
/// Both values are first truncated to `width` bits, so the result is always
/// in `[0, 2^width)`. Correct under at most one wrap between observations.
#[inline]
pub fn delta(curr: u64, prev: u64, width: CounterWidth) -> u64 {
    match width {
        CounterWidth::W32 => wrapping_delta(curr as u32, prev as u32) as u64,
        CounterWidth::W64 => wrapping_delta(curr, prev),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_no_wrap() {
        assert_eq!(delta(15, 10, CounterWidth::W32), 5);
        assert_eq!(delta(15, 10, CounterWidth::W64), 5);
        assert_eq!(delta(10, 10, CounterWidth::W64), 0);
    }

    #[test]
    fn test_delta_wrap_32() {
        let prev = u32::MAX as u64 - 2;
        assert_eq!(delta(0, prev, CounterWidth::W32), 3);
        assert_eq!(delta(7, prev, CounterWidth::W32), 10);
    }

    #[test]
    fn test_delta_wrap_64() {
        assert_eq!(delta(0, u64::MAX, CounterWidth::W64), 1);
        assert_eq!(delta(9, u64::MAX - 9, CounterWidth::W64), 19);
    }

    #[test]
    fn test_delta_matches_modular_difference() {
        let samples: [u64; 6] = [0, 1, 2, 1 << 31, (1 << 32) - 1, 12345];
        for &curr in &samples {
            for &prev in &samples {
                let expected = ((curr as i128 - prev as i128).rem_euclid(1 << 32)) as u64;
                let d = delta(curr, prev, CounterWidth::W32);
                assert_eq!(d, expected);
                assert!(d <= CounterWidth::W32.max_value());
            }
        }

        let wide: [u64; 5] = [0, 1, u64::MAX, u64::MAX / 2, 1 << 40];
        for &curr in &wide {
            for &prev in &wide {
                let expected = ((curr as i128 - prev as i128).rem_euclid(1 << 64)) as u64;
                assert_eq!(delta(curr, prev, CounterWidth::W64), expected);
            }
        }
    }

    #[test]
    fn test_delta_truncates_to_width() {
        // Bits above the declared width are ignored.
        let curr = (1u64 << 32) + 4;
        assert_eq!(delta(curr, 1, CounterWidth::W32), 3);
    }

    #[test]
    fn test_wrapping_delta_generic() {
        assert_eq!(wrapping_delta(1u8, 255u8), 2);
        assert_eq!(wrapping_delta(5u16, 3u16), 2);
    }

    #[test]
    fn test_width_display() {
        assert_eq!(CounterWidth::W32.to_string(), "u32");
        assert_eq!(CounterWidth::W64.bits(), 64);
    }
}
