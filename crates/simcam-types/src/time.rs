//! Simulation time.

use std::ops::Sub;

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// A point on the simulator's clock, split into whole seconds and
/// nanoseconds like `builtin_interfaces/msg/Time`.
///
/// Subtracting two `SimTime`s yields the elapsed time in seconds as `f64`,
/// which is what rate throttling compares against an update period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTime {
    pub sec: i64,
    pub nsec: u32,
}

impl SimTime {
    pub const ZERO: SimTime = SimTime { sec: 0, nsec: 0 };

    pub fn new(sec: i64, nsec: u32) -> Self {
        let carry = i64::from(nsec / 1_000_000_000);
        Self {
            sec: sec + carry,
            nsec: nsec % 1_000_000_000,
        }
    }

    /// Build a time from fractional seconds. Negative inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        let whole = secs.floor();
        let nsec = ((secs - whole) * NANOS_PER_SEC).round() as u32;
        Self::new(whole as i64, nsec)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + f64::from(self.nsec) / NANOS_PER_SEC
    }
}

impl Sub for SimTime {
    type Output = f64;

    fn sub(self, rhs: SimTime) -> f64 {
        self.as_secs_f64() - rhs.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_secs_splits_fraction() {
        let t = SimTime::from_secs_f64(2.25);
        assert_eq!(t.sec, 2);
        assert_eq!(t.nsec, 250_000_000);
    }

    #[test]
    fn new_carries_overflowing_nanoseconds() {
        let t = SimTime::new(1, 1_500_000_000);
        assert_eq!(t, SimTime::new(2, 500_000_000));
    }

    #[test]
    fn subtraction_yields_seconds() {
        let a = SimTime::from_secs_f64(1.5);
        let b = SimTime::from_secs_f64(1.0);
        assert!(((a - b) - 0.5).abs() < 1e-9);
        assert!(((b - a) + 0.5).abs() < 1e-9);
    }

    #[test]
    fn negative_seconds_clamp_to_zero() {
        assert_eq!(SimTime::from_secs_f64(-3.0), SimTime::ZERO);
        assert_eq!(SimTime::from_secs_f64(f64::NAN), SimTime::ZERO);
    }
}
