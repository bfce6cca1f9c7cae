use serde::Serialize;
use std::fmt;
use std::ops::Sub;

/// Capture timestamp, as stored in a pcap record header
///
/// Panic-free: arithmetic wraps instead of overflowing, since timestamps
/// come from untrusted files.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, Serialize)]
pub struct Timestamp {
    pub secs: u32,
    pub micros: u32,
}

pub const MICROS_PER_SEC: u32 = 1_000_000;

impl Timestamp {
    /// Build Timestamp from secs and micros
    pub fn new(secs: u32, micros: u32) -> Timestamp {
        Timestamp { secs, micros }
    }

    /// Test if Timestamp object is null
    #[inline]
    pub fn is_null(self) -> bool {
        self.secs == 0 && self.micros == 0
    }

    /// Seconds as a floating-point value
    pub fn as_secs_f64(self) -> f64 {
        f64::from(self.secs) + f64::from(self.micros) / f64::from(MICROS_PER_SEC)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

impl Sub for Timestamp {
    type Output = Timestamp;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn sub(self, other: Timestamp) -> Self::Output {
        let secs = self.secs.wrapping_sub(other.secs);
        let (secs, micros) = if self.micros >= other.micros {
            (secs, self.micros - other.micros)
        } else {
            // borrow one second; micros fields above 1e6 are clamped
            let diff = other.micros.wrapping_sub(self.micros).min(MICROS_PER_SEC);
            (secs.wrapping_sub(1), MICROS_PER_SEC - diff)
        };
        Timestamp { secs, micros }
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn timestamp_sub() {
        let t1 = Timestamp::new(1234, 5678);
        let t2 = Timestamp::new(1234, 6789);
        let d = t2 - t1;
        assert_eq!(d.secs, 0);
        assert_eq!(d.micros, 1111);
    }

    #[test]
    fn timestamp_sub_borrow() {
        let t1 = Timestamp::new(10, 900_000);
        let t2 = Timestamp::new(12, 100_000);
        let d = t2 - t1;
        assert_eq!(d, Timestamp::new(1, 200_000));
    }

    #[test]
    fn timestamp_display() {
        assert_eq!(Timestamp::new(3, 42).to_string(), "3.000042");
        assert!((Timestamp::new(1, 500_000).as_secs_f64() - 1.5).abs() < f64::EPSILON);
    }
}
