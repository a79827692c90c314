/*!
    Rational numbers for time bases and frame rates.
*/

use std::fmt;

/**
    A rational number stored as numerator and denominator.

    Container formats express time bases this way (1/90000 for MPEG-TS,
    1/48000 for most audio streams) and frame rates too (30000/1001).
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /**
        Create a new rational number.

        # Panics

        Panics if `den` is zero.
    */
    #[inline]
    pub const fn new(num: i32, den: i32) -> Self {
        assert!(den != 0, "denominator cannot be zero");
        Self { num, den }
    }

    /**
        Convert to f64. A zero denominator yields zero rather than infinity.
    */
    #[inline]
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /**
        Returns true if both parts are positive, which is required for
        anything used as a time base or a frame rate.
    */
    #[inline]
    pub const fn is_positive(self) -> bool {
        self.num > 0 && self.den > 0
    }

    /**
        Length of one tick of this rate, e.g. one frame interval for a
        frame rate. Returns `None` for non-positive rates.
    */
    pub fn interval(self) -> Option<std::time::Duration> {
        if !self.is_positive() {
            return None;
        }
        Some(std::time::Duration::from_secs_f64(
            self.den as f64 / self.num as f64,
        ))
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self { num, den }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn to_f64_handles_zero_denominator() {
        let r = Rational { num: 1, den: 0 };
        assert_eq!(r.to_f64(), 0.0);
        assert_eq!(Rational::new(1, 4).to_f64(), 0.25);
    }

    #[test]
    fn frame_interval() {
        assert_eq!(
            Rational::new(25, 1).interval(),
            Some(Duration::from_millis(40))
        );
        assert_eq!(Rational::new(0, 1).interval(), None);
    }

    #[test]
    fn formatting() {
        let r = Rational::from((30000, 1001));
        assert_eq!(format!("{r}"), "30000/1001");
        assert_eq!(format!("{r:?}"), "30000/1001");
    }

    #[test]
    #[should_panic(expected = "denominator cannot be zero")]
    fn new_rejects_zero_denominator() {
        let _ = Rational::new(1, 0);
    }
}
