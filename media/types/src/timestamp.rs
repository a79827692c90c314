/*!
    Timestamps in stream time_base units.
*/

use std::time::Duration;

use crate::Rational;

/**
    Presentation timestamp in time_base units.

    Raw value straight from the container. It only means something together
    with the time base of the stream it came from.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub i64);

impl Pts {
    /**
        Convert to a Duration. Negative timestamps clamp to zero.
    */
    #[inline]
    pub fn to_duration(self, time_base: Rational) -> Duration {
        ticks_to_duration(self.0, time_base)
    }

    /**
        Create a PTS from a Duration, rounding to the nearest tick.
    */
    #[inline]
    pub fn from_duration(duration: Duration, time_base: Rational) -> Self {
        Self(duration_to_ticks(duration, time_base))
    }
}

impl From<i64> for Pts {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/**
    A length of time in time_base units.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaDuration(pub i64);

impl MediaDuration {
    /**
        Convert to a Duration. Negative values clamp to zero.
    */
    #[inline]
    pub fn to_duration(self, time_base: Rational) -> Duration {
        ticks_to_duration(self.0, time_base)
    }

    /**
        Create a MediaDuration from a Duration, rounding to the nearest tick.
    */
    #[inline]
    pub fn from_duration(duration: Duration, time_base: Rational) -> Self {
        Self(duration_to_ticks(duration, time_base))
    }
}

impl From<i64> for MediaDuration {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

fn ticks_to_duration(ticks: i64, time_base: Rational) -> Duration {
    if ticks <= 0 || !time_base.is_positive() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(ticks as f64 * time_base.to_f64())
}

fn duration_to_ticks(duration: Duration, time_base: Rational) -> i64 {
    if !time_base.is_positive() {
        return 0;
    }
    (duration.as_secs_f64() / time_base.to_f64()).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB_MS: Rational = Rational { num: 1, den: 1000 };
    const TB_MPEG: Rational = Rational { num: 1, den: 90000 };

    #[test]
    fn pts_to_duration() {
        assert_eq!(Pts(90000).to_duration(TB_MPEG), Duration::from_secs(1));
        assert_eq!(Pts(250).to_duration(TB_MS), Duration::from_millis(250));
    }

    #[test]
    fn negative_and_invalid_time_base_clamp_to_zero() {
        assert_eq!(Pts(-10).to_duration(TB_MS), Duration::ZERO);
        assert_eq!(
            Pts(10).to_duration(Rational { num: 0, den: 1 }),
            Duration::ZERO
        );
        assert_eq!(MediaDuration(-1).to_duration(TB_MS), Duration::ZERO);
    }

    #[test]
    fn from_duration_rounds_to_nearest_tick() {
        let pts = Pts::from_duration(Duration::from_micros(1_499), TB_MS);
        assert_eq!(pts, Pts(1));
        let d = MediaDuration::from_duration(Duration::from_secs(2), TB_MPEG);
        assert_eq!(d, MediaDuration(180000));
    }

    #[test]
    fn ordering_follows_ticks() {
        assert!(Pts(1) < Pts(2));
        assert!(MediaDuration(5) > MediaDuration(4));
    }
}
