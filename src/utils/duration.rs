use std::fmt::Display;
use std::str::FromStr;

use crate::errors::PunchError;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60_000;
const MILLIS_PER_HOUR: i64 = 3_600_000;

/// An elapsed span of work time backed by a millisecond count.
///
/// Values are immutable. [plus](WorkDuration::plus) and
/// [minus](WorkDuration::minus) return new values instead of mutating.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct WorkDuration {
    millis: i64,
}

/// Partial unit breakdown accepted by [WorkDuration::plus] and
/// [WorkDuration::minus]. Any subset of fields may be set, the rest default
/// to zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct DurationParts {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub millis: i64,
}

impl From<DurationParts> for WorkDuration {
    fn from(parts: DurationParts) -> Self {
        WorkDuration::from_millis(
            parts.hours * MILLIS_PER_HOUR
                + parts.minutes * MILLIS_PER_MINUTE
                + parts.seconds * MILLIS_PER_SECOND
                + parts.millis,
        )
    }
}

impl From<chrono::Duration> for WorkDuration {
    fn from(value: chrono::Duration) -> Self {
        WorkDuration::from_millis(value.num_milliseconds())
    }
}

impl WorkDuration {
    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    pub fn total_millis(&self) -> i64 {
        self.millis
    }

    pub fn total_seconds(&self) -> f64 {
        self.millis as f64 / MILLIS_PER_SECOND as f64
    }

    pub fn total_minutes(&self) -> f64 {
        self.millis as f64 / MILLIS_PER_MINUTE as f64
    }

    pub fn total_hours(&self) -> f64 {
        self.millis as f64 / MILLIS_PER_HOUR as f64
    }

    /// Whole-hour component. Together with [minutes](Self::minutes),
    /// [seconds](Self::seconds) and [millis](Self::millis) this decomposes
    /// the total exactly, truncating toward zero at each step.
    pub fn hours(&self) -> i64 {
        self.millis / MILLIS_PER_HOUR
    }

    pub fn minutes(&self) -> i64 {
        self.millis % MILLIS_PER_HOUR / MILLIS_PER_MINUTE
    }

    pub fn seconds(&self) -> i64 {
        self.millis % MILLIS_PER_MINUTE / MILLIS_PER_SECOND
    }

    pub fn millis(&self) -> i64 {
        self.millis % MILLIS_PER_SECOND
    }

    pub fn plus(&self, other: impl Into<WorkDuration>) -> WorkDuration {
        WorkDuration::from_millis(self.millis + other.into().millis)
    }

    pub fn minus(&self, other: impl Into<WorkDuration>) -> WorkDuration {
        WorkDuration::from_millis(self.millis - other.into().millis)
    }

    /// Long rendering, e.g. `"1 hour, 30 minutes and 0 seconds"`. Follows the
    /// same unit-omission rules as [Display].
    pub fn long_format(&self) -> String {
        fn unit(value: i64, name: &str) -> String {
            if value == 1 {
                format!("{value} {name}")
            } else {
                format!("{value} {name}s")
            }
        }

        if self.hours() > 0 {
            format!(
                "{}, {} and {}",
                unit(self.hours(), "hour"),
                unit(self.minutes(), "minute"),
                unit(self.seconds(), "second")
            )
        } else if self.minutes() > 0 {
            format!(
                "{} and {}",
                unit(self.minutes(), "minute"),
                unit(self.seconds(), "second")
            )
        } else {
            unit(self.seconds(), "second")
        }
    }
}

/// Renders as `"Xh Ym Zs"`. Hours are omitted below one hour and minutes
/// below one minute, but once a larger unit is shown every smaller unit down
/// to seconds is shown as well, zero or not.
impl Display for WorkDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hours() > 0 {
            write!(f, "{}h {}m {}s", self.hours(), self.minutes(), self.seconds())
        } else if self.minutes() > 0 {
            write!(f, "{}m {}s", self.minutes(), self.seconds())
        } else {
            write!(f, "{}s", self.seconds())
        }
    }
}

/// Parses space-separated `<int><unit>` tokens with unit one of `h`, `m`,
/// `s`, in any order. Tokens with an unknown unit suffix are ignored rather
/// than rejected.
impl FromStr for WorkDuration {
    type Err = PunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut millis = 0i64;
        for token in s.split_whitespace() {
            let digits_end = token
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(token.len());
            let (digits, suffix) = token.split_at(digits_end);
            let value: i64 = digits.parse().map_err(|_| {
                PunchError::InvalidArgument(format!("malformed duration token {token:?}"))
            })?;
            match suffix {
                "h" => millis += value * MILLIS_PER_HOUR,
                "m" => millis += value * MILLIS_PER_MINUTE,
                "s" => millis += value * MILLIS_PER_SECOND,
                _ => {}
            }
        }
        Ok(WorkDuration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::{DurationParts, WorkDuration};

    fn of(hours: i64, minutes: i64, seconds: i64) -> WorkDuration {
        WorkDuration::from(DurationParts {
            hours,
            minutes,
            seconds,
            ..Default::default()
        })
    }

    #[test]
    fn test_decomposition_identity() {
        for total in [0, 1, 999, 1_000, 59_999, 3_600_000, 187_207_123, 86_399_999] {
            let duration = WorkDuration::from_millis(total);
            assert_eq!(
                duration.hours() * 3_600_000
                    + duration.minutes() * 60_000
                    + duration.seconds() * 1_000
                    + duration.millis(),
                total
            );
        }
    }

    #[test]
    fn test_total_conversions() {
        let duration = WorkDuration::from_millis(5_400_000);
        assert_eq!(duration.total_minutes(), 90.0);
        assert_eq!(duration.total_hours(), 1.5);
        assert_eq!(duration.total_seconds(), 5_400.0);
    }

    #[test]
    fn test_display_keeps_zero_smaller_units() {
        assert_eq!(of(52, 0, 7).to_string(), "52h 0m 7s");
        assert_eq!(of(0, 16, 0).to_string(), "16m 0s");
        assert_eq!(of(0, 0, 58).to_string(), "58s");
    }

    #[test]
    fn test_long_format() {
        assert_eq!(
            of(1, 30, 0).long_format(),
            "1 hour, 30 minutes and 0 seconds"
        );
        assert_eq!(of(0, 16, 2).long_format(), "16 minutes and 2 seconds");
        assert_eq!(of(0, 0, 1).long_format(), "1 second");
    }

    #[test]
    fn test_plus_minus_are_immutable() {
        let base = of(1, 0, 0);
        let bigger = base.plus(DurationParts {
            minutes: 30,
            ..Default::default()
        });
        assert_eq!(base.total_millis(), 3_600_000);
        assert_eq!(bigger.total_millis(), 5_400_000);
        assert_eq!(bigger.minus(base).total_millis(), 1_800_000);
    }

    #[test]
    fn test_parse_tokens_in_any_order() {
        let parsed: WorkDuration = "30m 1h 5s".parse().unwrap();
        assert_eq!(parsed.total_millis(), 5_405_000);
    }

    #[test]
    fn test_parse_ignores_unknown_units() {
        let parsed: WorkDuration = "1h 30x".parse().unwrap();
        assert_eq!(parsed.total_millis(), 3_600_000);
    }

    #[test]
    fn test_parse_rejects_tokens_without_digits() {
        assert!("h".parse::<WorkDuration>().is_err());
    }
}
