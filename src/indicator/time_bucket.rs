// Time buckets as calendar-digit longs (UTC):
// minute yyyyMMddHHmm, hour yyyyMMddHH, day yyyyMMdd, month yyyyMM.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::IndicatorError;

/// Granularity of a time bucket, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Downsampling {
    Minute,
    Hour,
    Day,
    Month,
}

impl Downsampling {
    pub const ALL: [Downsampling; 4] = [
        Downsampling::Minute,
        Downsampling::Hour,
        Downsampling::Day,
        Downsampling::Month,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Downsampling::Minute => "minute",
            Downsampling::Hour => "hour",
            Downsampling::Day => "day",
            Downsampling::Month => "month",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }

    /// The next tier a finalized record of this granularity feeds into.
    pub fn coarser(self) -> Option<Self> {
        match self {
            Downsampling::Minute => Some(Downsampling::Hour),
            Downsampling::Hour => Some(Downsampling::Day),
            Downsampling::Day => Some(Downsampling::Month),
            Downsampling::Month => None,
        }
    }

    fn rank(self) -> u32 {
        match self {
            Downsampling::Minute => 0,
            Downsampling::Hour => 1,
            Downsampling::Day => 2,
            Downsampling::Month => 3,
        }
    }
}

impl fmt::Display for Downsampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBucket {
    value: i64,
    downsampling: Downsampling,
}

impl TimeBucket {
    /// Minute bucket containing the epoch-millis instant.
    pub fn minute_from_millis(millis: i64) -> Result<Self, IndicatorError> {
        let at = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or(IndicatorError::InvalidTimestamp(millis))?;
        Ok(Self::from_datetime(at, Downsampling::Minute))
    }

    pub fn from_datetime(at: DateTime<Utc>, downsampling: Downsampling) -> Self {
        let minute = i64::from(at.year()) * 100_000_000
            + i64::from(at.month()) * 1_000_000
            + i64::from(at.day()) * 10_000
            + i64::from(at.hour()) * 100
            + i64::from(at.minute());
        Self {
            value: minute,
            downsampling: Downsampling::Minute,
        }
        .to(downsampling)
    }

    /// Parses a stored bucket value; the granularity follows from its digit count.
    pub fn from_value(value: i64) -> Result<Self, IndicatorError> {
        let downsampling = match value {
            100_001_010_000..=999_912_312_359 => Downsampling::Minute,
            1_000_010_100..=9_999_123_123 => Downsampling::Hour,
            10_000_101..=99_991_231 => Downsampling::Day,
            100_001..=999_912 => Downsampling::Month,
            _ => return Err(IndicatorError::InvalidTimeBucket(value)),
        };
        let bucket = Self {
            value,
            downsampling,
        };
        bucket
            .start()
            .ok_or(IndicatorError::InvalidTimeBucket(value))?;
        Ok(bucket)
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn downsampling(&self) -> Downsampling {
        self.downsampling
    }

    /// Coarsens to `target`. A target finer than the current granularity leaves the
    /// bucket unchanged: coarsening never refines.
    pub fn to(self, target: Downsampling) -> Self {
        if target.rank() <= self.downsampling.rank() {
            return self;
        }
        let steps = target.rank() - self.downsampling.rank();
        Self {
            value: self.value / 100_i64.pow(steps),
            downsampling: target,
        }
    }

    pub fn to_hour(self) -> Self {
        self.to(Downsampling::Hour)
    }

    pub fn to_day(self) -> Self {
        self.to(Downsampling::Day)
    }

    pub fn to_month(self) -> Self {
        self.to(Downsampling::Month)
    }

    fn start_naive(&self) -> Option<NaiveDateTime> {
        // Widen every granularity to minute digits with the missing parts at their minimum.
        let (minute_value, pad) = match self.downsampling {
            Downsampling::Minute => (self.value, 0),
            Downsampling::Hour => (self.value * 100, 0),
            Downsampling::Day => (self.value * 10_000, 0),
            Downsampling::Month => (self.value * 1_000_000, 10_000),
        };
        let v = minute_value + pad;
        let year = i32::try_from(v / 100_000_000).ok()?;
        let month = u32::try_from(v / 1_000_000 % 100).ok()?;
        let day = u32::try_from(v / 10_000 % 100).ok()?;
        let hour = u32::try_from(v / 100 % 100).ok()?;
        let minute = u32::try_from(v % 100).ok()?;
        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
    }

    /// First instant covered by the bucket.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start_naive().map(|t| t.and_utc())
    }

    /// First instant after the bucket.
    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        let start = self.start_naive()?;
        let end = match self.downsampling {
            Downsampling::Minute => start.checked_add_signed(TimeDelta::minutes(1))?,
            Downsampling::Hour => start.checked_add_signed(TimeDelta::hours(1))?,
            Downsampling::Day => start.checked_add_signed(TimeDelta::days(1))?,
            Downsampling::Month => start.checked_add_months(Months::new(1))?,
        };
        Some(end.and_utc())
    }

    /// A bucket is closed once its window plus the grace period has passed.
    pub fn is_closed(&self, now: DateTime<Utc>, grace: TimeDelta) -> bool {
        self.window_end()
            .and_then(|end| end.checked_add_signed(grace))
            .is_some_and(|deadline| deadline <= now)
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
