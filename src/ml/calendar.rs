//! Calendar feature extraction
//!
//! Turns an observation timestamp into the calendar-derived features the
//! classifier was trained on. All thresholds live in [`CalendarPolicy`] so
//! training and inference read them from one place.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CategoryKind, PipelineError, Result};

/// Default reference zone offset (UTC+05:30).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;

/// Build the fixed reference zone from an offset in minutes east of UTC.
pub fn reference_zone(utc_offset_minutes: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
        PipelineError::InvalidTimestamp(format!(
            "UTC offset of {utc_offset_minutes} minutes is out of range"
        ))
    })
}

/// A timestamp already resolved into the reference zone.
///
/// The extractor never converts zones; constructing one of these is where
/// that happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationTime(DateTime<FixedOffset>);

impl ObservationTime {
    /// Resolve a UTC instant into the reference zone.
    pub fn from_utc(instant: DateTime<Utc>, zone: FixedOffset) -> Self {
        Self(instant.with_timezone(&zone))
    }

    /// Interpret a wall-clock date and time as local to the reference zone.
    pub fn from_local(date: NaiveDate, hour: u32, minute: u32, zone: FixedOffset) -> Result<Self> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            PipelineError::InvalidTimestamp(format!("{hour:02}:{minute:02} is not a valid time"))
        })?;

        zone.from_local_datetime(&date.and_time(time))
            .single()
            .map(Self)
            .ok_or_else(|| {
                PipelineError::InvalidTimestamp(format!("{date} {time} has no single local time"))
            })
    }

    pub fn datetime(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

impl fmt::Display for ObservationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M %:z"))
    }
}

/// Coarse bucketing of the hour of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartOfDay {
    Afternoon,
    Evening,
    Morning,
    Night,
}

impl PartOfDay {
    /// All values, in the order their one-hot columns are laid out.
    pub const ALL: [PartOfDay; 4] = [
        PartOfDay::Afternoon,
        PartOfDay::Evening,
        PartOfDay::Morning,
        PartOfDay::Night,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartOfDay::Afternoon => "Afternoon",
            PartOfDay::Evening => "Evening",
            PartOfDay::Morning => "Morning",
            PartOfDay::Night => "Night",
        }
    }
}

impl fmt::Display for PartOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartOfDay {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        PartOfDay::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownCategory {
                kind: CategoryKind::PartOfDay,
                value: s.to_string(),
            })
    }
}

/// Thresholds that define the calendar features.
///
/// Night wraps midnight: it covers `[night_start, 24)` and `[0, morning_start)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarPolicy {
    /// Days `1..=month_start_max_day` count as month start
    pub month_start_max_day: u32,
    /// Days `month_end_min_day..` count as month end
    pub month_end_min_day: u32,
    /// First hour (inclusive) of the weekend-morning window
    pub weekend_morning_first_hour: u32,
    /// Last hour (inclusive) of the weekend-morning window
    pub weekend_morning_last_hour: u32,
    /// First hour of Morning; earlier hours are Night
    pub morning_start: u32,
    /// First hour of Afternoon
    pub afternoon_start: u32,
    /// First hour of Evening
    pub evening_start: u32,
    /// First hour of Night, which runs through midnight to `morning_start`
    pub night_start: u32,
}

impl CalendarPolicy {
    pub const CANONICAL: CalendarPolicy = CalendarPolicy {
        month_start_max_day: 3,
        month_end_min_day: 28,
        weekend_morning_first_hour: 6,
        weekend_morning_last_hour: 11,
        morning_start: 6,
        afternoon_start: 12,
        evening_start: 18,
        night_start: 21,
    };

    /// Reject policies whose windows overlap or fall outside the clock.
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            self.morning_start,
            self.afternoon_start,
            self.evening_start,
            self.night_start,
        ];
        if bounds[0] == 0 || bounds.windows(2).any(|w| w[0] >= w[1]) || self.night_start > 23 {
            return Err(PipelineError::SchemaMismatch(format!(
                "part-of-day boundaries {bounds:?} must be strictly increasing within 1..=23"
            )));
        }
        if self.weekend_morning_first_hour > self.weekend_morning_last_hour
            || self.weekend_morning_last_hour > 23
        {
            return Err(PipelineError::SchemaMismatch(format!(
                "weekend morning window {}..={} is not a valid hour range",
                self.weekend_morning_first_hour, self.weekend_morning_last_hour
            )));
        }
        if !(1..=31).contains(&self.month_start_max_day)
            || !(1..=31).contains(&self.month_end_min_day)
            || self.month_start_max_day >= self.month_end_min_day
        {
            return Err(PipelineError::SchemaMismatch(format!(
                "month start/end days {}/{} are not valid thresholds",
                self.month_start_max_day, self.month_end_min_day
            )));
        }
        Ok(())
    }

    pub fn part_of_day(&self, hour: u32) -> PartOfDay {
        if hour < self.morning_start || hour >= self.night_start {
            PartOfDay::Night
        } else if hour < self.afternoon_start {
            PartOfDay::Morning
        } else if hour < self.evening_start {
            PartOfDay::Afternoon
        } else {
            PartOfDay::Evening
        }
    }

    /// Derive the calendar features for an observation.
    pub fn extract(&self, time: &ObservationTime) -> CalendarFeatures {
        let dt = time.datetime();
        let hour = dt.hour();
        let day = dt.day();
        let month = dt.month();
        let day_of_week = dt.weekday().num_days_from_monday();

        let is_weekend = day_of_week >= 5;
        let is_weekend_morning = is_weekend
            && (self.weekend_morning_first_hour..=self.weekend_morning_last_hour).contains(&hour);

        CalendarFeatures {
            hour,
            day_of_week,
            month,
            year: dt.year(),
            quarter: (month - 1) / 3 + 1,
            is_weekend,
            is_month_start: day <= self.month_start_max_day,
            is_month_end: day >= self.month_end_min_day,
            is_weekend_morning,
            part_of_day: self.part_of_day(hour),
        }
    }
}

impl Default for CalendarPolicy {
    fn default() -> Self {
        Self::CANONICAL
    }
}

/// Features computed purely from the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    pub hour: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub month: u32,
    pub year: i32,
    pub quarter: u32,
    pub is_weekend: bool,
    pub is_month_start: bool,
    pub is_month_end: bool,
    pub is_weekend_morning: bool,
    pub part_of_day: PartOfDay,
}
