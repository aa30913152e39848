//! The five trending horizons and their time-series window geometry.
//!
//! Every query that needs a lookback span, a bucket name, or a chart window
//! size goes through [`resolve`] or [`DurationKey::definition`]. Nothing else in
//! the workspace hardcodes these numbers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::Serialize;

use crate::CoreError;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Number of windows a full lookback is split into for chart rendering.
pub const CHART_POINTS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationKey {
    Currently,
    Today,
    Week,
    Month,
    Year,
}

impl DurationKey {
    pub const ALL: [DurationKey; 5] = [
        DurationKey::Currently,
        DurationKey::Today,
        DurationKey::Week,
        DurationKey::Month,
        DurationKey::Year,
    ];

    /// Value stored in the relational `trending.duration` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DurationKey::Currently => "currently",
            DurationKey::Today => "today",
            DurationKey::Week => "week",
            DurationKey::Month => "month",
            DurationKey::Year => "year",
        }
    }

    #[must_use]
    pub const fn definition(self) -> DurationDefinition {
        DEFINITIONS[self as usize]
    }

    /// `currently` reads the raw event bucket; every other duration reads a
    /// rollup bucket written by the ingestion pipeline.
    #[must_use]
    pub const fn is_raw(self) -> bool {
        matches!(self, DurationKey::Currently)
    }
}

impl fmt::Display for DurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "currently" => Ok(DurationKey::Currently),
            "today" => Ok(DurationKey::Today),
            "week" => Ok(DurationKey::Week),
            "month" => Ok(DurationKey::Month),
            "year" => Ok(DurationKey::Year),
            other => Err(CoreError::UnknownDuration(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationDefinition {
    pub key: DurationKey,
    /// Time-series bucket the metrics for this horizon live in.
    pub bucket: &'static str,
    pub lookback_secs: i64,
    pub window_secs: i64,
}

const DEFINITIONS: [DurationDefinition; 5] = [
    DurationDefinition {
        key: DurationKey::Currently,
        bucket: "trending",
        lookback_secs: 6 * HOUR,
        window_secs: 6 * MINUTE,
    },
    DurationDefinition {
        key: DurationKey::Today,
        bucket: "today",
        lookback_secs: DAY,
        window_secs: 24 * MINUTE,
    },
    DurationDefinition {
        key: DurationKey::Week,
        bucket: "week",
        lookback_secs: 7 * DAY,
        window_secs: 168 * MINUTE,
    },
    DurationDefinition {
        key: DurationKey::Month,
        bucket: "month",
        lookback_secs: 30 * DAY,
        window_secs: 12 * HOUR,
    },
    DurationDefinition {
        key: DurationKey::Year,
        bucket: "year",
        lookback_secs: 365 * DAY,
        window_secs: 146 * HOUR,
    },
];

// Table order must match the enum discriminants and every lookback must split
// into exactly CHART_POINTS windows.
const _: () = {
    let mut i = 0;
    while i < DEFINITIONS.len() {
        let def = DEFINITIONS[i];
        assert!(def.key as usize == i, "duration table out of order");
        assert!(def.window_secs > 0, "window size must be positive");
        assert!(
            def.lookback_secs % def.window_secs == 0,
            "lookback must be a whole number of windows"
        );
        assert!(
            def.lookback_secs / def.window_secs == CHART_POINTS,
            "every duration renders the same number of chart points"
        );
        i += 1;
    }
};

impl DurationDefinition {
    #[must_use]
    pub fn lookback(&self) -> TimeDelta {
        TimeDelta::seconds(self.lookback_secs)
    }

    #[must_use]
    pub fn window(&self) -> TimeDelta {
        TimeDelta::seconds(self.window_secs)
    }

    /// Number of windows covering the lookback, rounded up.
    #[must_use]
    pub const fn window_count(&self) -> i64 {
        (self.lookback_secs + self.window_secs - 1) / self.window_secs
    }

    /// The half-open range `[now - lookback, now)` this duration covers.
    ///
    /// `now` is truncated to whole seconds so window starts survive the
    /// store's microsecond timestamps unchanged.
    #[must_use]
    pub fn ending_at(&self, now: DateTime<Utc>) -> TimeRange {
        let now = now.trunc_subsecs(0);
        TimeRange {
            definition: *self,
            start: now - self.lookback(),
            end: now,
        }
    }
}

/// A duration anchored to a concrete end instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub definition: DurationDefinition,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    #[must_use]
    pub fn key(&self) -> DurationKey {
        self.definition.key
    }

    /// Start instants of every window in the range, oldest first.
    #[must_use]
    pub fn window_starts(&self) -> Vec<DateTime<Utc>> {
        let window = self.definition.window();
        let mut starts = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            starts.push(cursor);
            cursor += window;
        }
        starts
    }
}

/// Look up the definition for a duration key string.
///
/// # Errors
///
/// Returns [`CoreError::UnknownDuration`] for anything other than the five
/// fixed keys.
pub fn resolve(key: &str) -> Result<DurationDefinition, CoreError> {
    key.parse::<DurationKey>().map(DurationKey::definition)
}
