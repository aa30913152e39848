//! Pure window arithmetic applied to binned store results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Zero-fill every window and replace each value with the running total.
///
/// `starts` are the window start instants, ascending. A point counts towards
/// the window whose start is the greatest start not after the point's time;
/// points before the first window are ignored. Inputs are non-negative
/// counters, so the output never decreases.
#[must_use]
pub fn cumulative(starts: &[DateTime<Utc>], points: &[SeriesPoint]) -> Vec<SeriesPoint> {
    let by_time: BTreeMap<DateTime<Utc>, f64> =
        points.iter().fold(BTreeMap::new(), |mut acc, point| {
            *acc.entry(point.time).or_insert(0.0) += point.value;
            acc
        });

    let mut running = 0.0;
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let in_window: f64 = match starts.get(i + 1) {
                Some(&next) => by_time.range(start..next).map(|(_, v)| v).sum(),
                None => by_time.range(start..).map(|(_, v)| v).sum(),
            };
            running += in_window;
            SeriesPoint {
                time: start,
                value: running,
            }
        })
        .collect()
}
