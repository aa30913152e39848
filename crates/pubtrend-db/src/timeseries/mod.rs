//! Windowed aggregates over the time-series store.
//!
//! Points live in `discussion_metrics(time, bucket, doi, field, value)`. Which
//! bucket, span and window size a query reads comes from the duration
//! registry; which stored field and aggregate it applies comes from
//! [`MetricField::aggregation`]. Windows are `date_bin`-aligned to the start of
//! the requested range.

pub mod labels;
mod window;

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::try_join_all;
use pubtrend_core::{Aggregator, CoreError, DurationKey, FieldAggregation, MetricField, TimeRange};
use serde::Serialize;
use sqlx::PgPool;

use crate::query_builder::{QueryWriter, SafeQuery};
use crate::trending::TopEntityRow;
use crate::DbError;

pub use labels::{distinct_label_count, top_labels, LabelCountRow};
pub use window::{cumulative, SeriesPoint};

/// How per-window values are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMode {
    /// One point per non-empty window.
    #[default]
    Standard,
    /// One point per window, zero-filled, holding the running total.
    Cumulative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowedSeries {
    /// `None` for a series aggregated over every publication.
    pub doi: Option<String>,
    pub field: MetricField,
    pub points: Vec<SeriesPoint>,
}

#[derive(sqlx::FromRow)]
struct ValueRow {
    value: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct KeyedValueRow {
    doi: String,
    value: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct WindowRow {
    doi: Option<String>,
    window_start: DateTime<Utc>,
    value: Option<f64>,
}

const fn aggregate_expr(aggregator: Aggregator) -> &'static str {
    match aggregator {
        Aggregator::Sum => "COALESCE(SUM(value), 0)::float8",
        Aggregator::Mean => "AVG(value)::float8",
        Aggregator::Count => "COUNT(value)::float8",
    }
}

/// Appends `bucket`, `field` and half-open time-range predicates.
fn push_range_filter(w: &mut QueryWriter, range: &TimeRange, agg: FieldAggregation) {
    w.push(" FROM discussion_metrics WHERE bucket = ")
        .push_bind(range.definition.bucket)
        .push(" AND field = ")
        .push_bind(agg.stored_field)
        .push(" AND time >= ")
        .push_bind(range.start)
        .push(" AND time < ")
        .push_bind(range.end);
}

fn push_key_filter(w: &mut QueryWriter, keys: Option<&[String]>) {
    if let Some(keys) = keys {
        w.push(" AND doi = ANY(").push_bind(keys.to_vec()).push(")");
    }
}

fn value_query(keys: Option<&[String]>, range: &TimeRange, agg: FieldAggregation) -> SafeQuery {
    let mut w = QueryWriter::new("SELECT ");
    w.push(aggregate_expr(agg.aggregator)).push(" AS value");
    push_range_filter(&mut w, range, agg);
    push_key_filter(&mut w, keys);
    w.finish()
}

fn window_query(
    keys: Option<&[String]>,
    range: &TimeRange,
    agg: FieldAggregation,
) -> SafeQuery {
    let per_key = keys.is_some();
    let mut w = QueryWriter::new(if per_key {
        "SELECT doi, "
    } else {
        "SELECT NULL::TEXT AS doi, "
    });
    w.push("date_bin(make_interval(secs => ")
        .push_bind(range.definition.window_secs)
        .push("::float8), time, ")
        .push_bind(range.start)
        .push(") AS window_start, ")
        .push(aggregate_expr(agg.aggregator))
        .push(" AS value");
    push_range_filter(&mut w, range, agg);
    push_key_filter(&mut w, keys);
    if per_key {
        w.push(" GROUP BY doi, window_start ORDER BY doi, window_start");
    } else {
        w.push(" GROUP BY window_start ORDER BY window_start");
    }
    w.finish()
}

/// Aggregate one field over a time range, for a set of publications or for
/// all of them when `keys` is `None`.
///
/// Sums and counts of zero points are `0`; a mean of zero points is `None`.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn aggregate_value(
    pool: &PgPool,
    keys: Option<&[String]>,
    range: &TimeRange,
    field: MetricField,
) -> Result<Option<f64>, DbError> {
    let agg = field.aggregation(range.key());
    if keys.is_some_and(<[String]>::is_empty) {
        return Ok(agg.aggregator.empty_value());
    }

    let row = value_query(keys, range, agg)
        .query_as::<ValueRow>()
        .fetch_one(pool)
        .await?;
    Ok(row.value.or(agg.aggregator.empty_value()))
}

/// [`aggregate_value`] for several fields at once, run concurrently and keyed
/// by field name.
///
/// # Errors
///
/// Returns [`DbError::Store`] if any of the queries fails.
pub async fn aggregate_values(
    pool: &PgPool,
    keys: Option<&[String]>,
    range: &TimeRange,
    fields: &[MetricField],
) -> Result<BTreeMap<&'static str, Option<f64>>, DbError> {
    let values = try_join_all(
        fields
            .iter()
            .map(|&field| aggregate_value(pool, keys, range, field)),
    )
    .await?;

    Ok(fields
        .iter()
        .map(|field| field.as_str())
        .zip(values)
        .collect())
}

/// One windowed series per DOI, in the order the DOIs were given.
///
/// In [`WindowMode::Standard`] windows without points are omitted. In
/// [`WindowMode::Cumulative`] every window is present and holds the running
/// total, which is only meaningful for additive fields.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] when cumulative mode is requested for a non-counter
/// field, or [`DbError::Store`] if the query fails.
pub async fn windowed_series(
    pool: &PgPool,
    keys: &[String],
    range: &TimeRange,
    field: MetricField,
    mode: WindowMode,
) -> Result<Vec<WindowedSeries>, DbError> {
    let agg = checked_aggregation(field, range.key(), mode)?;
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let rows = window_query(Some(keys), range, agg)
        .query_as::<WindowRow>()
        .fetch_all(pool)
        .await?;

    let mut by_doi: BTreeMap<String, Vec<SeriesPoint>> = BTreeMap::new();
    for row in rows {
        if let (Some(doi), Some(value)) = (row.doi, row.value) {
            by_doi.entry(doi).or_default().push(SeriesPoint {
                time: row.window_start,
                value,
            });
        }
    }

    let starts = range.window_starts();
    Ok(keys
        .iter()
        .map(|doi| {
            let points = by_doi.get(doi).cloned().unwrap_or_default();
            WindowedSeries {
                doi: Some(doi.clone()),
                field,
                points: finish_points(mode, &starts, points),
            }
        })
        .collect())
}

/// A single windowed series aggregated over every publication.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] when cumulative mode is requested for a non-counter
/// field, or [`DbError::Store`] if the query fails.
pub async fn population_series(
    pool: &PgPool,
    range: &TimeRange,
    field: MetricField,
    mode: WindowMode,
) -> Result<WindowedSeries, DbError> {
    let agg = checked_aggregation(field, range.key(), mode)?;

    let rows = window_query(None, range, agg)
        .query_as::<WindowRow>()
        .fetch_all(pool)
        .await?;

    let points = rows
        .into_iter()
        .filter_map(|row| {
            row.value.map(|value| SeriesPoint {
                time: row.window_start,
                value,
            })
        })
        .collect();

    Ok(WindowedSeries {
        doi: None,
        field,
        points: finish_points(mode, &range.window_starts(), points),
    })
}

fn checked_aggregation(
    field: MetricField,
    duration: DurationKey,
    mode: WindowMode,
) -> Result<FieldAggregation, DbError> {
    let agg = field.aggregation(duration);
    if mode == WindowMode::Cumulative && !field.is_counter() {
        return Err(CoreError::NonCumulativeField(field.as_str().to_string()).into());
    }
    Ok(agg)
}

fn finish_points(
    mode: WindowMode,
    starts: &[DateTime<Utc>],
    points: Vec<SeriesPoint>,
) -> Vec<SeriesPoint> {
    match mode {
        WindowMode::Standard => points,
        WindowMode::Cumulative => cumulative(starts, &points),
    }
}

/// The `n` publications with the most discussion events in the range,
/// descending, ties by DOI. Used when no trending records exist for the
/// duration.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] when `n` is not positive, or
/// [`DbError::Store`] if the query fails.
pub async fn top_n_by_count(
    pool: &PgPool,
    range: &TimeRange,
    n: i64,
) -> Result<Vec<TopEntityRow>, DbError> {
    if n < 1 {
        return Err(CoreError::InvalidParameter {
            name: "n",
            reason: "must be at least 1".to_string(),
        }
        .into());
    }
    let agg = MetricField::Count.aggregation(range.key());

    let mut w = QueryWriter::new("SELECT doi AS publication_doi, ");
    w.push(aggregate_expr(agg.aggregator)).push(" AS value");
    push_range_filter(&mut w, range, agg);
    w.push(" GROUP BY doi ORDER BY value DESC, doi ASC LIMIT ")
        .push_bind(n);

    let rows = w.finish().query_as::<TopEntityRow>().fetch_all(pool).await?;
    tracing::debug!(duration = %range.key(), n, found = rows.len(), "top_n_by_count");
    Ok(rows)
}

/// Aggregate of one field for each given DOI. DOIs without points get the
/// aggregator's empty value.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn values_by_entity(
    pool: &PgPool,
    keys: &[String],
    range: &TimeRange,
    field: MetricField,
) -> Result<BTreeMap<String, Option<f64>>, DbError> {
    let agg = field.aggregation(range.key());
    let mut values: BTreeMap<String, Option<f64>> = keys
        .iter()
        .map(|doi| (doi.clone(), agg.aggregator.empty_value()))
        .collect();
    if keys.is_empty() {
        return Ok(values);
    }

    let mut w = QueryWriter::new("SELECT doi, ");
    w.push(aggregate_expr(agg.aggregator)).push(" AS value");
    push_range_filter(&mut w, range, agg);
    push_key_filter(&mut w, Some(keys));
    w.push(" GROUP BY doi");

    let rows = w.finish().query_as::<KeyedValueRow>().fetch_all(pool).await?;
    for row in rows {
        if let Some(value) = row.value {
            values.insert(row.doi, Some(value));
        }
    }
    Ok(values)
}

/// Whether the raw event bucket received any point in the last `within`.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn has_recent_points(
    pool: &PgPool,
    now: DateTime<Utc>,
    within: TimeDelta,
) -> Result<bool, DbError> {
    let recent = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS ( \
             SELECT 1 FROM discussion_metrics \
             WHERE bucket = $1 AND time >= $2 \
         )",
    )
    .bind(DurationKey::Currently.definition().bucket)
    .bind(now - within)
    .fetch_one(pool)
    .await?;

    Ok(recent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::BindValue;
    use chrono::TimeZone;

    fn range(key: DurationKey) -> TimeRange {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        key.definition().ending_at(now)
    }

    #[test]
    fn count_on_currently_counts_raw_score_points() {
        let r = range(DurationKey::Currently);
        let q = value_query(None, &r, MetricField::Count.aggregation(r.key()));

        assert!(q.sql().starts_with("SELECT COUNT(value)::float8 AS value"));
        assert_eq!(q.params()[0], BindValue::Text("trending".into()));
        assert_eq!(q.params()[1], BindValue::Text("score".into()));
    }

    #[test]
    fn count_on_rollups_sums_stored_counts() {
        let r = range(DurationKey::Month);
        let q = value_query(None, &r, MetricField::Count.aggregation(r.key()));

        assert!(q.sql().starts_with("SELECT COALESCE(SUM(value), 0)::float8 AS value"));
        assert_eq!(q.params()[0], BindValue::Text("month".into()));
        assert_eq!(q.params()[1], BindValue::Text("count".into()));
    }

    #[test]
    fn sentiment_averages_raw_sentiment() {
        let r = range(DurationKey::Week);
        let q = value_query(None, &r, MetricField::Sentiment.aggregation(r.key()));

        assert!(q.sql().starts_with("SELECT AVG(value)::float8 AS value"));
        assert_eq!(q.params()[1], BindValue::Text("sentiment_raw".into()));
    }

    #[test]
    fn key_filter_is_bound_as_array() {
        let r = range(DurationKey::Today);
        let keys = vec!["10.1/a".to_string(), "10.1/b".to_string()];
        let q = value_query(Some(&keys), &r, MetricField::Score.aggregation(r.key()));

        assert!(q.sql().ends_with("AND doi = ANY($5)"));
        assert_eq!(q.params()[4], BindValue::TextArray(keys));
    }

    #[test]
    fn window_query_uses_registry_window_and_range_origin() {
        let r = range(DurationKey::Year);
        let q = window_query(None, &r, MetricField::Score.aggregation(r.key()));

        assert_eq!(q.params()[0], BindValue::Int(146 * 3600));
        assert_eq!(q.params()[1], BindValue::Timestamp(r.start));
        assert!(q.sql().contains("GROUP BY window_start ORDER BY window_start"));
    }

    #[test]
    fn cumulative_mode_rejects_mean_fields() {
        let err = checked_aggregation(
            MetricField::BotRating,
            DurationKey::Today,
            WindowMode::Cumulative,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DbError::Invalid(CoreError::NonCumulativeField(ref f)) if f == "bot_rating"
        ));
    }

    #[test]
    fn cumulative_mode_rejects_signed_score() {
        let err = checked_aggregation(MetricField::Score, DurationKey::Week, WindowMode::Cumulative)
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Invalid(CoreError::NonCumulativeField(ref f)) if f == "score"
        ));
        assert!(
            checked_aggregation(MetricField::Score, DurationKey::Week, WindowMode::Standard).is_ok()
        );
    }

    #[test]
    fn cumulative_mode_accepts_count_for_every_duration() {
        for key in DurationKey::ALL {
            assert!(checked_aggregation(MetricField::Count, key, WindowMode::Cumulative).is_ok());
        }
    }
}
