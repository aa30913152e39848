//! Entity and population metric profiles built from trending records.

use pubtrend_core::{
    fuse, DurationKey, EntityProfile, MetricStats, PopulationProfile, ProfileComparison,
};
use sqlx::PgPool;

use crate::DbError;

/// Unpivots one trending record (alias `t`) into `(metric, value)` rows.
macro_rules! metric_values {
    () => {
        "CROSS JOIN LATERAL (VALUES \
             ('score', t.score), \
             ('count', t.count::float8), \
             ('mean_sentiment', t.mean_sentiment), \
             ('sum_followers', t.sum_followers::float8), \
             ('abstract_difference', t.abstract_difference), \
             ('mean_age', t.mean_age), \
             ('mean_length', t.mean_length), \
             ('mean_questions', t.mean_questions), \
             ('mean_exclamations', t.mean_exclamations), \
             ('mean_bot_rating', t.mean_bot_rating), \
             ('projected_change', t.projected_change), \
             ('trending', t.trending), \
             ('ema', t.ema), \
             ('kama', t.kama), \
             ('ker', t.ker), \
             ('mean_score', t.mean_score), \
             ('stddev', t.stddev) \
         ) AS m(metric, value) "
    };
}

#[derive(sqlx::FromRow)]
struct MetricValueRow {
    metric: String,
    value: f64,
}

#[derive(sqlx::FromRow)]
struct MetricStatsRow {
    metric: String,
    min: f64,
    max: f64,
    avg: f64,
}

/// Min, max and mean of every trending metric across all publications for
/// `duration`. Metrics with no non-null value are absent.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn population_profile(
    pool: &PgPool,
    duration: DurationKey,
) -> Result<PopulationProfile, DbError> {
    let rows = sqlx::query_as::<_, MetricStatsRow>(concat!(
        "SELECT m.metric, MIN(m.value) AS min, MAX(m.value) AS max, AVG(m.value) AS avg \
         FROM trending t ",
        metric_values!(),
        "WHERE t.duration = $1 AND m.value IS NOT NULL \
         GROUP BY m.metric"
    ))
    .bind(duration.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.metric,
                MetricStats {
                    min: row.min,
                    max: row.max,
                    avg: row.avg,
                },
            )
        })
        .collect())
}

/// One publication's non-null trending metrics for `duration`. Empty when
/// the publication has no trending record for that duration.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn entity_profile(
    pool: &PgPool,
    doi: &str,
    duration: DurationKey,
) -> Result<EntityProfile, DbError> {
    let rows = sqlx::query_as::<_, MetricValueRow>(concat!(
        "SELECT m.metric, m.value \
         FROM trending t ",
        metric_values!(),
        "WHERE t.duration = $1 AND t.publication_doi = $2 AND m.value IS NOT NULL"
    ))
    .bind(duration.as_str())
    .bind(doi)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|row| (row.metric, row.value)).collect())
}

/// A publication's profile next to the population statistics for `duration`.
///
/// Metrics missing on either side are reported in
/// [`ProfileComparison::missing`] rather than failing.
///
/// # Errors
///
/// Returns [`DbError::EntityNotFound`] when no publication has this DOI, or
/// [`DbError::Store`] if a query fails.
pub async fn profile_comparison(
    pool: &PgPool,
    doi: &str,
    duration: DurationKey,
) -> Result<ProfileComparison, DbError> {
    let (entity, population) = futures::try_join!(
        entity_profile(pool, doi, duration),
        population_profile(pool, duration),
    )?;

    if entity.is_empty() {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM publication WHERE doi = $1)",
        )
        .bind(doi)
        .fetch_one(pool)
        .await?;
        if !exists {
            return Err(DbError::not_found("publication", doi));
        }
    }

    let comparison = fuse(&entity, &population);
    if !comparison.is_complete() {
        tracing::debug!(doi, duration = %duration, missing = comparison.missing.len(), "partial profile");
    }
    Ok(comparison)
}
