//! Precomputed per-publication trending metrics and top-N selection.

use pubtrend_core::{CoreError, DurationKey};
use serde::Serialize;
use sqlx::PgPool;

use crate::query_builder::{QueryWriter, SortAllowList, SortColumn};
use crate::DbError;

/// Select list for every [`TrendingMetrics`] column, qualified by alias `t`.
macro_rules! trending_columns {
    () => {
        "t.score, t.count, t.mean_sentiment, t.sum_followers, t.abstract_difference, \
         t.mean_age, t.mean_length, t.mean_questions, t.mean_exclamations, t.mean_bot_rating, \
         t.projected_change, t.trending, t.ema, t.kama, t.ker, t.mean_score, t.stddev"
    };
}
pub(crate) use trending_columns;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Score, count and secondary metrics of one trending record (or an
/// aggregate of several).
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TrendingMetrics {
    pub score: f64,
    pub count: i64,
    pub mean_sentiment: Option<f64>,
    pub sum_followers: Option<i64>,
    pub abstract_difference: Option<f64>,
    pub mean_age: Option<f64>,
    pub mean_length: Option<f64>,
    pub mean_questions: Option<f64>,
    pub mean_exclamations: Option<f64>,
    pub mean_bot_rating: Option<f64>,
    pub projected_change: Option<f64>,
    pub trending: Option<f64>,
    pub ema: Option<f64>,
    pub kama: Option<f64>,
    pub ker: Option<f64>,
    pub mean_score: Option<f64>,
    pub stddev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TopEntityRow {
    pub publication_doi: String,
    /// Value of the ranking metric; `None` when the record has no value for it.
    pub value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Allow-lists
// ---------------------------------------------------------------------------

/// Metrics a top-N selection may rank by. `score` is the default.
const TOP_N_COLUMNS: &[SortColumn] = &[
    SortColumn::new("score", "t.score"),
    SortColumn::new("count", "t.count::float8"),
    SortColumn::new("mean_sentiment", "t.mean_sentiment"),
    SortColumn::new("sum_followers", "t.sum_followers::float8"),
    SortColumn::new("abstract_difference", "t.abstract_difference"),
    SortColumn::new("mean_age", "t.mean_age"),
    SortColumn::new("mean_length", "t.mean_length"),
    SortColumn::new("mean_questions", "t.mean_questions"),
    SortColumn::new("mean_exclamations", "t.mean_exclamations"),
    SortColumn::new("mean_bot_rating", "t.mean_bot_rating"),
    SortColumn::new("projected_change", "t.projected_change"),
    SortColumn::new("trending", "t.trending"),
    SortColumn::new("ema", "t.ema"),
    SortColumn::new("kama", "t.kama"),
    SortColumn::new("ker", "t.ker"),
    SortColumn::new("mean_score", "t.mean_score"),
    SortColumn::new("stddev", "t.stddev"),
];

pub(crate) const TOP_N_METRICS: SortAllowList = SortAllowList::new(TOP_N_COLUMNS);

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns the `n` publications with the highest `metric` for a duration,
/// descending, ties broken by DOI ascending. An unknown metric ranks by score.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] when `n` is not positive, or
/// [`DbError::Store`] if the query fails.
pub async fn top_n(
    pool: &PgPool,
    duration: DurationKey,
    n: i64,
    metric: Option<&str>,
) -> Result<Vec<TopEntityRow>, DbError> {
    if n < 1 {
        return Err(CoreError::InvalidParameter {
            name: "n",
            reason: "must be at least 1".to_string(),
        }
        .into());
    }
    let metric = TOP_N_METRICS.resolve(metric);

    let mut w = QueryWriter::new("SELECT t.publication_doi, ");
    w.push(metric.expr)
        .push(" AS value FROM trending t WHERE t.duration = ")
        .push_bind(duration.as_str())
        .push(" ORDER BY ")
        .push(metric.expr)
        .push(" DESC NULLS LAST, t.publication_doi ASC LIMIT ")
        .push_bind(n);
    let query = w.finish();

    let rows = query.query_as::<TopEntityRow>().fetch_all(pool).await?;
    tracing::debug!(duration = %duration, n, metric = metric.key, found = rows.len(), "top_n");
    Ok(rows)
}

/// Rank of a publication by score within a duration, 1-based, or `None` when
/// it has no trending record for that duration.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn trending_rank(
    pool: &PgPool,
    doi: &str,
    duration: DurationKey,
) -> Result<Option<i64>, DbError> {
    let rank = sqlx::query_scalar::<_, i64>(
        "SELECT ranked.trending_ranking \
         FROM ( \
             SELECT publication_doi, \
                    ROW_NUMBER() OVER (ORDER BY score DESC, publication_doi ASC) AS trending_ranking \
             FROM trending \
             WHERE duration = $1 \
         ) ranked \
         WHERE ranked.publication_doi = $2",
    )
    .bind(duration.as_str())
    .bind(doi)
    .fetch_optional(pool)
    .await?;

    Ok(rank)
}

/// Whether any trending record exists for the duration.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn has_trending_records(pool: &PgPool, duration: DurationKey) -> Result<bool, DbError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM trending WHERE duration = $1)",
    )
    .bind(duration.as_str())
    .fetch_one(pool)
    .await?;

    Ok(exists)
}
