//! Counts over the categorical label series (language, location, author).

use pubtrend_core::{LabelField, TimeRange};
use serde::Serialize;
use sqlx::PgPool;

use crate::query_builder::{QueryWriter, SafeQuery};
use crate::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LabelCountRow {
    pub value: String,
    pub count: i64,
}

fn push_label_filter(
    w: &mut QueryWriter,
    field: LabelField,
    doi: Option<&str>,
    range: &TimeRange,
) {
    w.push(" FROM discussion_labels WHERE field = ")
        .push_bind(field.stored_field())
        .push(" AND time >= ")
        .push_bind(range.start)
        .push(" AND time < ")
        .push_bind(range.end);

    let ignored = field.ignored_labels();
    if !ignored.is_empty() {
        let ignored: Vec<String> = ignored.iter().map(ToString::to_string).collect();
        w.push(" AND label <> ALL(").push_bind(ignored).push(")");
    }
    if let Some(doi) = doi {
        w.push(" AND doi = ").push_bind(doi);
    }
}

fn top_labels_query(
    field: LabelField,
    doi: Option<&str>,
    range: &TimeRange,
    limit: i64,
) -> SafeQuery {
    let mut w = QueryWriter::new("SELECT label AS value, COUNT(*)::bigint AS count");
    push_label_filter(&mut w, field, doi, range);
    w.push(" GROUP BY label ORDER BY count DESC, value ASC LIMIT ")
        .push_bind(limit);
    w.finish()
}

/// Most frequent labels of `field` within the range, placeholder labels
/// excluded. Ordered by count descending, ties by label.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn top_labels(
    pool: &PgPool,
    field: LabelField,
    doi: Option<&str>,
    range: &TimeRange,
    limit: i64,
) -> Result<Vec<LabelCountRow>, DbError> {
    let rows = top_labels_query(field, doi, range, limit)
        .query_as::<LabelCountRow>()
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

#[derive(sqlx::FromRow)]
struct DistinctRow {
    count: i64,
}

/// Number of distinct labels of `field` within the range.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn distinct_label_count(
    pool: &PgPool,
    field: LabelField,
    doi: Option<&str>,
    range: &TimeRange,
) -> Result<i64, DbError> {
    let mut w = QueryWriter::new("SELECT COUNT(DISTINCT label)::bigint AS count");
    push_label_filter(&mut w, field, doi, range);

    let row = w.finish().query_as::<DistinctRow>().fetch_one(pool).await?;
    Ok(row.count)
}
