//! Field-of-study listings, trending fields of study and field-of-study detail.

use pubtrend_core::DurationKey;
use serde::Serialize;
use sqlx::PgPool;

use crate::publications::PublicationSummaryRow;
use crate::query_builder::{build, ListQuery, ListingShape, QueryWriter, SortAllowList, SortColumn};
use crate::trending::TrendingMetrics;
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct FieldOfStudyRow {
    pub id: i64,
    pub name: String,
    pub level: Option<i32>,
    pub publication_count: i64,
    pub total_count: i64,
}

/// Trending metrics of a field of study: counters summed and normalized
/// metrics averaged over its member publications.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TrendingFieldOfStudyRow {
    pub trending_ranking: i64,
    pub id: i64,
    pub name: String,
    pub pub_count: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub metrics: TrendingMetrics,
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldOfStudyDetail {
    pub id: i64,
    pub name: String,
    pub level: Option<i32>,
    /// Only populated when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publications: Option<Vec<PublicationSummaryRow>>,
}

#[derive(sqlx::FromRow)]
struct FieldOfStudyNameRow {
    id: i64,
    name: String,
    level: Option<i32>,
}

// ---------------------------------------------------------------------------
// Listing shapes
// ---------------------------------------------------------------------------

const FIELD_OF_STUDY_SORT: &[SortColumn] = &[
    SortColumn::new("id", "fos.id"),
    SortColumn::new("name", "fos.name"),
    SortColumn::new("level", "fos.level"),
    SortColumn::new("publication_count", "publication_count"),
];

const FIELDS_OF_STUDY: ListingShape = ListingShape {
    search_clause: " WHERE fos.name ILIKE ",
    tail: " GROUP BY fos.id",
    sortable: SortAllowList::new(FIELD_OF_STUDY_SORT),
    tiebreak: "fos.id",
};

const TRENDING_FIELD_OF_STUDY_SORT: &[SortColumn] = &[
    SortColumn::new("score", "agg.score"),
    SortColumn::new("trending_ranking", "trending_ranking"),
    SortColumn::new("count", "agg.count"),
    SortColumn::new("pub_count", "agg.pub_count"),
    SortColumn::new("mean_sentiment", "agg.mean_sentiment"),
    SortColumn::new("sum_followers", "agg.sum_followers"),
    SortColumn::new("abstract_difference", "agg.abstract_difference"),
    SortColumn::new("mean_age", "agg.mean_age"),
    SortColumn::new("mean_length", "agg.mean_length"),
    SortColumn::new("mean_questions", "agg.mean_questions"),
    SortColumn::new("mean_exclamations", "agg.mean_exclamations"),
    SortColumn::new("mean_bot_rating", "agg.mean_bot_rating"),
    SortColumn::new("projected_change", "agg.projected_change"),
    SortColumn::new("trending", "agg.trending"),
    SortColumn::new("ema", "agg.ema"),
    SortColumn::new("kama", "agg.kama"),
    SortColumn::new("ker", "agg.ker"),
    SortColumn::new("mean_score", "agg.mean_score"),
    SortColumn::new("stddev", "agg.stddev"),
];

const TRENDING_FIELDS_OF_STUDY: ListingShape = ListingShape {
    search_clause: " AND fos.name ILIKE ",
    tail: " GROUP BY fos.id, fos.name) agg",
    sortable: SortAllowList::new(TRENDING_FIELD_OF_STUDY_SORT),
    tiebreak: "agg.id",
};

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Lists fields of study with their publication counts.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn list_fields_of_study(
    pool: &PgPool,
    query: &ListQuery,
) -> Result<Vec<FieldOfStudyRow>, DbError> {
    let base = QueryWriter::new(
        "SELECT fos.id, fos.name, fos.level, \
                COUNT(pfos.publication_doi) AS publication_count, \
                count(*) OVER() AS total_count \
         FROM field_of_study fos \
         LEFT JOIN publication_field_of_study pfos ON pfos.field_of_study_id = fos.id",
    );
    let query = build(base, &FIELDS_OF_STUDY, query);

    let rows = query.query_as::<FieldOfStudyRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Lists fields of study ranked by the summed score of their publications'
/// trending records for `duration`.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn list_trending_fields_of_study(
    pool: &PgPool,
    duration: DurationKey,
    query: &ListQuery,
) -> Result<Vec<TrendingFieldOfStudyRow>, DbError> {
    let mut base = QueryWriter::new(
        "SELECT ROW_NUMBER() OVER (ORDER BY agg.score DESC, agg.id ASC) AS trending_ranking, \
                agg.*, count(*) OVER() AS total_count \
         FROM ( \
             SELECT fos.id, fos.name, \
                    COUNT(t.publication_doi) AS pub_count, \
                    SUM(t.score) AS score, \
                    SUM(t.count)::bigint AS count, \
                    AVG(t.mean_sentiment) AS mean_sentiment, \
                    SUM(t.sum_followers)::bigint AS sum_followers, \
                    AVG(t.abstract_difference) AS abstract_difference, \
                    AVG(t.mean_age) AS mean_age, \
                    AVG(t.mean_length) AS mean_length, \
                    AVG(t.mean_questions) AS mean_questions, \
                    AVG(t.mean_exclamations) AS mean_exclamations, \
                    AVG(t.mean_bot_rating) AS mean_bot_rating, \
                    AVG(t.projected_change) AS projected_change, \
                    AVG(t.trending) AS trending, \
                    AVG(t.ema) AS ema, \
                    AVG(t.kama) AS kama, \
                    AVG(t.ker) AS ker, \
                    AVG(t.mean_score) AS mean_score, \
                    AVG(t.stddev) AS stddev \
             FROM trending t \
             JOIN publication_field_of_study pfos ON pfos.publication_doi = t.publication_doi \
             JOIN field_of_study fos ON fos.id = pfos.field_of_study_id \
             WHERE t.duration = ",
    );
    base.push_bind(duration.as_str());
    let query = build(base, &TRENDING_FIELDS_OF_STUDY, query);

    let rows = query
        .query_as::<TrendingFieldOfStudyRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Returns a field of study, optionally with its publications.
///
/// # Errors
///
/// Returns [`DbError::EntityNotFound`] when no field of study has this id,
/// or [`DbError::Store`] if a query fails.
pub async fn get_field_of_study(
    pool: &PgPool,
    id: i64,
    with_publications: bool,
) -> Result<FieldOfStudyDetail, DbError> {
    let fos = sqlx::query_as::<_, FieldOfStudyNameRow>(
        "SELECT id, name, level FROM field_of_study WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("field of study", &id))?;

    let publications = if with_publications {
        let rows = sqlx::query_as::<_, PublicationSummaryRow>(
            "SELECT p.id, p.doi, p.title, p.pub_date, p.year, p.citation_count \
             FROM publication_field_of_study pfos \
             JOIN publication p ON p.doi = pfos.publication_doi \
             WHERE pfos.field_of_study_id = $1 \
             ORDER BY p.pub_date DESC NULLS LAST, p.doi ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Some(rows)
    } else {
        None
    };

    Ok(FieldOfStudyDetail {
        id: fos.id,
        name: fos.name,
        level: fos.level,
        publications,
    })
}
