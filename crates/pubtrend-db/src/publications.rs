//! Publication listings, trending publication listings and publication detail.

use chrono::NaiveDate;
use pubtrend_core::DurationKey;
use serde::Serialize;
use sqlx::PgPool;

use crate::query_builder::{build, ListQuery, ListingShape, QueryWriter, SortAllowList, SortColumn};
use crate::trending::{trending_columns, trending_rank, TrendingMetrics};
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Listing row: publication columns plus related names.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PublicationRow {
    pub id: i64,
    pub doi: String,
    pub title: String,
    pub pub_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub publisher: Option<String>,
    pub citation_count: i32,
    pub reference_count: i32,
    pub authors: Vec<String>,
    pub fields_of_study: Vec<String>,
    /// Rows matching the filter across all pages.
    pub total_count: i64,
}

/// Publication joined with its trending record for one duration.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TrendingPublicationRow {
    pub trending_ranking: i64,
    pub id: i64,
    pub doi: String,
    pub title: String,
    pub pub_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub citation_count: i32,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub metrics: TrendingMetrics,
    pub total_count: i64,
}

/// Compact publication reference used inside author and field-of-study detail.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PublicationSummaryRow {
    pub id: i64,
    pub doi: String,
    pub title: String,
    pub pub_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub citation_count: i32,
}

/// Full `publication` row.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PublicationRecord {
    pub id: i64,
    pub doi: String,
    pub title: String,
    pub pub_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub publisher: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub publication_type: Option<String>,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub license: Option<String>,
    pub url: Option<String>,
    pub citation_count: i32,
    pub reference_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SourceRow {
    pub id: i64,
    pub title: String,
    pub url: Option<String>,
    pub license: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicationDetail {
    pub publication: PublicationRecord,
    pub authors: Vec<NamedRef>,
    pub fields_of_study: Vec<NamedRef>,
    pub sources: Vec<SourceRow>,
    /// Rank within the requested duration; `None` without a trending record.
    pub trending_ranking: Option<i64>,
}

/// Which publications a trending listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendingScope {
    All,
    Author(i64),
    FieldOfStudy(i64),
}

// ---------------------------------------------------------------------------
// Listing shapes
// ---------------------------------------------------------------------------

const PUBLICATION_SORT: &[SortColumn] = &[
    SortColumn::new("id", "p.id"),
    SortColumn::new("title", "p.title"),
    SortColumn::new("pub_date", "p.pub_date"),
    SortColumn::new("year", "p.year"),
    SortColumn::new("citation_count", "p.citation_count"),
];

const PUBLICATIONS: ListingShape = ListingShape {
    search_clause: " WHERE p.title ILIKE ",
    tail: " GROUP BY p.id",
    sortable: SortAllowList::new(PUBLICATION_SORT),
    tiebreak: "p.doi",
};

const TRENDING_PUBLICATION_SORT: &[SortColumn] = &[
    SortColumn::new("score", "t.score"),
    SortColumn::new("trending_ranking", "trending_ranking"),
    SortColumn::new("count", "t.count"),
    SortColumn::new("mean_sentiment", "t.mean_sentiment"),
    SortColumn::new("sum_followers", "t.sum_followers"),
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
    SortColumn::new("year", "p.year"),
    SortColumn::new("citation_count", "p.citation_count"),
];

const TRENDING_PUBLICATIONS: ListingShape = ListingShape {
    search_clause: " AND p.title ILIKE ",
    tail: "",
    sortable: SortAllowList::new(TRENDING_PUBLICATION_SORT),
    tiebreak: "p.doi",
};

const TRENDING_SELECT: &str = concat!(
    "SELECT ROW_NUMBER() OVER (ORDER BY t.score DESC, p.doi ASC) AS trending_ranking, \
            p.id, p.doi, p.title, p.pub_date, p.year, p.citation_count, ",
    trending_columns!(),
    ", count(*) OVER() AS total_count \
     FROM trending t \
     JOIN publication p ON p.doi = t.publication_doi "
);

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Lists publications with author and field-of-study names.
///
/// Sortable by `id` (default), `title`, `pub_date`, `year`, `citation_count`;
/// search matches the title.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn list_publications(
    pool: &PgPool,
    query: &ListQuery,
) -> Result<Vec<PublicationRow>, DbError> {
    let base = QueryWriter::new(
        "SELECT p.id, p.doi, p.title, p.pub_date, p.year, p.publisher, \
                p.citation_count, p.reference_count, \
                COALESCE(array_agg(DISTINCT a.name) FILTER (WHERE a.id IS NOT NULL), '{}') AS authors, \
                COALESCE(array_agg(DISTINCT fos.name) FILTER (WHERE fos.id IS NOT NULL), '{}') AS fields_of_study, \
                count(*) OVER() AS total_count \
         FROM publication p \
         LEFT JOIN publication_author pa ON pa.publication_doi = p.doi \
         LEFT JOIN author a ON a.id = pa.author_id \
         LEFT JOIN publication_field_of_study pfos ON pfos.publication_doi = p.doi \
         LEFT JOIN field_of_study fos ON fos.id = pfos.field_of_study_id",
    );
    let query = build(base, &PUBLICATIONS, query);

    let rows = query.query_as::<PublicationRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Lists publications that have a trending record for `duration`, optionally
/// narrowed to one author or field of study.
///
/// `trending_ranking` is the row number by score (ties by DOI) within the
/// filtered set. Sorts by `score` unless another allow-listed column is asked for.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn list_trending_publications(
    pool: &PgPool,
    scope: TrendingScope,
    duration: DurationKey,
    query: &ListQuery,
) -> Result<Vec<TrendingPublicationRow>, DbError> {
    let mut base = QueryWriter::new(TRENDING_SELECT);
    match scope {
        TrendingScope::All => {
            base.push("WHERE t.duration = ").push_bind(duration.as_str());
        }
        TrendingScope::Author(author_id) => {
            base.push(
                "JOIN publication_author pa ON pa.publication_doi = p.doi \
                 WHERE t.duration = ",
            )
            .push_bind(duration.as_str())
            .push(" AND pa.author_id = ")
            .push_bind(author_id);
        }
        TrendingScope::FieldOfStudy(fos_id) => {
            base.push(
                "JOIN publication_field_of_study pfos ON pfos.publication_doi = p.doi \
                 WHERE t.duration = ",
            )
            .push_bind(duration.as_str())
            .push(" AND pfos.field_of_study_id = ")
            .push_bind(fos_id);
        }
    }
    let query = build(base, &TRENDING_PUBLICATIONS, query);

    let rows = query
        .query_as::<TrendingPublicationRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Returns one publication with its authors, fields of study, sources and
/// its trending rank for `duration`.
///
/// # Errors
///
/// Returns [`DbError::EntityNotFound`] when no publication has this DOI, or
/// [`DbError::Store`] if a query fails.
pub async fn get_publication(
    pool: &PgPool,
    doi: &str,
    duration: DurationKey,
) -> Result<PublicationDetail, DbError> {
    let publication = sqlx::query_as::<_, PublicationRecord>(
        "SELECT id, doi, title, pub_date, year, publisher, type, abstract, license, url, \
                citation_count, reference_count \
         FROM publication \
         WHERE doi = $1",
    )
    .bind(doi)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("publication", doi))?;

    let authors = sqlx::query_as::<_, NamedRef>(
        "SELECT a.id, a.name \
         FROM publication_author pa \
         JOIN author a ON a.id = pa.author_id \
         WHERE pa.publication_doi = $1 \
         ORDER BY a.name, a.id",
    )
    .bind(doi)
    .fetch_all(pool);

    let fields_of_study = sqlx::query_as::<_, NamedRef>(
        "SELECT fos.id, fos.name \
         FROM publication_field_of_study pfos \
         JOIN field_of_study fos ON fos.id = pfos.field_of_study_id \
         WHERE pfos.publication_doi = $1 \
         ORDER BY fos.name, fos.id",
    )
    .bind(doi)
    .fetch_all(pool);

    let sources = sqlx::query_as::<_, SourceRow>(
        "SELECT s.id, s.title, s.url, s.license \
         FROM publication_source ps \
         JOIN source s ON s.id = ps.source_id \
         WHERE ps.publication_doi = $1 \
         ORDER BY s.id",
    )
    .bind(doi)
    .fetch_all(pool);

    let (authors, fields_of_study, sources, trending_ranking) = futures::try_join!(
        async { authors.await.map_err(DbError::from) },
        async { fields_of_study.await.map_err(DbError::from) },
        async { sources.await.map_err(DbError::from) },
        trending_rank(pool, doi, duration),
    )?;

    Ok(PublicationDetail {
        publication,
        authors,
        fields_of_study,
        sources,
        trending_ranking,
    })
}
