//! Author listings, trending authors and author detail.

use pubtrend_core::DurationKey;
use serde::Serialize;
use sqlx::PgPool;

use crate::publications::PublicationSummaryRow;
use crate::query_builder::{build, ListQuery, ListingShape, QueryWriter, SortAllowList, SortColumn};
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AuthorRow {
    pub id: i64,
    pub name: String,
    pub publication_count: i64,
    pub total_count: i64,
}

/// An author's trending metrics summed over their publications for one duration.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TrendingAuthorRow {
    pub trending_ranking: i64,
    pub id: i64,
    pub name: String,
    pub pub_count: i64,
    pub score: f64,
    pub count: i64,
    pub sum_followers: Option<i64>,
    pub mean_sentiment: Option<f64>,
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorDetail {
    pub id: i64,
    pub name: String,
    pub publications: Vec<PublicationSummaryRow>,
}

#[derive(sqlx::FromRow)]
struct AuthorNameRow {
    id: i64,
    name: String,
}

// ---------------------------------------------------------------------------
// Listing shapes
// ---------------------------------------------------------------------------

const AUTHOR_SORT: &[SortColumn] = &[
    SortColumn::new("id", "a.id"),
    SortColumn::new("name", "a.name"),
    SortColumn::new("publication_count", "publication_count"),
];

const AUTHORS: ListingShape = ListingShape {
    search_clause: " WHERE a.name ILIKE ",
    tail: " GROUP BY a.id",
    sortable: SortAllowList::new(AUTHOR_SORT),
    tiebreak: "a.id",
};

const TRENDING_AUTHOR_SORT: &[SortColumn] = &[
    SortColumn::new("score", "agg.score"),
    SortColumn::new("trending_ranking", "trending_ranking"),
    SortColumn::new("count", "agg.count"),
    SortColumn::new("pub_count", "agg.pub_count"),
    SortColumn::new("sum_followers", "agg.sum_followers"),
    SortColumn::new("mean_sentiment", "agg.mean_sentiment"),
];

const TRENDING_AUTHORS: ListingShape = ListingShape {
    search_clause: " AND a.name ILIKE ",
    tail: " GROUP BY a.id, a.name) agg",
    sortable: SortAllowList::new(TRENDING_AUTHOR_SORT),
    tiebreak: "agg.id",
};

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Lists authors with their publication counts.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn list_authors(pool: &PgPool, query: &ListQuery) -> Result<Vec<AuthorRow>, DbError> {
    let base = QueryWriter::new(
        "SELECT a.id, a.name, COUNT(pa.publication_doi) AS publication_count, \
                count(*) OVER() AS total_count \
         FROM author a \
         LEFT JOIN publication_author pa ON pa.author_id = a.id",
    );
    let query = build(base, &AUTHORS, query);

    let rows = query.query_as::<AuthorRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Lists authors ranked by the summed score of their publications' trending
/// records for `duration`. Authors with no such record are excluded.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn list_trending_authors(
    pool: &PgPool,
    duration: DurationKey,
    query: &ListQuery,
) -> Result<Vec<TrendingAuthorRow>, DbError> {
    let mut base = QueryWriter::new(
        "SELECT ROW_NUMBER() OVER (ORDER BY agg.score DESC, agg.id ASC) AS trending_ranking, \
                agg.id, agg.name, agg.pub_count, agg.score, agg.count, agg.sum_followers, \
                agg.mean_sentiment, count(*) OVER() AS total_count \
         FROM ( \
             SELECT a.id, a.name, \
                    COUNT(t.publication_doi) AS pub_count, \
                    SUM(t.score) AS score, \
                    SUM(t.count)::bigint AS count, \
                    SUM(t.sum_followers)::bigint AS sum_followers, \
                    AVG(t.mean_sentiment) AS mean_sentiment \
             FROM author a \
             JOIN publication_author pa ON pa.author_id = a.id \
             JOIN trending t ON t.publication_doi = pa.publication_doi \
             WHERE t.duration = ",
    );
    base.push_bind(duration.as_str());
    let query = build(base, &TRENDING_AUTHORS, query);

    let rows = query.query_as::<TrendingAuthorRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Returns an author with all of their publications, newest first.
///
/// # Errors
///
/// Returns [`DbError::EntityNotFound`] when no author has this id, or
/// [`DbError::Store`] if a query fails.
pub async fn get_author(pool: &PgPool, id: i64) -> Result<AuthorDetail, DbError> {
    let author = sqlx::query_as::<_, AuthorNameRow>("SELECT id, name FROM author WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::not_found("author", &id))?;

    let publications = sqlx::query_as::<_, PublicationSummaryRow>(
        "SELECT p.id, p.doi, p.title, p.pub_date, p.year, p.citation_count \
         FROM publication_author pa \
         JOIN publication p ON p.doi = pa.publication_doi \
         WHERE pa.author_id = $1 \
         ORDER BY p.pub_date DESC NULLS LAST, p.doi ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(AuthorDetail {
        id: author.id,
        name: author.name,
        publications,
    })
}
