//! Top values of the per-publication discussion vocabularies.

use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

/// A discussion vocabulary the ingestion pipeline counts per publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscussionFacet {
    Word,
    Hashtag,
    Entity,
    Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FacetValueRow {
    pub value: String,
    pub count: i64,
}

impl DiscussionFacet {
    pub const ALL: [DiscussionFacet; 4] = [
        DiscussionFacet::Word,
        DiscussionFacet::Hashtag,
        DiscussionFacet::Entity,
        DiscussionFacet::Type,
    ];

    /// `$1` is an optional DOI filter, `$2` the row limit.
    const fn sql(self) -> &'static str {
        match self {
            DiscussionFacet::Word => {
                "SELECT dw.word AS value, SUM(d.count)::bigint AS count \
                 FROM discussion_word_data d \
                 JOIN discussion_word dw ON dw.id = d.discussion_word_id \
                 WHERE ($1::TEXT IS NULL OR d.publication_doi = $1) \
                 GROUP BY dw.word \
                 ORDER BY count DESC, value ASC \
                 LIMIT $2"
            }
            DiscussionFacet::Hashtag => {
                "SELECT dh.hashtag AS value, SUM(d.count)::bigint AS count \
                 FROM discussion_hashtag_data d \
                 JOIN discussion_hashtag dh ON dh.id = d.discussion_hashtag_id \
                 WHERE ($1::TEXT IS NULL OR d.publication_doi = $1) \
                 GROUP BY dh.hashtag \
                 ORDER BY count DESC, value ASC \
                 LIMIT $2"
            }
            DiscussionFacet::Entity => {
                "SELECT de.entity AS value, SUM(d.count)::bigint AS count \
                 FROM discussion_entity_data d \
                 JOIN discussion_entity de ON de.id = d.discussion_entity_id \
                 WHERE ($1::TEXT IS NULL OR d.publication_doi = $1) \
                 GROUP BY de.entity \
                 ORDER BY count DESC, value ASC \
                 LIMIT $2"
            }
            DiscussionFacet::Type => {
                "SELECT dt.type AS value, SUM(d.count)::bigint AS count \
                 FROM discussion_type_data d \
                 JOIN discussion_type dt ON dt.id = d.discussion_type_id \
                 WHERE ($1::TEXT IS NULL OR d.publication_doi = $1) \
                 GROUP BY dt.type \
                 ORDER BY count DESC, value ASC \
                 LIMIT $2"
            }
        }
    }

    /// Default number of values returned when the caller gives no limit.
    #[must_use]
    pub const fn default_limit(self) -> i64 {
        match self {
            DiscussionFacet::Word => 100,
            DiscussionFacet::Entity => 20,
            DiscussionFacet::Hashtag | DiscussionFacet::Type => 10,
        }
    }
}

/// Most frequent values of a facet, for one publication or across all of them.
/// Ordered by count descending, ties by value.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the query fails.
pub async fn top_facet_values(
    pool: &PgPool,
    facet: DiscussionFacet,
    doi: Option<&str>,
    limit: i64,
) -> Result<Vec<FacetValueRow>, DbError> {
    let rows = sqlx::query_as::<_, FacetValueRow>(facet.sql())
        .bind(doi)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_facet_filters_by_optional_doi_and_binds_limit() {
        for facet in DiscussionFacet::ALL {
            let sql = facet.sql();
            assert!(sql.contains("($1::TEXT IS NULL OR d.publication_doi = $1)"));
            assert!(sql.ends_with("LIMIT $2"));
            assert!(sql.contains("ORDER BY count DESC, value ASC"));
        }
    }

    #[test]
    fn facet_serializes_lowercase() {
        let json = serde_json::to_string(&DiscussionFacet::Hashtag).expect("serialize");
        assert_eq!(json, "\"hashtag\"");
    }
}
