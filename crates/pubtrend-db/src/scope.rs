//! Narrowing a request scope to concrete publication DOIs.

use pubtrend_core::{DurationKey, Scope};
use sqlx::PgPool;

use crate::DbError;

/// The publications a query covers after scope resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityScope {
    /// No narrowing: every publication.
    All,
    /// Exactly these DOIs, ascending. May be empty.
    Keys(Vec<String>),
}

impl EntityScope {
    /// The DOI filter to pass to time-series queries; `None` means unfiltered.
    #[must_use]
    pub fn keys(&self) -> Option<&[String]> {
        match self {
            EntityScope::All => None,
            EntityScope::Keys(keys) => Some(keys.as_slice()),
        }
    }

    /// True when the scope can match nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, EntityScope::Keys(keys) if keys.is_empty())
    }
}

/// Resolve a scope to publication DOIs.
///
/// A publication scope maps to its DOI (or to all publications without one).
/// Author and field-of-study scopes map to their linked publications that
/// have a trending record for `duration`; an unknown id yields no keys.
///
/// # Errors
///
/// Returns [`DbError::Store`] if the lookup fails.
pub async fn resolve_scope(
    pool: &PgPool,
    scope: &Scope,
    duration: DurationKey,
) -> Result<EntityScope, DbError> {
    let keys = match scope {
        Scope::Publication(None) => return Ok(EntityScope::All),
        Scope::Publication(Some(doi)) => return Ok(EntityScope::Keys(vec![doi.clone()])),
        Scope::Author(author_id) => {
            sqlx::query_scalar::<_, String>(
                "SELECT DISTINCT pa.publication_doi \
                 FROM publication_author pa \
                 JOIN trending t ON t.publication_doi = pa.publication_doi \
                 WHERE pa.author_id = $1 AND t.duration = $2 \
                 ORDER BY pa.publication_doi",
            )
            .bind(author_id)
            .bind(duration.as_str())
            .fetch_all(pool)
            .await?
        }
        Scope::FieldOfStudy(fos_id) => {
            sqlx::query_scalar::<_, String>(
                "SELECT DISTINCT pfos.publication_doi \
                 FROM publication_field_of_study pfos \
                 JOIN trending t ON t.publication_doi = pfos.publication_doi \
                 WHERE pfos.field_of_study_id = $1 AND t.duration = $2 \
                 ORDER BY pfos.publication_doi",
            )
            .bind(fos_id)
            .bind(duration.as_str())
            .fetch_all(pool)
            .await?
        }
    };

    tracing::debug!(scope = ?scope, duration = %duration, keys = keys.len(), "resolved scope");
    Ok(EntityScope::Keys(keys))
}
