pub mod authors;
pub mod discussion;
pub mod fields_of_study;
pub mod profile;
pub mod publications;
pub mod query_builder;
pub mod scope;
pub mod stats;
pub mod timeseries;
pub mod trending;

pub use authors::{
    get_author, list_authors, list_trending_authors, AuthorDetail, AuthorRow, TrendingAuthorRow,
};
pub use discussion::{top_facet_values, DiscussionFacet, FacetValueRow};
pub use fields_of_study::{
    get_field_of_study, list_fields_of_study, list_trending_fields_of_study, FieldOfStudyDetail,
    FieldOfStudyRow, TrendingFieldOfStudyRow,
};
pub use profile::{entity_profile, population_profile, profile_comparison};
pub use publications::{
    get_publication, list_publications, list_trending_publications, PublicationDetail,
    PublicationRow, PublicationSummaryRow, TrendingPublicationRow, TrendingScope,
};
pub use query_builder::{ListQuery, SafeQuery, SortColumn, SortOrder};
pub use scope::{resolve_scope, EntityScope};
pub use stats::{top_values, TopSelection, TopValuesRequest, TopValuesResult};
pub use timeseries::{
    aggregate_value, aggregate_values, distinct_label_count, has_recent_points, population_series,
    top_labels, top_n_by_count, values_by_entity, windowed_series, LabelCountRow, SeriesPoint,
    WindowMode, WindowedSeries,
};
pub use trending::{has_trending_records, top_n, trending_rank, TopEntityRow, TrendingMetrics};

use std::fmt;
use std::time::Duration;

use pubtrend_core::{AppConfig, CoreError};
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/pubtrend-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{kind} not found: {key}")]
    EntityNotFound { kind: &'static str, key: String },
    #[error("store unavailable: {0}")]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Invalid(#[from] CoreError),
}

impl DbError {
    pub(crate) fn not_found(kind: &'static str, key: &(impl fmt::Display + ?Sized)) -> Self {
        DbError::EntityNotFound {
            kind,
            key: key.to_string(),
        }
    }
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// The two stores a request may touch. When the time-series store shares the
/// relational database both handles point at the same pool.
#[derive(Debug, Clone)]
pub struct Stores {
    pub relational: PgPool,
    pub timeseries: PgPool,
}

impl Stores {
    /// Build both pools from application config, sharing one pool when the
    /// URLs match.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Store`] if either connection cannot be established.
    pub async fn connect(config: &AppConfig) -> Result<Self, DbError> {
        let pool_config = PoolConfig::from_app_config(config);
        let relational = connect_pool(&config.database_url, pool_config).await?;
        let timeseries = if config.timeseries_database_url == config.database_url {
            relational.clone()
        } else {
            connect_pool(&config.timeseries_database_url, pool_config).await?
        };
        Ok(Self {
            relational,
            timeseries,
        })
    }

    #[must_use]
    pub fn shared(pool: PgPool) -> Self {
        Self {
            relational: pool.clone(),
            timeseries: pool,
        }
    }
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table does not exist on a fresh database; treat
    // that as zero applied.
    let applied_before = applied_migration_count(pool).await;
    MIGRATOR.run(pool).await?;
    let applied_after = applied_migration_count(pool).await;

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

async fn applied_migration_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Ping both stores.
///
/// # Errors
///
/// Returns [`DbError::Store`] for the first store that fails to answer.
pub async fn health_check(stores: &Stores) -> Result<(), DbError> {
    ping(&stores.relational).await?;
    ping(&stores.timeseries).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }

    #[test]
    fn not_found_names_kind_and_key() {
        let err = DbError::not_found("publication", "10.1/x");
        assert_eq!(err.to_string(), "publication not found: 10.1/x");
    }
}
