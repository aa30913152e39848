//! Top-N selection from the relational store fused with time-series values.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use pubtrend_core::{MetricField, TimeRange};
use serde::Serialize;
use sqlx::PgPool;

use crate::timeseries::{top_n_by_count, values_by_entity};
use crate::trending::{has_trending_records, top_n};
use crate::{DbError, Stores};

#[derive(Debug, Clone)]
pub struct TopValuesRequest {
    pub range: TimeRange,
    pub fields: Vec<MetricField>,
    pub n: i64,
    /// Explicit publications; when set, no top-N selection happens.
    pub dois: Option<Vec<String>>,
}

/// Where the publication list of a [`TopValuesResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopSelection {
    Explicit,
    Trending,
    EventCount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopValuesResult {
    pub selection: TopSelection,
    /// Publications in ranking order (or request order for explicit DOIs).
    pub dois: Vec<String>,
    /// Field name to per-DOI aggregate.
    pub values: BTreeMap<&'static str, BTreeMap<String, Option<f64>>>,
}

async fn select_top(
    stores: &Stores,
    request: &TopValuesRequest,
) -> Result<(TopSelection, Vec<String>), DbError> {
    if let Some(dois) = &request.dois {
        return Ok((TopSelection::Explicit, dois.clone()));
    }

    let duration = request.range.key();
    let (selection, rows) = if has_trending_records(&stores.relational, duration).await? {
        (
            TopSelection::Trending,
            top_n(&stores.relational, duration, request.n, None).await?,
        )
    } else {
        tracing::info!(duration = %duration, "no trending records; ranking by event count");
        (
            TopSelection::EventCount,
            top_n_by_count(&stores.timeseries, &request.range, request.n).await?,
        )
    };

    Ok((
        selection,
        rows.into_iter().map(|row| row.publication_doi).collect(),
    ))
}

async fn field_values(
    pool: &PgPool,
    dois: &[String],
    range: &TimeRange,
    field: MetricField,
) -> Result<(&'static str, BTreeMap<String, Option<f64>>), DbError> {
    let values = values_by_entity(pool, dois, range, field).await?;
    Ok((field.as_str(), values))
}

/// Pick the top publications for a duration (or take the given DOIs), then
/// fetch each requested field's aggregate for every one of them.
///
/// Field queries run concurrently.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] when `n` is not positive, or
/// [`DbError::Store`] if any query fails.
pub async fn top_values(
    stores: &Stores,
    request: &TopValuesRequest,
) -> Result<TopValuesResult, DbError> {
    let (selection, dois) = select_top(stores, request).await?;

    let values = try_join_all(
        request
            .fields
            .iter()
            .map(|&field| field_values(&stores.timeseries, &dois, &request.range, field)),
    )
    .await?
    .into_iter()
    .collect();

    tracing::debug!(
        duration = %request.range.key(),
        selection = ?selection,
        dois = dois.len(),
        fields = request.fields.len(),
        "top values"
    );
    Ok(TopValuesResult {
        selection,
        dois,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_serializes_snake_case() {
        let json = serde_json::to_string(&TopSelection::EventCount).expect("serialize");
        assert_eq!(json, "\"event_count\"");
    }

    #[test]
    fn result_keys_values_by_field_name() {
        let mut per_doi = BTreeMap::new();
        per_doi.insert("10.1/a".to_string(), Some(3.0));
        let mut values = BTreeMap::new();
        values.insert(MetricField::Followers.as_str(), per_doi);

        let result = TopValuesResult {
            selection: TopSelection::Explicit,
            dois: vec!["10.1/a".to_string()],
            values,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["values"]["followers"]["10.1/a"], 3.0);
        assert_eq!(json["selection"], "explicit");
    }
}
