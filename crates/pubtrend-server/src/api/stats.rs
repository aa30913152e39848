use std::collections::BTreeMap;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use futures::future::try_join_all;
use pubtrend_core::{CoreError, LabelField, MetricField, ProfileComparison, Scope, TimeRange};
use pubtrend_db::{
    DiscussionFacet, EntityScope, FacetValueRow, LabelCountRow, TopValuesRequest,
    TopValuesResult, WindowMode, WindowedSeries,
};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    map_db_error, normalize_limit, parse_dois, parse_fields, ApiError, ApiResponse, AppState,
    DoiParams, DurationParams, DEFAULT_TOP_N,
};

#[derive(Debug, Deserialize)]
pub(super) struct ScopeParams {
    pub scope: Option<String>,
    pub id: Option<String>,
}

impl ScopeParams {
    /// Missing scope kind means `publication`; with no id that is every
    /// publication.
    fn parse(&self) -> Result<Scope, ApiError> {
        let kind = self.scope.as_deref().unwrap_or("publication");
        Ok(Scope::parse(kind, self.id.as_deref())?)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct FieldParams {
    pub fields: Option<String>,
    pub mode: Option<String>,
}

impl FieldParams {
    fn mode(&self) -> Result<WindowMode, ApiError> {
        match self.mode.as_deref() {
            None | Some("standard") => Ok(WindowMode::Standard),
            Some("cumulative") => Ok(WindowMode::Cumulative),
            Some(other) => Err(ApiError::invalid(&CoreError::InvalidParameter {
                name: "mode",
                reason: format!("expected `standard` or `cumulative`, got `{other}`"),
            })),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TopParams {
    pub n: Option<i64>,
    pub dois: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct CountResult {
    count: i64,
}

// ---------------------------------------------------------------------------
// Numeric summaries and charts
// ---------------------------------------------------------------------------

/// One aggregate per requested field over the publications in scope.
pub(super) async fn numbers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(scope): Query<ScopeParams>,
    Query(fields): Query<FieldParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<BTreeMap<&'static str, Option<f64>>>>, ApiError> {
    let started = Instant::now();
    let range = duration.range()?;
    let scope = scope.parse()?;
    let fields = parse_fields(fields.fields.as_deref())?;

    let entities = pubtrend_db::resolve_scope(&state.stores.relational, &scope, range.key())
        .await
        .map_err(|e| map_db_error(&req_id, e))?;
    let values =
        pubtrend_db::aggregate_values(&state.stores.timeseries, entities.keys(), &range, &fields)
            .await
            .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, values))
}

pub(super) async fn top(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(top): Query<TopParams>,
    Query(fields): Query<FieldParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<TopValuesResult>>, ApiError> {
    let started = Instant::now();
    let request = TopValuesRequest {
        range: duration.range()?,
        fields: parse_fields(fields.fields.as_deref())?,
        n: normalize_n(top.n, state.limits.max_top_n)?,
        dois: parse_dois(top.dois.as_deref()),
    };

    let result = pubtrend_db::top_values(&state.stores, &request)
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, result))
}

fn normalize_n(n: Option<i64>, max: i64) -> Result<i64, ApiError> {
    match n {
        Some(n) if n < 1 => Err(ApiError::invalid(&CoreError::InvalidParameter {
            name: "n",
            reason: "must be at least 1".to_string(),
        })),
        Some(n) => Ok(n.min(max)),
        None => Ok(DEFAULT_TOP_N.min(max)),
    }
}

/// Per-publication windowed series for each requested field. A scope
/// covering every publication yields one aggregated series per field.
pub(super) async fn progress(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(scope): Query<ScopeParams>,
    Query(fields): Query<FieldParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<Vec<WindowedSeries>>>, ApiError> {
    let started = Instant::now();
    let range = duration.range()?;
    let scope = scope.parse()?;
    let mode = fields.mode()?;
    let fields = parse_fields(fields.fields.as_deref())?;

    let entities = pubtrend_db::resolve_scope(&state.stores.relational, &scope, range.key())
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    let series = match &entities {
        EntityScope::All => population(&state, &range, &fields, mode).await,
        EntityScope::Keys(keys) => try_join_all(fields.iter().map(|&field| {
            pubtrend_db::windowed_series(&state.stores.timeseries, keys, &range, field, mode)
        }))
        .await
        .map(|per_field| per_field.into_iter().flatten().collect()),
    }
    .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, series))
}

/// One series per field aggregated over every publication.
pub(super) async fn timeline(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(fields): Query<FieldParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<Vec<WindowedSeries>>>, ApiError> {
    let started = Instant::now();
    let range = duration.range()?;
    let mode = fields.mode()?;
    let fields = parse_fields(fields.fields.as_deref())?;

    let series = population(&state, &range, &fields, mode)
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, series))
}

async fn population(
    state: &AppState,
    range: &TimeRange,
    fields: &[MetricField],
    mode: WindowMode,
) -> Result<Vec<WindowedSeries>, pubtrend_db::DbError> {
    try_join_all(fields.iter().map(|&field| {
        pubtrend_db::population_series(&state.stores.timeseries, range, field, mode)
    }))
    .await
}

pub(super) async fn profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(doi): Query<DoiParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<ProfileComparison>>, ApiError> {
    let started = Instant::now();
    let doi = doi.required()?;
    let duration = duration.key()?;

    let comparison = pubtrend_db::profile_comparison(&state.stores.relational, doi, duration)
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, comparison))
}

// ---------------------------------------------------------------------------
// Discussion facets
// ---------------------------------------------------------------------------

async fn facet(
    state: &AppState,
    req_id: &RequestId,
    facet: DiscussionFacet,
    doi: &DoiParams,
    limit: &LimitParams,
) -> Result<Json<ApiResponse<Vec<FacetValueRow>>>, ApiError> {
    let started = Instant::now();
    let limit = normalize_limit(
        limit.limit,
        facet.default_limit(),
        state.limits.max_page_limit.max(facet.default_limit()),
    )?;

    let rows = pubtrend_db::top_facet_values(&state.stores.relational, facet, doi.optional(), limit)
        .await
        .map_err(|e| map_db_error(req_id, e))?;

    Ok(ApiResponse::timed(started, rows))
}

pub(super) async fn words(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(doi): Query<DoiParams>,
    Query(limit): Query<LimitParams>,
) -> Result<Json<ApiResponse<Vec<FacetValueRow>>>, ApiError> {
    facet(&state, &req_id, DiscussionFacet::Word, &doi, &limit).await
}

pub(super) async fn hashtags(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(doi): Query<DoiParams>,
    Query(limit): Query<LimitParams>,
) -> Result<Json<ApiResponse<Vec<FacetValueRow>>>, ApiError> {
    facet(&state, &req_id, DiscussionFacet::Hashtag, &doi, &limit).await
}

pub(super) async fn entities(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(doi): Query<DoiParams>,
    Query(limit): Query<LimitParams>,
) -> Result<Json<ApiResponse<Vec<FacetValueRow>>>, ApiError> {
    facet(&state, &req_id, DiscussionFacet::Entity, &doi, &limit).await
}

pub(super) async fn types(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(doi): Query<DoiParams>,
    Query(limit): Query<LimitParams>,
) -> Result<Json<ApiResponse<Vec<FacetValueRow>>>, ApiError> {
    facet(&state, &req_id, DiscussionFacet::Type, &doi, &limit).await
}

// ---------------------------------------------------------------------------
// Label series
// ---------------------------------------------------------------------------

async fn labels(
    state: &AppState,
    req_id: &RequestId,
    field: LabelField,
    doi: &DoiParams,
    limit: &LimitParams,
    duration: &DurationParams,
) -> Result<Json<ApiResponse<Vec<LabelCountRow>>>, ApiError> {
    let started = Instant::now();
    let range = duration.range()?;
    let limit = normalize_limit(limit.limit, 10, state.limits.max_page_limit)?;

    let rows =
        pubtrend_db::top_labels(&state.stores.timeseries, field, doi.optional(), &range, limit)
            .await
            .map_err(|e| map_db_error(req_id, e))?;

    Ok(ApiResponse::timed(started, rows))
}

pub(super) async fn languages(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(doi): Query<DoiParams>,
    Query(limit): Query<LimitParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<Vec<LabelCountRow>>>, ApiError> {
    labels(&state, &req_id, LabelField::Language, &doi, &limit, &duration).await
}

pub(super) async fn locations(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(doi): Query<DoiParams>,
    Query(limit): Query<LimitParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<Vec<LabelCountRow>>>, ApiError> {
    labels(&state, &req_id, LabelField::AuthorLocation, &doi, &limit, &duration).await
}

/// Number of distinct accounts that discussed the publication (or anything).
pub(super) async fn discussion_authors(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(doi): Query<DoiParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<CountResult>>, ApiError> {
    let started = Instant::now();
    let range = duration.range()?;

    let count = pubtrend_db::distinct_label_count(
        &state.stores.timeseries,
        LabelField::AuthorName,
        doi.optional(),
        &range,
    )
    .await
    .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, CountResult { count }))
}
