use std::time::Instant;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use pubtrend_db::{PublicationDetail, PublicationRow, TrendingPublicationRow, TrendingScope};

use crate::middleware::RequestId;

use super::{
    map_db_error, ApiError, ApiResponse, AppState, DoiParams, DurationParams, PageParams,
};

pub(super) async fn list_publications(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(page): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<PublicationRow>>>, ApiError> {
    let started = Instant::now();
    let query = page.into_list_query(state.limits, "asc")?;

    let rows = pubtrend_db::list_publications(&state.stores.relational, &query)
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, rows))
}

pub(super) async fn list_trending_publications(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(page): Query<PageParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<Vec<TrendingPublicationRow>>>, ApiError> {
    trending_in_scope(&state, &req_id, TrendingScope::All, page, &duration).await
}

/// Shared by the author and field-of-study publication listings.
pub(super) async fn trending_in_scope(
    state: &AppState,
    req_id: &RequestId,
    scope: TrendingScope,
    page: PageParams,
    duration: &DurationParams,
) -> Result<Json<ApiResponse<Vec<TrendingPublicationRow>>>, ApiError> {
    let started = Instant::now();
    let duration = duration.key()?;
    let query = page.into_list_query(state.limits, "desc")?;

    let rows =
        pubtrend_db::list_trending_publications(&state.stores.relational, scope, duration, &query)
            .await
            .map_err(|e| map_db_error(req_id, e))?;

    Ok(ApiResponse::timed(started, rows))
}

pub(super) async fn get_publication(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(doi): Query<DoiParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<PublicationDetail>>, ApiError> {
    let started = Instant::now();
    let doi = doi.required()?;
    let duration = duration.key()?;

    let detail = pubtrend_db::get_publication(&state.stores.relational, doi, duration)
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, detail))
}
