use std::time::Instant;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use pubtrend_db::{AuthorDetail, AuthorRow, TrendingAuthorRow, TrendingPublicationRow, TrendingScope};

use crate::middleware::RequestId;

use super::{
    map_db_error, publications::trending_in_scope, ApiError, ApiResponse, AppState,
    DurationParams, IdParams, PageParams,
};

pub(super) async fn list_authors(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(page): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<AuthorRow>>>, ApiError> {
    let started = Instant::now();
    let query = page.into_list_query(state.limits, "asc")?;

    let rows = pubtrend_db::list_authors(&state.stores.relational, &query)
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, rows))
}

pub(super) async fn list_trending_authors(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(page): Query<PageParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<Vec<TrendingAuthorRow>>>, ApiError> {
    let started = Instant::now();
    let duration = duration.key()?;
    let query = page.into_list_query(state.limits, "desc")?;

    let rows = pubtrend_db::list_trending_authors(&state.stores.relational, duration, &query)
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, rows))
}

pub(super) async fn get_author(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(id): Query<IdParams>,
) -> Result<Json<ApiResponse<AuthorDetail>>, ApiError> {
    let started = Instant::now();
    let id = id.required()?;

    let author = pubtrend_db::get_author(&state.stores.relational, id)
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, author))
}

pub(super) async fn list_author_publications(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(id): Query<IdParams>,
    Query(page): Query<PageParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<Vec<TrendingPublicationRow>>>, ApiError> {
    let scope = TrendingScope::Author(id.required()?);
    trending_in_scope(&state, &req_id, scope, page, &duration).await
}
