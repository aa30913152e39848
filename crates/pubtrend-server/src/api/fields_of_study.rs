use std::time::Instant;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use pubtrend_db::{
    FieldOfStudyDetail, FieldOfStudyRow, TrendingFieldOfStudyRow, TrendingPublicationRow,
    TrendingScope,
};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{
    map_db_error, publications::trending_in_scope, ApiError, ApiResponse, AppState,
    DurationParams, IdParams, PageParams,
};

#[derive(Debug, Deserialize)]
pub(super) struct DetailParams {
    pub publications: Option<bool>,
}

pub(super) async fn list_fields_of_study(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(page): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<FieldOfStudyRow>>>, ApiError> {
    let started = Instant::now();
    let query = page.into_list_query(state.limits, "asc")?;

    let rows = pubtrend_db::list_fields_of_study(&state.stores.relational, &query)
        .await
        .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, rows))
}

pub(super) async fn list_trending_fields_of_study(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(page): Query<PageParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<Vec<TrendingFieldOfStudyRow>>>, ApiError> {
    let started = Instant::now();
    let duration = duration.key()?;
    let query = page.into_list_query(state.limits, "desc")?;

    let rows =
        pubtrend_db::list_trending_fields_of_study(&state.stores.relational, duration, &query)
            .await
            .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, rows))
}

pub(super) async fn get_field_of_study(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(id): Query<IdParams>,
    Query(detail): Query<DetailParams>,
) -> Result<Json<ApiResponse<FieldOfStudyDetail>>, ApiError> {
    let started = Instant::now();
    let id = id.required()?;

    let fos = pubtrend_db::get_field_of_study(
        &state.stores.relational,
        id,
        detail.publications.unwrap_or(false),
    )
    .await
    .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(started, fos))
}

pub(super) async fn list_field_of_study_publications(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(id): Query<IdParams>,
    Query(page): Query<PageParams>,
    Query(duration): Query<DurationParams>,
) -> Result<Json<ApiResponse<Vec<TrendingPublicationRow>>>, ApiError> {
    let scope = TrendingScope::FieldOfStudy(id.required()?);
    trending_in_scope(&state, &req_id, scope, page, &duration).await
}
