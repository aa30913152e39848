mod authors;
mod fields_of_study;
mod publications;
mod stats;

use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::{TimeDelta, Utc};
use pubtrend_core::{AppConfig, CoreError, DurationKey, MetricField, TimeRange};
use pubtrend_db::{DbError, ListQuery, Stores};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id, RequestId};

const DEFAULT_PAGE_LIMIT: i64 = 10;
pub(super) const DEFAULT_TOP_N: i64 = 10;
/// The raw bucket counts as live when it received a point this recently.
const AVAILABILITY_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_page_limit: i64,
    pub max_top_n: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub limits: Limits,
}

impl AppState {
    pub fn new(stores: Stores, config: &AppConfig) -> Self {
        Self {
            stores,
            limits: Limits {
                max_page_limit: config.max_page_limit,
                max_top_n: config.max_top_n,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub time_ms: u64,
    pub results: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn timed(started: Instant, results: T) -> Json<Self> {
        let time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Json(Self { time_ms, results })
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ApiError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                parameter: None,
                value: None,
            },
        }
    }

    /// A 400 naming the request parameter and, when known, its bad value.
    pub fn invalid(error: &CoreError) -> Self {
        Self {
            error: ErrorBody {
                code: "invalid_parameter",
                message: error.to_string(),
                parameter: Some(error.parameter()),
                value: error.value().map(ToOwned::to_owned),
            },
        }
    }

    fn missing(parameter: &'static str) -> Self {
        Self::invalid(&CoreError::InvalidParameter {
            name: parameter,
            reason: "is required".to_string(),
        })
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        Self::invalid(&error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code {
            "invalid_parameter" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "store_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(req_id: &RequestId, error: DbError) -> ApiError {
    match error {
        DbError::Invalid(core) => ApiError::invalid(&core),
        DbError::EntityNotFound { .. } => ApiError::new("not_found", error.to_string()),
        DbError::Store(_) | DbError::Migration(_) => {
            tracing::error!(request_id = %req_id.0, error = %error, "store query failed");
            ApiError::new("store_unavailable", "store unavailable")
        }
    }
}

// ---------------------------------------------------------------------------
// Shared query parameters
// ---------------------------------------------------------------------------

/// Clamp `limit` to `max`, defaulting to `default`. Non-positive limits are
/// rejected rather than coerced.
pub(super) fn normalize_limit(limit: Option<i64>, default: i64, max: i64) -> Result<i64, ApiError> {
    match limit {
        Some(limit) if limit < 1 => Err(ApiError::invalid(&CoreError::InvalidParameter {
            name: "limit",
            reason: "must be at least 1".to_string(),
        })),
        Some(limit) => Ok(limit.min(max)),
        None => Ok(default.min(max)),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct PageParams {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
}

impl PageParams {
    /// `default_order` applies only when the caller sent no `order`.
    pub(super) fn into_list_query(
        self,
        limits: Limits,
        default_order: &'static str,
    ) -> Result<ListQuery, ApiError> {
        let limit = normalize_limit(self.limit, DEFAULT_PAGE_LIMIT, limits.max_page_limit)?;
        let order = self.order.or_else(|| Some(default_order.to_string()));
        Ok(ListQuery::new(limit, self.offset.unwrap_or(0))?
            .with_sort(self.sort, order)
            .with_search(self.search))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct DurationParams {
    pub duration: Option<String>,
}

impl DurationParams {
    /// Missing duration means `currently`.
    pub(super) fn key(&self) -> Result<DurationKey, ApiError> {
        match self.duration.as_deref() {
            None => Ok(DurationKey::Currently),
            Some(raw) => Ok(raw.parse::<DurationKey>()?),
        }
    }

    /// The duration's lookback ending now.
    pub(super) fn range(&self) -> Result<TimeRange, ApiError> {
        Ok(self.key()?.definition().ending_at(Utc::now()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct IdParams {
    pub id: Option<i64>,
}

impl IdParams {
    pub(super) fn required(&self) -> Result<i64, ApiError> {
        self.id.ok_or_else(|| ApiError::missing("id"))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct DoiParams {
    pub doi: Option<String>,
}

impl DoiParams {
    pub(super) fn optional(&self) -> Option<&str> {
        self.doi.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub(super) fn required(&self) -> Result<&str, ApiError> {
        self.optional().ok_or_else(|| ApiError::missing("doi"))
    }
}

/// Comma-separated metric fields; absent or blank means `score`.
pub(super) fn parse_fields(raw: Option<&str>) -> Result<Vec<MetricField>, ApiError> {
    let fields = MetricField::parse_list(raw.unwrap_or_default())?;
    if fields.is_empty() {
        return Ok(vec![MetricField::Score]);
    }
    Ok(fields)
}

/// Comma-separated DOIs in first-seen order, duplicates dropped; `None` when
/// absent or blank.
pub(super) fn parse_dois(raw: Option<&str>) -> Option<Vec<String>> {
    let mut dois: Vec<String> = Vec::new();
    for doi in raw?.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !dois.iter().any(|seen| seen == doi) {
            dois.push(doi.to_owned());
        }
    }
    (!dois.is_empty()).then_some(dois)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/available", get(available))
        .route("/api/v1/publications", get(publications::list_publications))
        .route(
            "/api/v1/publications/trending",
            get(publications::list_trending_publications),
        )
        .route("/api/v1/publications/get", get(publications::get_publication))
        .route("/api/v1/authors", get(authors::list_authors))
        .route("/api/v1/authors/trending", get(authors::list_trending_authors))
        .route("/api/v1/authors/get", get(authors::get_author))
        .route(
            "/api/v1/authors/publications",
            get(authors::list_author_publications),
        )
        .route(
            "/api/v1/fields-of-study",
            get(fields_of_study::list_fields_of_study),
        )
        .route(
            "/api/v1/fields-of-study/trending",
            get(fields_of_study::list_trending_fields_of_study),
        )
        .route(
            "/api/v1/fields-of-study/get",
            get(fields_of_study::get_field_of_study),
        )
        .route(
            "/api/v1/fields-of-study/publications",
            get(fields_of_study::list_field_of_study_publications),
        )
        .route("/api/v1/stats/numbers", get(stats::numbers))
        .route("/api/v1/stats/top", get(stats::top))
        .route("/api/v1/stats/progress", get(stats::progress))
        .route("/api/v1/stats/timeline", get(stats::timeline))
        .route("/api/v1/stats/profile", get(stats::profile))
        .route("/api/v1/stats/words", get(stats::words))
        .route("/api/v1/stats/hashtags", get(stats::hashtags))
        .route("/api/v1/stats/entities", get(stats::entities))
        .route("/api/v1/stats/types", get(stats::types))
        .route("/api/v1/stats/languages", get(stats::languages))
        .route("/api/v1/stats/locations", get(stats::locations))
        .route("/api/v1/stats/authors", get(stats::discussion_authors))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let started = Instant::now();

    match pubtrend_db::health_check(&state.stores).await {
        Ok(()) => (
            StatusCode::OK,
            ApiResponse::timed(
                started,
                HealthData {
                    status: "ok",
                    database: "ok",
                },
            ),
        ),
        Err(e) => {
            tracing::warn!(request_id = %req_id.0, error = %e, "health check: store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiResponse::timed(
                    started,
                    HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                ),
            )
        }
    }
}

async fn available(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let started = Instant::now();
    let live = pubtrend_db::has_recent_points(
        &state.stores.timeseries,
        Utc::now(),
        TimeDelta::minutes(AVAILABILITY_WINDOW_MINUTES),
    )
    .await
    .map_err(|e| map_db_error(&req_id, e))?;

    Ok(ApiResponse::timed(
        started,
        if live { "ok" } else { "not running" },
    ))
}
