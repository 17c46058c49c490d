use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::state::AppState;
use assay_service::{Error, RecommendRequest, RecommendResponse, ReloadReport, StatsSnapshot};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/recommend", post(recommend))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/reload_catalog", post(reload_catalog))
		.route("/v1/admin/stats", get(stats))
		.with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub catalog: Option<CatalogHealth>,
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
	pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CatalogHealth {
	pub items: usize,
	pub fingerprint: String,
	#[serde(with = "time::serde::rfc3339")]
	pub loaded_at: OffsetDateTime,
}

/// 200 once a catalog is installed, 503 before that.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
	let catalog = state.service.catalog.current().map(|snapshot| CatalogHealth {
		items: snapshot.len(),
		fingerprint: snapshot.fingerprint().to_string(),
		loaded_at: snapshot.loaded_at(),
	});
	let (status_code, status) = match catalog {
		Some(_) => (StatusCode::OK, "ok"),
		None => (StatusCode::SERVICE_UNAVAILABLE, "no_catalog"),
	};

	(
		status_code,
		Json(HealthResponse {
			status,
			catalog,
			timestamp: OffsetDateTime::now_utc(),
			version: assay_cli::VERSION,
		}),
	)
}

async fn recommend(
	State(state): State<AppState>,
	Json(payload): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>, ApiError> {
	let response = state.service.recommend(payload).await?;

	Ok(Json(response))
}

async fn reload_catalog(State(state): State<AppState>) -> Result<Json<ReloadReport>, ApiError> {
	let response = state.service.reload_catalog().await?;

	Ok(Json(response))
}

async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
	Json(state.service.stats())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError::new(status, code, message)
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidQuery { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_query", message),
			Error::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message),
			Error::RetrievalUnavailable { message } => {
				tracing::warn!(%message, "Retrieval unavailable.");

				json_error(StatusCode::SERVICE_UNAVAILABLE, "retrieval_unavailable", message)
			},
			Error::Catalog { message } => {
				tracing::error!(%message, "Catalog operation failed.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "catalog_error", message)
			},
			Error::Provider { message } =>
				json_error(StatusCode::BAD_GATEWAY, "provider_error", message),
			Error::Config { message } =>
				json_error(StatusCode::INTERNAL_SERVER_ERROR, "config_error", message),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
