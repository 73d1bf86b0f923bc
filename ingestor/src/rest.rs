use crate::clock::{resolve_timestamps, Clock};
use crate::db::ReadingStore;
use crate::errors::Error;
use crate::metrics::{
    gather_metrics, DEVICES, INGEST_ACCEPTED_TOTAL, INGEST_REJECTED_TOTAL, INGEST_REQUESTS_TOTAL,
};
use crate::model::{HealthResponse, IngestRequest, IngestResponse, Reading};
use crate::validate::{validate, ValidationError};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: ReadingStore,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(store: ReadingStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/latest/:device_id", get(get_latest))
        .route("/devices", get(get_devices))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    INGEST_REQUESTS_TOTAL.inc();

    let Json(request) = payload.map_err(|rejection| {
        INGEST_REJECTED_TOTAL.inc();
        warn!("Rejected malformed ingest body: {}", rejection.body_text());
        AppError::MalformedBody(rejection)
    })?;

    let metrics = validate(&request.device_id, &request.metrics).map_err(|e| {
        INGEST_REJECTED_TOTAL.inc();
        warn!("Rejected ingest for {:?}: {}", request.device_id, e);
        AppError::Validation(e)
    })?;

    let resolved = resolve_timestamps(request.timestamp, state.clock.as_ref());
    state
        .store
        .upsert(
            &request.device_id,
            &resolved.timestamp,
            &metrics,
            &resolved.received_at,
        )
        .await?;

    INGEST_ACCEPTED_TOTAL.inc();
    debug!(
        "Stored reading for {} with {} metrics",
        request.device_id,
        metrics.len()
    );

    Ok(Json(IngestResponse::ok(
        request.device_id,
        resolved.received_at,
    )))
}

async fn get_latest(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Reading>, AppError> {
    state
        .store
        .fetch_one(&device_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

async fn get_devices(State(state): State<AppState>) -> Result<Json<Vec<Reading>>, AppError> {
    Ok(Json(state.store.fetch_all().await?))
}

/// The device gauge is read from the store here rather than on every write.
async fn get_metrics(State(state): State<AppState>) -> String {
    if let Ok(count) = state.store.count().await {
        DEVICES.set(count as f64);
    }
    gather_metrics()
}

pub enum AppError {
    Validation(ValidationError),
    MalformedBody(JsonRejection),
    NotFound,
    Store(Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(e) => unprocessable(e.field.loc(), &e.message, e.rule.kind()),
            AppError::MalformedBody(rejection) => {
                unprocessable(vec!["body".to_string()], &rejection.body_text(), "json_invalid")
            }
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": "device_id not found" })),
            )
                .into_response(),
            AppError::Store(e) => {
                error!("API error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

fn unprocessable(loc: Vec<String>, msg: &str, kind: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "detail": [{ "loc": loc, "msg": msg, "type": kind }]
        })),
    )
        .into_response()
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Store(err)
    }
}
