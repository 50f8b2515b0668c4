use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use crate::errors::StepError;
use crate::models::{NewStep, StepRecord, StepUpdate};

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn step_error_response(err: &StepError) -> Response {
    let (status, code) = match err {
        StepError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
        StepError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
        StepError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StepError::UnknownResult { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "unknown_result"),
        StepError::StorageUnavailable(_) => {
            tracing::error!("Storage failure: {}", err);
            (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
        }
    };
    if status != StatusCode::SERVICE_UNAVAILABLE {
        tracing::warn!("Request rejected: {}", err);
    }
    error_response(status, code, &err.to_string())
}

// ---------------------------------------------------------------------------
// Single-vs-batch body handling
// ---------------------------------------------------------------------------

/// Parse a body that is either one record or an ordered list of records.
/// Returns the records plus whether the caller sent a single object, so the
/// response can mirror the request shape.
fn parse_batch<T: DeserializeOwned>(body: Value) -> Result<(Vec<T>, bool), Response> {
    match body {
        Value::Array(items) => {
            let records = items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<Vec<T>, _>>()
                .map_err(|e| {
                    error_response(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "validation_error",
                        &format!("Malformed step record: {}", e),
                    )
                })?;
            Ok((records, false))
        }
        body @ Value::Object(_) => {
            let record = serde_json::from_value(body).map_err(|e| {
                error_response(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "validation_error",
                    &format!("Malformed step record: {}", e),
                )
            })?;
            Ok((vec![record], true))
        }
        _ => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "Request body must be a JSON object or array",
        )),
    }
}

fn batch_response(records: Vec<StepRecord>, single: bool) -> Response {
    if single {
        match records.into_iter().next() {
            Some(record) => (StatusCode::OK, Json(record)).into_response(),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    } else {
        (StatusCode::OK, Json(records)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /jobs/{job_id}/steps
pub async fn create_steps(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let (steps, single) = match parse_batch::<NewStep>(body) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    match state.service.create(&job_id, steps).await {
        Ok(records) => batch_response(records, single),
        Err(e) => step_error_response(&e),
    }
}

/// GET /jobs/{job_id}/steps/{uuid}
pub async fn get_step(
    State(state): State<Arc<AppState>>,
    Path((job_id, uuid)): Path<(String, Uuid)>,
) -> Response {
    match state.service.fetch(&job_id, uuid).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => step_error_response(&e),
    }
}

/// PUT /jobs/{job_id}/steps
pub async fn update_steps(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    update_batch(&state, &job_id, body).await
}

/// PUT /jobs/{job_id}/steps/{uuid}
///
/// Single-record variant; the route UUID fills in when the body omits it.
pub async fn update_step(
    State(state): State<Arc<AppState>>,
    Path((job_id, uuid)): Path<(String, Uuid)>,
    Json(mut body): Json<Value>,
) -> Response {
    if let Value::Object(ref mut fields) = body {
        fields
            .entry("uuid".to_string())
            .or_insert_with(|| Value::String(uuid.to_string()));
    }
    update_batch(&state, &job_id, body).await
}

async fn update_batch(state: &AppState, job_id: &str, body: Value) -> Response {
    let (updates, single) = match parse_batch::<StepUpdate>(body) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    match state.service.update(job_id, updates).await {
        Ok(records) => batch_response(records, single),
        Err(e) => step_error_response(&e),
    }
}

/// DELETE /jobs/{job_id}/steps
pub async fn delete_steps(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    match state.service.clear(&job_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => step_error_response(&e),
    }
}

/// GET /jobs/{job_id}/result
pub async fn job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    match state.service.aggregate_result(&job_id).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({ "result": outcome })),
        )
            .into_response(),
        Err(e) => step_error_response(&e),
    }
}
