//! API handlers for the gateway's read and operator endpoints.

use crate::alerts::ALERT_TIMESTAMP_FORMAT;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fieldgate_db::{list_rules, recent_events};
use fieldgate_types::{Alert, ClientRecord, DeviceId, Rule};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Number of events returned when no limit is given.
pub const DEFAULT_EVENT_LIMIT: i64 = 10;

/// Upper bound on a single events page.
pub const MAX_EVENT_LIMIT: i64 = 1000;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Handler for `GET /api/devices`.
pub async fn list_devices_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<Vec<ClientRecord>> {
    Json(state.clients.snapshot())
}

/// Handler for `GET /api/devices/{deviceId}`.
///
/// The id must be a MAC address; anything else is rejected with 400.
pub async fn get_device_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<ClientRecord>, ApiError> {
    let device_id = DeviceId::parse(&raw_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state
        .clients
        .get(device_id.as_str())
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("device {device_id} is not registered")))
}

/// Handler for `GET /api/alerts`.
pub async fn list_alerts_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Vec<Alert>> {
    Json(state.alerts.list())
}

/// Handler for `DELETE /api/alerts/{alertId}`.
pub async fn dismiss_alert_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(alert_id): Path<u64>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state
        .alerts
        .dismiss(alert_id)
        .ok_or_else(|| ApiError::NotFound(format!("alert {alert_id} not found")))?;
    tracing::info!(alert_id, client_id = %alert.client_id, "alert dismissed");
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
pub struct DismissAtQuery {
    pub index: usize,
}

/// Handler for `POST /api/alerts/dismiss?index=N`.
///
/// Removes whatever alert currently sits at position `index`. An index past
/// the end of the log is a bad request.
pub async fn dismiss_alert_at_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<DismissAtQuery>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state.alerts.dismiss_at(query.index).ok_or_else(|| {
        ApiError::BadRequest(format!("invalid index parameter: {}", query.index))
    })?;
    tracing::info!(alert_id = alert.id, index = query.index, "alert dismissed by position");
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<i64>,
}

/// One stored event as returned by `GET /api/events`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventView {
    pub id: i64,
    pub client_id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    /// Client timestamp rendered as `YYYY-MM-DD HH:MM:SS` (UTC).
    pub local_timestamp: String,
    pub event: String,
    pub data: Value,
}

/// Renders a Unix timestamp the way the dashboard expects.
pub fn format_local_timestamp(seconds: i64) -> String {
    chrono::DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.format(ALERT_TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| seconds.to_string())
}

/// Handler for `GET /api/events`.
///
/// Returns the most recent events, newest first.
pub async fn list_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .clamp(1, MAX_EVENT_LIMIT);

    let pool = state.pool.clone();
    let events = tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        recent_events(&conn, limit)
            .map_err(|e| ApiError::InternalServerError(format!("failed to load events: {}", e)))
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    Ok(Json(
        events
            .into_iter()
            .map(|event| EventView {
                id: event.id,
                client_id: event.client_id,
                device_type: event.device_type,
                local_timestamp: format_local_timestamp(event.local_timestamp),
                event: event.event,
                data: event.data,
            })
            .collect(),
    ))
}

/// Handler for `GET /api/rules`.
pub async fn list_rules_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Rule>>, ApiError> {
    let pool = state.pool.clone();
    let rules = tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        list_rules(&conn)
            .map_err(|e| ApiError::InternalServerError(format!("failed to load rules: {}", e)))
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    Ok(Json(rules))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_timestamp_renders_utc() {
        assert_eq!(format_local_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_local_timestamp(1_700_000_000), "2023-11-14 22:13:20");
    }

    #[test]
    fn out_of_range_timestamp_falls_back_to_raw() {
        assert_eq!(format_local_timestamp(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn api_errors_map_to_status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                ApiError::ServiceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::InternalServerError("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
