//! Device settings passthrough.
//!
//! The gateway does not store device settings. Reads and updates are
//! forwarded to the device itself and its response body is streamed back
//! to the caller unchanged.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Extension, Json, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use fieldgate_types::{ClientRecord, DeviceId, DeviceSettings};
use std::sync::Arc;

/// Device endpoint serving its current settings.
pub fn get_settings_url(address: &str) -> String {
    format!("http://{address}/get-settings")
}

/// Device endpoint accepting a `settings` form field.
pub fn update_settings_url(address: &str) -> String {
    format!("http://{address}/update-settings")
}

fn registered_device(state: &AppState, raw_id: &str) -> Result<(DeviceId, ClientRecord), ApiError> {
    let device_id = DeviceId::parse(raw_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let record = state
        .clients
        .get(device_id.as_str())
        .ok_or_else(|| ApiError::NotFound(format!("device {device_id} is not registered")))?;
    Ok((device_id, record))
}

fn passthrough(resp: reqwest::Response) -> Response {
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(resp.bytes_stream()),
    )
        .into_response()
}

/// Handler for `GET /api/devices/{deviceId}/settings`.
pub async fn get_settings_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let (device_id, record) = registered_device(&state, &raw_id)?;

    let resp = state
        .device_http
        .get(get_settings_url(&record.address))
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(
                device_id = %device_id,
                address = %record.address,
                error = %e,
                "failed to fetch device settings"
            );
            ApiError::ServiceUnavailable("error fetching settings from device".to_string())
        })?;

    Ok(passthrough(resp))
}

/// Handler for `POST /api/devices/{deviceId}/settings`.
///
/// The body's `device_id` is always replaced by the id in the path.
pub async fn update_settings_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(raw_id): Path<String>,
    Json(mut settings): Json<DeviceSettings>,
) -> Result<Response, ApiError> {
    let (device_id, record) = registered_device(&state, &raw_id)?;
    settings.device_id = device_id.to_string();

    let payload = serde_json::to_string(&settings).map_err(|e| {
        ApiError::InternalServerError(format!("failed to encode settings: {}", e))
    })?;

    tracing::info!(device_id = %device_id, address = %record.address, "pushing settings to device");

    let resp = state
        .device_http
        .post(update_settings_url(&record.address))
        .form(&[("settings", payload.as_str())])
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(
                device_id = %device_id,
                address = %record.address,
                error = %e,
                "failed to update device settings"
            );
            ApiError::ServiceUnavailable("error updating device settings".to_string())
        })?;

    Ok(passthrough(resp))
}
