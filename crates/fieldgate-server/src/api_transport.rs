//! HTTP bridge for an external broker client.
//!
//! A broker client running out of process forwards every subscribed message
//! to `POST /api/transport/inbound` and relays whatever appears on
//! `GET /api/transport/outbound` back to the broker.

use crate::api::ApiError;
use crate::transport::InboundMessage;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::StatusCode,
    response::{sse::Event, Sse},
};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

#[derive(Debug, Deserialize)]
pub struct InboundQuery {
    /// Topic the message arrived on; defaults to the subscribed topic.
    pub topic: Option<String>,
}

/// An outbound message as delivered on the SSE stream.
#[derive(Debug, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub topic: String,
    pub payload: String,
}

/// Handler for `POST /api/transport/inbound`.
///
/// The raw request body is the message payload. Decoding happens later in
/// the pipeline, so any body is accepted here.
pub async fn inbound_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<InboundQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let topic = query
        .topic
        .unwrap_or_else(|| state.subscribe_topic.clone());

    state
        .inbound_tx
        .send(InboundMessage::new(topic, body))
        .await
        .map_err(|_| {
            ApiError::ServiceUnavailable("ingestion pipeline is not running".to_string())
        })?;

    Ok(StatusCode::ACCEPTED)
}

/// Handler for `GET /api/transport/outbound`.
///
/// Streams every message published after the client connects.
pub async fn outbound_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.outbound.subscribe();
    let stream = BroadcastStream::new(rx);

    let mapped_stream = stream.filter_map(|result| match result {
        Ok(msg) => {
            let frame = OutboundFrame {
                topic: msg.topic,
                payload: String::from_utf8_lossy(&msg.payload).into_owned(),
            };
            match serde_json::to_string(&frame) {
                Ok(data) => Some(Ok(Event::default().data(data))),
                Err(e) => {
                    tracing::error!("failed to serialize outbound message: {}", e);
                    None
                }
            }
        }
        Err(broadcast_error) => {
            tracing::warn!(
                error = %broadcast_error,
                "outbound SSE stream lagged; messages were dropped for this subscriber"
            );
            None
        }
    });

    Sse::new(mapped_stream).keep_alive(axum::response::sse::KeepAlive::default())
}
