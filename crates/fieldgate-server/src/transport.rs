//! Publish-subscribe transport seam.
//!
//! The gateway core needs only two things from the broker: inbound messages
//! delivered into the ingestion channel, and `publish(topic, payload)` for
//! alerts sent back to devices. The broker wire client lives outside this
//! crate; [`BroadcastPublisher`] fans published messages out to whatever is
//! attached (the HTTP bridge's SSE stream, tests).

use axum::body::Bytes;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// A raw message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// A message handed to the transport for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Errors returned by [`Publisher::publish`].
#[derive(Debug, Error)]
pub enum PublishError {
    /// Nothing is attached to carry the message; it was dropped.
    #[error("no transport subscriber attached for topic {0}")]
    NoSubscribers(String),
}

/// Outbound half of the transport contract.
pub trait Publisher: Send + Sync {
    /// Hands `payload` to the transport for delivery on `topic`.
    ///
    /// Delivery is fire-and-forget; success means the message was accepted,
    /// not that a device received it.
    fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError>;
}

/// In-process publisher backed by a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<OutboundMessage>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Attaches a new receiver that sees every message published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.tx.subscribe()
    }
}

impl Publisher for BroadcastPublisher {
    fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        self.tx
            .send(OutboundMessage {
                topic: topic.to_string(),
                payload,
            })
            .map(|_| ())
            .map_err(|_| PublishError::NoSubscribers(topic.to_string()))
    }
}

/// Creates the bounded inbound channel feeding the ingestion pipeline.
pub fn inbound_channel(
    capacity: usize,
) -> (mpsc::Sender<InboundMessage>, mpsc::Receiver<InboundMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Returns the per-client alert topic under `base`.
pub fn client_topic(base: &str, client_id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), client_id)
}
