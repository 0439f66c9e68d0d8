//! Event ingestion: decode inbound transport messages and route them.
//!
//! `telemetry` and `intrusion` events are persisted and then evaluated
//! against the rules; `registration` events update the client registry.
//! Nothing that arrives on the transport can stop the pipeline: malformed
//! or unknown messages are logged and dropped.

use fieldgate_db::{insert_event, DbPool, StoreError};
use fieldgate_types::{ClientRecord, EventKind, TelemetryEvent};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

use crate::engine::RuleEngine;
use crate::registry::ClientRegistry;
use crate::transport::InboundMessage;

/// Reasons an inbound payload could not be turned into an [`InboundEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("missing or non-string `event` field")]
    MissingEvent,
    #[error("unknown event kind: {0}")]
    UnknownEvent(String),
    #[error("invalid {kind} event: {source}")]
    Schema {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} event has an empty client_id")]
    EmptyClientId(EventKind),
}

/// A decoded, validated inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A `telemetry` or `intrusion` reading.
    Reading(TelemetryEvent),
    Registration(ClientRecord),
}

#[derive(Debug, Deserialize)]
struct ReadingEnvelope {
    client_id: String,
    device_type: String,
    local_timestamp: f64,
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RegistrationEnvelope {
    client_id: String,
    device_type: String,
    data: RegistrationData,
}

#[derive(Debug, Deserialize)]
struct RegistrationData {
    ip: String,
}

/// Decodes a raw transport payload.
pub fn decode(payload: &[u8]) -> Result<InboundEvent, DecodeError> {
    let value: Value = serde_json::from_slice(payload).map_err(DecodeError::Malformed)?;
    let Value::Object(fields) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let kind = match fields.get("event").and_then(Value::as_str) {
        Some("telemetry") => EventKind::Telemetry,
        Some("intrusion") => EventKind::Intrusion,
        Some("registration") => EventKind::Registration,
        Some(other) => return Err(DecodeError::UnknownEvent(other.to_string())),
        None => return Err(DecodeError::MissingEvent),
    };

    let schema = |source| DecodeError::Schema { kind, source };
    let non_empty = |client_id: String| {
        if client_id.trim().is_empty() {
            Err(DecodeError::EmptyClientId(kind))
        } else {
            Ok(client_id)
        }
    };

    match kind {
        EventKind::Telemetry | EventKind::Intrusion => {
            let envelope: ReadingEnvelope =
                serde_json::from_value(Value::Object(fields)).map_err(schema)?;
            Ok(InboundEvent::Reading(TelemetryEvent {
                client_id: non_empty(envelope.client_id)?,
                device_type: envelope.device_type,
                local_timestamp: envelope.local_timestamp as i64,
                kind,
                data: envelope.data.unwrap_or_default(),
            }))
        }
        EventKind::Registration => {
            let envelope: RegistrationEnvelope =
                serde_json::from_value(Value::Object(fields)).map_err(schema)?;
            Ok(InboundEvent::Registration(ClientRecord {
                id: non_empty(envelope.client_id)?,
                address: envelope.data.ip,
                device_type: envelope.device_type,
            }))
        }
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The message was discarded; the reason has been logged.
    Dropped,
    Registered { client_id: String, replaced: bool },
    Processed {
        /// Row id of the stored event, if persistence succeeded.
        event_id: Option<i64>,
        /// Number of rules that fired, if evaluation ran.
        fired: Option<usize>,
    },
}

/// Routes decoded events to the store, the rule engine and the registry.
#[derive(Clone)]
pub struct Ingestor {
    pool: DbPool,
    clients: ClientRegistry,
    engine: RuleEngine,
}

impl Ingestor {
    pub fn new(pool: DbPool, clients: ClientRegistry, engine: RuleEngine) -> Self {
        Self {
            pool,
            clients,
            engine,
        }
    }

    /// Handles one inbound message end to end.
    pub async fn handle(&self, msg: InboundMessage) -> IngestOutcome {
        tracing::debug!(topic = %msg.topic, bytes = msg.payload.len(), "inbound message");

        match decode(&msg.payload) {
            Ok(InboundEvent::Reading(event)) => self.handle_reading(event).await,
            Ok(InboundEvent::Registration(record)) => {
                tracing::info!(
                    client_id = %record.id,
                    address = %record.address,
                    device_type = %record.device_type,
                    "registered client"
                );
                let client_id = record.id.clone();
                let replaced = self.clients.upsert(record).is_some();
                IngestOutcome::Registered {
                    client_id,
                    replaced,
                }
            }
            Err(DecodeError::UnknownEvent(kind)) => {
                tracing::warn!(topic = %msg.topic, event = %kind, "unknown event type, dropping");
                IngestOutcome::Dropped
            }
            Err(e) => {
                tracing::warn!(
                    topic = %msg.topic,
                    error = %e,
                    "failed to decode message, dropping"
                );
                IngestOutcome::Dropped
            }
        }
    }

    async fn handle_reading(&self, event: TelemetryEvent) -> IngestOutcome {
        if self.clients.get(&event.client_id).is_none() {
            tracing::debug!(client_id = %event.client_id, "reading from unregistered client");
        }

        // Persistence and evaluation fail independently.
        let event_id = match self.persist(event.clone()).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(client_id = %event.client_id, error = %e, "failed to save event");
                None
            }
        };

        let fired = match self.engine.evaluate(&event.client_id, &event.data).await {
            Ok(firings) => Some(firings.len()),
            Err(e) => {
                tracing::warn!(client_id = %event.client_id, error = %e, "rule evaluation failed");
                None
            }
        };

        IngestOutcome::Processed { event_id, fired }
    }

    async fn persist(&self, event: TelemetryEvent) -> Result<i64, PersistError> {
        let pool = self.pool.clone();
        let id = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            insert_event(&conn, &event)
        })
        .await??;
        Ok(id)
    }
}

#[derive(Debug, Error)]
enum PersistError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("persistence task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Drains the inbound channel, handling each message on its own task.
///
/// At most `max_in_flight` messages are handled at once; while the limit is
/// reached the pipeline stops reading, so backpressure reaches the bounded
/// inbound channel. Returns once every sender has been dropped.
pub async fn run_pipeline(
    mut rx: mpsc::Receiver<InboundMessage>,
    ingestor: Ingestor,
    max_in_flight: usize,
) {
    let limit = Arc::new(Semaphore::new(max_in_flight.max(1)));
    tracing::info!(max_in_flight, "ingestion pipeline started");
    while let Some(msg) = rx.recv().await {
        let Ok(permit) = limit.clone().acquire_owned().await else {
            break;
        };
        let ingestor = ingestor.clone();
        tokio::spawn(async move {
            ingestor.handle(msg).await;
            drop(permit);
        });
    }
    tracing::info!("inbound channel closed, ingestion pipeline stopped");
}
