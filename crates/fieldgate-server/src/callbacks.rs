//! Callback registry and dispatch.
//!
//! Rules name the callback to run when they fire. Every callback shares one
//! signature, `(client_id)`, so the registry maps names to a closed set of
//! [`Callback`] kinds instead of arbitrary functions. The registry is built
//! once at startup and never mutated afterwards.

use fieldgate_types::OutboundAlert;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::classifier::{species_callback, ClassifierClient, ClassifierError};
use crate::registry::ClientRegistry;
use crate::transport::{client_topic, PublishError, Publisher};

/// Name of the built-in callback that consults the external classifier.
pub const CLASSIFY_CALLBACK: &str = "yolo_post_classification";

/// Species whose built-in callbacks publish `<species>_alert`.
pub const SPECIES: [&str; 5] = ["fox", "bear", "wolf", "deer", "crocodile"];

/// What a named callback does when dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    /// Publishes `<alert>_alert` to the originating client's sub-topic.
    PublishAlert { alert: String },
    /// Sends the client's address to the classifier and dispatches the
    /// species callback matching the returned label.
    Classify,
}

/// Errors returned by [`Dispatcher::dispatch`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown callback: {0}")]
    UnknownCallback(String),
    #[error("client {0} is not registered")]
    UnknownClient(String),
    #[error("failed to encode outbound alert: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Immutable name to callback table.
#[derive(Debug, Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Callback>,
}

impl CallbackRegistry {
    pub fn new(entries: impl IntoIterator<Item = (String, Callback)>) -> Self {
        Self {
            callbacks: entries.into_iter().collect(),
        }
    }

    /// The species alert callbacks plus the classifier bridge.
    pub fn with_builtins() -> Self {
        let species = SPECIES.iter().map(|name| {
            (
                format!("{name}_callback"),
                Callback::PublishAlert {
                    alert: name.to_string(),
                },
            )
        });
        Self::new(species.chain([(CLASSIFY_CALLBACK.to_string(), Callback::Classify)]))
    }

    pub fn get(&self, name: &str) -> Option<&Callback> {
        self.callbacks.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.callbacks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Executes named callbacks against the transport and classifier.
#[derive(Clone)]
pub struct Dispatcher {
    callbacks: Arc<CallbackRegistry>,
    publisher: Arc<dyn Publisher>,
    clients: ClientRegistry,
    classifier: ClassifierClient,
    alert_topic_base: Arc<str>,
}

impl Dispatcher {
    pub fn new(
        callbacks: CallbackRegistry,
        publisher: Arc<dyn Publisher>,
        clients: ClientRegistry,
        classifier: ClassifierClient,
        alert_topic_base: &str,
    ) -> Self {
        Self {
            callbacks: Arc::new(callbacks),
            publisher,
            clients,
            classifier,
            alert_topic_base: Arc::from(alert_topic_base),
        }
    }

    /// Runs the callback registered as `name` for `client_id`.
    ///
    /// An unknown name fails before anything is published or called.
    pub fn dispatch<'a>(
        &'a self,
        name: &'a str,
        client_id: &'a str,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            let callback = self
                .callbacks
                .get(name)
                .ok_or_else(|| DispatchError::UnknownCallback(name.to_string()))?;

            match callback {
                Callback::PublishAlert { alert } => self.publish_alert(alert, client_id),
                Callback::Classify => {
                    let record = self
                        .clients
                        .get(client_id)
                        .ok_or_else(|| DispatchError::UnknownClient(client_id.to_string()))?;

                    tracing::info!(
                        client_id,
                        address = %record.address,
                        "requesting classification"
                    );
                    let classification = self.classifier.classify(&record.address).await?;
                    tracing::info!(
                        client_id,
                        label = %classification.top_label,
                        confidence = classification.confidence,
                        "classifier responded"
                    );

                    match species_callback(&classification.top_label) {
                        Some(species) => self.dispatch(species, client_id).await,
                        None => {
                            tracing::warn!(
                                client_id,
                                label = %classification.top_label,
                                "unrecognized classifier label, dropping"
                            );
                            Ok(())
                        }
                    }
                }
            }
        })
    }

    /// Dispatches `name` on a background task; failures are logged.
    pub fn spawn(&self, name: String, client_id: String) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(&name, &client_id).await {
                tracing::warn!(
                    callback = %name,
                    client_id = %client_id,
                    error = %e,
                    "callback dispatch failed"
                );
            }
        })
    }

    fn publish_alert(&self, alert: &str, client_id: &str) -> Result<(), DispatchError> {
        let payload = serde_json::to_vec(&OutboundAlert::new(alert, client_id))?;
        let topic = client_topic(&self.alert_topic_base, client_id);
        tracing::info!(client_id, alert, topic = %topic, "publishing alert");
        self.publisher.publish(&topic, payload.into())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BroadcastPublisher;
    use fieldgate_types::ClientRecord;
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    fn dispatcher(publisher: &BroadcastPublisher, clients: ClientRegistry) -> Dispatcher {
        Dispatcher::new(
            CallbackRegistry::with_builtins(),
            Arc::new(publisher.clone()),
            clients,
            // Nothing listens here; classifier calls fail fast.
            ClassifierClient::new("http://127.0.0.1:9", Duration::from_millis(500)),
            "uol/uol-cm3070-mod11/sub",
        )
    }

    #[test]
    fn builtins_cover_species_and_classifier() {
        let registry = CallbackRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec![
                "bear_callback",
                "crocodile_callback",
                "deer_callback",
                "fox_callback",
                "wolf_callback",
                "yolo_post_classification",
            ]
        );
        assert_eq!(registry.get(CLASSIFY_CALLBACK), Some(&Callback::Classify));
        assert_eq!(
            registry.get("wolf_callback"),
            Some(&Callback::PublishAlert {
                alert: "wolf".to_string()
            })
        );
    }

    #[tokio::test]
    async fn species_callback_publishes_to_client_topic() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        let dispatcher = dispatcher(&publisher, ClientRegistry::new());

        dispatcher
            .dispatch("fox_callback", "AA:BB:CC:DD:EE:FF")
            .await
            .expect("dispatch should succeed");

        let msg = rx.recv().await.expect("published message");
        assert_eq!(msg.topic, "uol/uol-cm3070-mod11/sub/AA:BB:CC:DD:EE:FF");
        let alert: OutboundAlert = serde_json::from_slice(&msg.payload).expect("valid json");
        assert_eq!(alert, OutboundAlert::new("fox", "AA:BB:CC:DD:EE:FF"));
    }

    #[tokio::test]
    async fn unknown_callback_has_no_side_effects() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        let dispatcher = dispatcher(&publisher, ClientRegistry::new());

        let err = dispatcher
            .dispatch("owl_callback", "AA:BB:CC:DD:EE:FF")
            .await
            .expect_err("unknown callback must fail");
        assert!(matches!(err, DispatchError::UnknownCallback(name) if name == "owl_callback"));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn classify_requires_registered_client() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        let dispatcher = dispatcher(&publisher, ClientRegistry::new());

        let err = dispatcher
            .dispatch(CLASSIFY_CALLBACK, "AA:BB:CC:DD:EE:FF")
            .await
            .expect_err("unregistered client has no address");
        assert!(matches!(err, DispatchError::UnknownClient(_)));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn classifier_failure_is_reported() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        let clients = ClientRegistry::new();
        clients.upsert(ClientRecord {
            id: "AA:BB:CC:DD:EE:FF".to_string(),
            address: "10.0.0.5".to_string(),
            device_type: "camera".to_string(),
        });
        let dispatcher = dispatcher(&publisher, clients);

        let err = dispatcher
            .dispatch(CLASSIFY_CALLBACK, "AA:BB:CC:DD:EE:FF")
            .await
            .expect_err("classifier is unreachable");
        assert!(matches!(err, DispatchError::Classifier(_)));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn publish_without_transport_is_an_error() {
        let publisher = BroadcastPublisher::new(8);
        let dispatcher = dispatcher(&publisher, ClientRegistry::new());
        let err = dispatcher
            .dispatch("deer_callback", "AA:BB:CC:DD:EE:FF")
            .await
            .expect_err("no subscriber attached");
        assert!(matches!(err, DispatchError::Publish(_)));
    }
}
