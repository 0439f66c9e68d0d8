//! End-to-end tests for the ingestion pipeline.
//!
//! These tests verify:
//! - A telemetry reading inside a rule's range raises one alert and
//!   publishes the species alert on the client's sub-topic
//! - Readings outside the range fire nothing
//! - Readings are persisted even when no rule fires
//! - A broken event store does not stop rule evaluation
//! - Registration creates and overwrites client records
//! - Malformed and unknown messages are dropped without stopping the pipeline
//! - The pipeline drains every message even when only one may run at a time

use fieldgate_db::{
    create_pool, insert_rule, recent_events, run_migrations, DbPool, DbRuntimeSettings, NewRule,
};
use fieldgate_server::config::Config;
use fieldgate_server::ingest::{run_pipeline, IngestOutcome};
use fieldgate_server::transport::InboundMessage;
use fieldgate_server::Gateway;
use fieldgate_types::{OutboundAlert, RULE_TRIGGER_CATEGORY};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;

const CLIENT: &str = "AA:BB:CC:DD:EE:FF";
const TOPIC: &str = "uol/uol-cm3070-mod11";

fn setup_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gateway.db");
    let pool = create_pool(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("pool creation should succeed");
    {
        let conn = pool.get().expect("connection should succeed");
        run_migrations(&conn).expect("migrations should succeed");
        insert_rule(
            &conn,
            &NewRule {
                client_id: "*".to_string(),
                parameter_name: "temperature".to_string(),
                min_range: 0.0,
                max_range: 50.0,
                trigger: "inside_range".to_string(),
                callback: "fox_callback".to_string(),
            },
        )
        .expect("insert rule");
    }
    (dir, pool)
}

fn message(value: Value) -> InboundMessage {
    InboundMessage::new(TOPIC, serde_json::to_vec(&value).expect("encode"))
}

fn telemetry(temperature: f64) -> InboundMessage {
    message(json!({
        "event": "telemetry",
        "client_id": CLIENT,
        "device_type": "camera",
        "local_timestamp": 1_700_000_000,
        "data": {"temperature": temperature}
    }))
}

fn registration(address: &str, device_type: &str) -> InboundMessage {
    message(json!({
        "event": "registration",
        "client_id": CLIENT,
        "device_type": device_type,
        "local_timestamp": 1_700_000_000,
        "data": {"ip": address}
    }))
}

#[tokio::test]
async fn reading_inside_range_raises_alert_and_publishes() {
    let (_dir, pool) = setup_pool();
    let gateway = Gateway::new(pool.clone(), &Config::default());
    let mut outbound = gateway.state.outbound.subscribe();

    let outcome = gateway.ingestor.handle(telemetry(25.0)).await;
    assert!(matches!(
        outcome,
        IngestOutcome::Processed {
            event_id: Some(_),
            fired: Some(1)
        }
    ));

    let alerts = gateway.state.alerts.list();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].category, RULE_TRIGGER_CATEGORY);
    assert_eq!(alerts[0].client_id, CLIENT);
    assert!(alerts[0].message.starts_with("temperature detected"));

    let published = tokio::time::timeout(Duration::from_secs(2), outbound.recv())
        .await
        .expect("publish within timeout")
        .expect("published message");
    assert_eq!(published.topic, format!("uol/uol-cm3070-mod11/sub/{CLIENT}"));
    let alert: OutboundAlert = serde_json::from_slice(&published.payload).expect("alert json");
    assert_eq!(alert.event, "fox_alert");
    assert_eq!(alert.client_id, CLIENT);
}

#[tokio::test]
async fn reading_outside_range_is_stored_but_fires_nothing() {
    let (_dir, pool) = setup_pool();
    let gateway = Gateway::new(pool.clone(), &Config::default());
    let mut outbound = gateway.state.outbound.subscribe();

    let outcome = gateway.ingestor.handle(telemetry(99.0)).await;
    assert!(matches!(
        outcome,
        IngestOutcome::Processed {
            event_id: Some(_),
            fired: Some(0)
        }
    ));
    assert!(gateway.state.alerts.is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(outbound.try_recv(), Err(TryRecvError::Empty)));

    let conn = pool.get().expect("connection");
    let events = recent_events(&conn, 10).expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].client_id, CLIENT);
    assert_eq!(events[0].event, "telemetry");
    assert_eq!(events[0].data, json!({"temperature": 99.0}));
}

#[tokio::test]
async fn store_failure_does_not_block_rule_evaluation() {
    let (_dir, pool) = setup_pool();
    pool.get()
        .expect("connection")
        .execute_batch("DROP TABLE events")
        .expect("drop events table");
    let gateway = Gateway::new(pool, &Config::default());

    let outcome = gateway.ingestor.handle(telemetry(25.0)).await;
    assert_eq!(
        outcome,
        IngestOutcome::Processed {
            event_id: None,
            fired: Some(1)
        }
    );
    assert_eq!(gateway.state.alerts.len(), 1);
}

#[tokio::test]
async fn registration_overwrites_previous_record() {
    let (_dir, pool) = setup_pool();
    let gateway = Gateway::new(pool, &Config::default());

    let first = gateway
        .ingestor
        .handle(registration("192.168.1.40", "camera"))
        .await;
    assert_eq!(
        first,
        IngestOutcome::Registered {
            client_id: CLIENT.to_string(),
            replaced: false
        }
    );

    let second = gateway
        .ingestor
        .handle(registration("192.168.1.41", "microphone"))
        .await;
    assert_eq!(
        second,
        IngestOutcome::Registered {
            client_id: CLIENT.to_string(),
            replaced: true
        }
    );

    let record = gateway.state.clients.get(CLIENT).expect("registered");
    assert_eq!(record.address, "192.168.1.41");
    assert_eq!(record.device_type, "microphone");
    assert_eq!(gateway.state.clients.len(), 1);
}

#[tokio::test]
async fn bad_messages_are_dropped() {
    let (_dir, pool) = setup_pool();
    let gateway = Gateway::new(pool.clone(), &Config::default());

    let malformed = InboundMessage::new(TOPIC, &b"{not json"[..]);
    assert_eq!(gateway.ingestor.handle(malformed).await, IngestOutcome::Dropped);

    let unknown = message(json!({"event": "heartbeat", "client_id": CLIENT}));
    assert_eq!(gateway.ingestor.handle(unknown).await, IngestOutcome::Dropped);

    let conn = pool.get().expect("connection");
    assert!(recent_events(&conn, 10).expect("events").is_empty());
}

#[tokio::test]
async fn pipeline_processes_channel_messages_concurrently() {
    let (_dir, pool) = setup_pool();
    let gateway = Gateway::new(pool.clone(), &Config::default());
    let inbound_tx = gateway.state.inbound_tx.clone();
    let clients = gateway.state.clients.clone();
    let alerts = gateway.state.alerts.clone();
    let mut outbound = gateway.state.outbound.subscribe();

    let pipeline = tokio::spawn(run_pipeline(
        gateway.inbound_rx,
        gateway.ingestor,
        gateway.max_in_flight,
    ));

    inbound_tx
        .send(registration("192.168.1.40", "camera"))
        .await
        .expect("send registration");
    inbound_tx
        .send(InboundMessage::new(TOPIC, &b"garbage"[..]))
        .await
        .expect("send garbage");
    for _ in 0..5 {
        inbound_tx.send(telemetry(10.0)).await.expect("send telemetry");
    }

    for _ in 0..5 {
        let published = tokio::time::timeout(Duration::from_secs(2), outbound.recv())
            .await
            .expect("publish within timeout")
            .expect("published message");
        assert!(published.topic.ends_with(CLIENT));
    }

    assert_eq!(alerts.len(), 5);

    let mut registered = false;
    for _ in 0..50 {
        if clients.get(CLIENT).is_some() {
            registered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(registered, "registration should be applied");

    // Dropping every sender ends the pipeline.
    drop(inbound_tx);
    drop(gateway.state);
    tokio::time::timeout(Duration::from_secs(2), pipeline)
        .await
        .expect("pipeline stops once senders are gone")
        .expect("pipeline task");

    let conn = pool.get().expect("connection");
    assert_eq!(recent_events(&conn, 100).expect("events").len(), 5);
}

#[tokio::test]
async fn single_slot_pipeline_still_drains_every_message() {
    let (_dir, pool) = setup_pool();
    let gateway = Gateway::new(pool.clone(), &Config::default());
    let inbound_tx = gateway.state.inbound_tx.clone();
    let alerts = gateway.state.alerts.clone();

    let pipeline = tokio::spawn(run_pipeline(gateway.inbound_rx, gateway.ingestor, 1));

    for temperature in [5.0, 15.0, 25.0, 99.0] {
        inbound_tx
            .send(telemetry(temperature))
            .await
            .expect("send telemetry");
    }
    drop(inbound_tx);
    drop(gateway.state);
    tokio::time::timeout(Duration::from_secs(5), pipeline)
        .await
        .expect("pipeline stops once senders are gone")
        .expect("pipeline task");

    // The last message may still be in its task when the pipeline returns.
    let mut stored = 0;
    for _ in 0..100 {
        stored = recent_events(&pool.get().expect("connection"), 10)
            .expect("events")
            .len();
        if stored == 4 && alerts.len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stored, 4);
    assert_eq!(alerts.len(), 3);
}
