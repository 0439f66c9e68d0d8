//! Liveness monitor.
//!
//! Periodically probes every registered client's `/healthz` endpoint and
//! evicts the ones that do not answer `200 OK`. Probes run concurrently, so
//! one slow device never delays the others beyond the probe timeout.

use fieldgate_types::ClientRecord;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::sleep;

use crate::registry::ClientRegistry;

/// Result of probing one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Healthy,
    Unhealthy(String),
}

/// Issues health probes against device addresses.
#[derive(Debug, Clone)]
pub struct HealthProber {
    http: reqwest::Client,
}

impl HealthProber {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    pub async fn probe(&self, address: &str) -> ProbeResult {
        match self.http.get(health_url(address)).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => ProbeResult::Healthy,
            Ok(resp) => ProbeResult::Unhealthy(format!("status {}", resp.status())),
            Err(e) => ProbeResult::Unhealthy(e.to_string()),
        }
    }
}

/// Health endpoint of the device at `address`.
pub fn health_url(address: &str) -> String {
    format!("http://{address}/healthz")
}

/// Probes every client in the current snapshot once and evicts the failures.
///
/// Returns the ids that were evicted. A client that re-registered at a new
/// address while its old address was being probed is kept.
pub async fn run_cycle(clients: &ClientRegistry, prober: &HealthProber) -> Vec<String> {
    let snapshot = clients.snapshot();
    if snapshot.is_empty() {
        return Vec::new();
    }

    let mut probes = JoinSet::new();
    for record in snapshot {
        let prober = prober.clone();
        probes.spawn(async move {
            let result = prober.probe(&record.address).await;
            (record, result)
        });
    }

    let mut evicted = Vec::new();
    while let Some(joined) = probes.join_next().await {
        let (record, result): (ClientRecord, ProbeResult) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("health probe task failed: {}", e);
                continue;
            }
        };

        match result {
            ProbeResult::Healthy => {
                tracing::debug!(
                    client_id = %record.id,
                    address = %record.address,
                    "client healthy"
                );
            }
            ProbeResult::Unhealthy(reason) => {
                if clients.remove_if_address(&record.id, &record.address) {
                    tracing::info!(
                        client_id = %record.id,
                        address = %record.address,
                        reason = %reason,
                        "evicted unresponsive client"
                    );
                    evicted.push(record.id);
                }
            }
        }
    }

    evicted.sort();
    evicted
}

/// Runs the monitor forever, one cycle every `interval_seconds`.
///
/// An interval of zero disables the monitor.
pub async fn start_liveness_task(
    clients: ClientRegistry,
    prober: HealthProber,
    interval_seconds: u64,
) {
    if interval_seconds == 0 {
        tracing::warn!("liveness monitor disabled (interval=0)");
        return;
    }

    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(interval_seconds, "starting liveness monitor");

    loop {
        sleep(interval).await;
        let evicted = run_cycle(&clients, &prober).await;
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "liveness cycle evicted clients");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_url_targets_healthz() {
        assert_eq!(health_url("192.168.1.40"), "http://192.168.1.40/healthz");
        assert_eq!(health_url("10.0.0.2:8080"), "http://10.0.0.2:8080/healthz");
    }

    #[tokio::test]
    async fn empty_registry_needs_no_probes() {
        let clients = ClientRegistry::new();
        let prober = HealthProber::new(Duration::from_millis(200));
        assert!(run_cycle(&clients, &prober).await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_client_is_evicted() {
        let clients = ClientRegistry::new();
        clients.upsert(ClientRecord {
            id: "AA:BB:CC:DD:EE:FF".to_string(),
            address: "127.0.0.1:9".to_string(),
            device_type: "camera".to_string(),
        });
        let prober = HealthProber::new(Duration::from_millis(500));

        let evicted = run_cycle(&clients, &prober).await;
        assert_eq!(evicted, vec!["AA:BB:CC:DD:EE:FF".to_string()]);
        assert!(clients.is_empty());
    }
}
