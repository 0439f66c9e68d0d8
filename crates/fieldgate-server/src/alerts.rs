//! In-memory log of active alerts.
//!
//! Alerts are kept in insertion order and are only ever appended or removed.
//! Each alert carries a stable id assigned under the same lock as the
//! append, so a dismissal by id can never hit a different entry than the
//! one the operator saw.

use fieldgate_types::Alert;
use std::sync::{Arc, Mutex};

/// Format used for alert timestamps.
pub const ALERT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default)]
struct AlertLogInner {
    next_id: u64,
    alerts: Vec<Alert>,
}

/// Shared, cloneable handle to the alert log.
#[derive(Debug, Clone, Default)]
pub struct AlertLog {
    inner: Arc<Mutex<AlertLogInner>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new alert stamped with the current UTC time and returns it.
    pub fn append(&self, category: &str, client_id: &str, message: impl Into<String>) -> Alert {
        let timestamp = chrono::Utc::now()
            .format(ALERT_TIMESTAMP_FORMAT)
            .to_string();

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let alert = Alert {
            id: inner.next_id,
            category: category.to_string(),
            client_id: client_id.to_string(),
            timestamp,
            message: message.into(),
        };
        inner.alerts.push(alert.clone());
        alert
    }

    /// Returns the active alerts in insertion order.
    pub fn list(&self) -> Vec<Alert> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .alerts
            .clone()
    }

    /// Removes the alert with the given stable id.
    pub fn dismiss(&self, id: u64) -> Option<Alert> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let position = inner.alerts.iter().position(|alert| alert.id == id)?;
        Some(inner.alerts.remove(position))
    }

    /// Removes the alert currently at `position`.
    ///
    /// Lookup and removal happen under one lock acquisition. The position
    /// still refers to the list as it is now, not as any earlier reader saw it.
    pub fn dismiss_at(&self, position: usize) -> Option<Alert> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if position < inner.alerts.len() {
            Some(inner.alerts.remove(position))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .alerts
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
