//! Rule evaluation engine.
//!
//! Given a client's parameter payload, every persisted rule targeting that
//! client is checked against the matching parameter. Each firing rule
//! appends one alert and dispatches its callback on a background task, so
//! slow callbacks never hold up ingestion.
//!
//! Rules are read from the store on every evaluation; there is no cache and
//! no pinning of a rule set across one event.

use fieldgate_db::{list_rules, DbPool, StoreError};
use fieldgate_types::{Rule, RULE_TRIGGER_CATEGORY};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::alerts::AlertLog;
use crate::callbacks::Dispatcher;

/// Errors that abort an evaluation pass before any rule is checked.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load rules: {0}")]
    Store(#[from] StoreError),
    #[error("rule loading task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A rule that fired for one parameter value.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub rule_id: i64,
    pub parameter: String,
    pub value: f64,
    pub callback: String,
}

/// Checks `rules` against the reading `data` for `client_id` and returns
/// what fires.
///
/// Rules with an unknown trigger are logged and skipped; non-numeric
/// parameter values are ignored.
pub fn matching_rules(rules: &[Rule], client_id: &str, data: &Map<String, Value>) -> Vec<Firing> {
    let mut firings = Vec::new();

    for rule in rules.iter().filter(|rule| rule.applies_to(client_id)) {
        let Some(raw) = data.get(&rule.parameter_name) else {
            continue;
        };

        let kind = match rule.trigger_kind() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::error!(rule_id = rule.rule_id, error = %e, "skipping misconfigured rule");
                continue;
            }
        };

        let Some(value) = raw.as_f64() else {
            tracing::debug!(
                rule_id = rule.rule_id,
                parameter = %rule.parameter_name,
                "parameter value is not numeric, skipping"
            );
            continue;
        };

        if kind.fires(value, rule.min_range, rule.max_range) {
            firings.push(Firing {
                rule_id: rule.rule_id,
                parameter: rule.parameter_name.clone(),
                value,
                callback: rule.callback.clone(),
            });
        }
    }

    firings
}

/// Message recorded on the alert raised for a firing rule.
pub fn alert_message(parameter: &str, value: f64) -> String {
    format!("{parameter} detected (confidence: {value}) - alert triggered.")
}

/// Evaluates parameter payloads against the rule store.
#[derive(Clone)]
pub struct RuleEngine {
    pool: DbPool,
    alerts: AlertLog,
    dispatcher: Dispatcher,
}

impl RuleEngine {
    pub fn new(pool: DbPool, alerts: AlertLog, dispatcher: Dispatcher) -> Self {
        Self {
            pool,
            alerts,
            dispatcher,
        }
    }

    /// Runs one evaluation pass for `client_id`.
    ///
    /// Each firing appends an alert and spawns its callback; the returned
    /// list describes what fired.
    pub async fn evaluate(
        &self,
        client_id: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Firing>, EngineError> {
        let pool = self.pool.clone();
        let rules = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            list_rules(&conn)
        })
        .await??;

        let firings = matching_rules(&rules, client_id, params);

        for firing in &firings {
            let alert = self.alerts.append(
                RULE_TRIGGER_CATEGORY,
                client_id,
                alert_message(&firing.parameter, firing.value),
            );
            tracing::info!(
                client_id,
                rule_id = firing.rule_id,
                alert_id = alert.id,
                callback = %firing.callback,
                "rule fired"
            );
            self.dispatcher.spawn(firing.callback.clone(), client_id.to_string());
        }

        Ok(firings)
    }
}
