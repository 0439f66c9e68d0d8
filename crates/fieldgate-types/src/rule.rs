//! Operator-defined rules and their trigger kinds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::WILDCARD_CLIENT;

/// Comparison policy applied to a rule's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fires when `min <= value <= max`.
    InsideRange,
    /// Fires when `value < min || value > max`.
    OutsideRange,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsideRange => "inside_range",
            Self::OutsideRange => "outside_range",
        }
    }

    /// Returns whether `value` fires this trigger for the bounds `[min, max]`.
    pub fn fires(self, value: f64, min: f64, max: f64) -> bool {
        match self {
            Self::InsideRange => min <= value && value <= max,
            Self::OutsideRange => value < min || value > max,
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for a trigger string that names no known trigger kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid trigger: {0}")]
pub struct ParseTriggerKindError(pub String);

impl std::str::FromStr for TriggerKind {
    type Err = ParseTriggerKindError;

    /// Accepts the canonical names and the `_trigger`-suffixed names used by
    /// existing rule tables.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inside_range" | "inside_range_trigger" => Ok(Self::InsideRange),
            "outside_range" | "outside_range_trigger" => Ok(Self::OutsideRange),
            _ => Err(ParseTriggerKindError(s.to_string())),
        }
    }
}

/// A persisted rule row.
///
/// `trigger` is kept as stored text; it is parsed per evaluation so that a
/// single misconfigured row cannot prevent the others from loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: i64,
    /// Target client identifier, or [`WILDCARD_CLIENT`].
    pub client_id: String,
    pub parameter_name: String,
    pub min_range: f64,
    pub max_range: f64,
    pub trigger: String,
    /// Name of the callback dispatched when the rule fires.
    pub callback: String,
}

impl Rule {
    /// Returns whether this rule targets `client_id`.
    pub fn applies_to(&self, client_id: &str) -> bool {
        self.client_id == WILDCARD_CLIENT || self.client_id == client_id
    }

    pub fn trigger_kind(&self) -> Result<TriggerKind, ParseTriggerKindError> {
        self.trigger.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(client_id: &str, trigger: &str) -> Rule {
        Rule {
            rule_id: 1,
            client_id: client_id.to_string(),
            parameter_name: "temperature".to_string(),
            min_range: 0.0,
            max_range: 50.0,
            trigger: trigger.to_string(),
            callback: "fox_callback".to_string(),
        }
    }

    #[test]
    fn inside_range_includes_bounds() {
        let kind = TriggerKind::InsideRange;
        assert!(kind.fires(0.0, 0.0, 50.0));
        assert!(kind.fires(25.0, 0.0, 50.0));
        assert!(kind.fires(50.0, 0.0, 50.0));
        assert!(!kind.fires(-0.5, 0.0, 50.0));
        assert!(!kind.fires(99.0, 0.0, 50.0));
    }

    #[test]
    fn outside_range_negates_inside_range_off_the_bounds() {
        for value in [-100.0, -0.01, 0.01, 12.5, 49.99, 50.01, 1e9] {
            assert_eq!(
                TriggerKind::OutsideRange.fires(value, 0.0, 50.0),
                !TriggerKind::InsideRange.fires(value, 0.0, 50.0),
                "value {value}"
            );
        }
        assert!(!TriggerKind::OutsideRange.fires(0.0, 0.0, 50.0));
        assert!(!TriggerKind::OutsideRange.fires(50.0, 0.0, 50.0));
    }

    #[test]
    fn parses_canonical_and_suffixed_names() {
        assert_eq!("inside_range".parse(), Ok(TriggerKind::InsideRange));
        assert_eq!("inside_range_trigger".parse(), Ok(TriggerKind::InsideRange));
        assert_eq!("outside_range".parse(), Ok(TriggerKind::OutsideRange));
        assert_eq!(
            "outside_range_trigger".parse(),
            Ok(TriggerKind::OutsideRange)
        );
        assert_eq!(
            "above".parse::<TriggerKind>(),
            Err(ParseTriggerKindError("above".to_string()))
        );
    }

    #[test]
    fn wildcard_matches_every_client() {
        let wildcard = rule(WILDCARD_CLIENT, "inside_range");
        for id in ["AA:BB:CC:DD:EE:FF", "00:00:00:00:00:01", "anything"] {
            assert!(wildcard.applies_to(id));
        }
    }

    #[test]
    fn specific_rule_matches_exactly() {
        let specific = rule("AA:BB:CC:DD:EE:FF", "inside_range");
        assert!(specific.applies_to("AA:BB:CC:DD:EE:FF"));
        assert!(!specific.applies_to("aa:bb:cc:dd:ee:ff"));
        assert!(!specific.applies_to("00:00:00:00:00:01"));
    }

    #[test]
    fn trigger_kind_reports_unknown_trigger() {
        assert!(rule("*", "sometimes").trigger_kind().is_err());
        assert_eq!(
            rule("*", "outside_range").trigger_kind(),
            Ok(TriggerKind::OutsideRange)
        );
    }
}
