//! Rule store adapter.
//!
//! The evaluation engine reads every rule on each event, so edits made to
//! the table take effect on the next inbound message without a reload.

use fieldgate_types::Rule;
use rusqlite::{params, Connection};

use crate::error::StoreError;

/// Fields for a new rule row; the store assigns `rule_id`.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub client_id: String,
    pub parameter_name: String,
    pub min_range: f64,
    pub max_range: f64,
    pub trigger: String,
    pub callback: String,
}

/// Returns all persisted rules ordered by id.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn list_rules(conn: &Connection) -> Result<Vec<Rule>, StoreError> {
    let mut stmt = conn.prepare(
        r#"SELECT rule_id, client_id, parameter_name, min_range, max_range, "trigger", callback
           FROM rules
           ORDER BY rule_id ASC"#,
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(Rule {
            rule_id: row.get(0)?,
            client_id: row.get(1)?,
            parameter_name: row.get(2)?,
            min_range: row.get(3)?,
            max_range: row.get(4)?,
            trigger: row.get(5)?,
            callback: row.get(6)?,
        })
    })?;

    let mut rules = Vec::new();
    for row in rows {
        rules.push(row?);
    }
    Ok(rules)
}

/// Inserts a rule and returns its assigned id.
///
/// The trigger text is stored as given; unknown triggers are reported when
/// the rule is evaluated, not here.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn insert_rule(conn: &Connection, rule: &NewRule) -> Result<i64, StoreError> {
    conn.execute(
        r#"INSERT INTO rules (client_id, parameter_name, min_range, max_range, "trigger", callback)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            rule.client_id,
            rule.parameter_name,
            rule.min_range,
            rule.max_range,
            rule.trigger,
            rule.callback,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
