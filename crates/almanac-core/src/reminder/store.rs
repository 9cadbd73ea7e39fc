//! Storage seam for reminder rules.

use crate::error::DatabaseError;

use super::rule::{MalformedRule, ReminderRule};

/// Rules as read from storage.
///
/// Rows that fail to parse do not fail the read; they are reported in
/// `malformed` so the caller can log and skip them.
#[derive(Debug, Clone, Default)]
pub struct LoadedRules {
    pub rules: Vec<ReminderRule>,
    pub malformed: Vec<MalformedRule>,
}

/// Durable CRUD over reminder rules.
///
/// Every call is atomic on its own; no call spans more than one
/// transaction.
pub trait RuleStore: Send + Sync {
    /// All rules with `is_active = true`, in no particular order.
    fn list_active_rules(&self) -> Result<LoadedRules, DatabaseError>;

    /// Mark a rule inactive. Succeeds for rules already inactive or missing.
    fn deactivate(&self, id: i64) -> Result<(), DatabaseError>;

    /// Insert (`rule.id == 0`) or replace a rule. Returns its id.
    fn upsert(&self, rule: &ReminderRule) -> Result<i64, DatabaseError>;

    /// Delete a rule. Returns whether a row was removed.
    fn delete(&self, id: i64) -> Result<bool, DatabaseError>;
}

impl<S: RuleStore + ?Sized> RuleStore for std::sync::Arc<S> {
    fn list_active_rules(&self) -> Result<LoadedRules, DatabaseError> {
        (**self).list_active_rules()
    }

    fn deactivate(&self, id: i64) -> Result<(), DatabaseError> {
        (**self).deactivate(id)
    }

    fn upsert(&self, rule: &ReminderRule) -> Result<i64, DatabaseError> {
        (**self).upsert(rule)
    }

    fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        (**self).delete(id)
    }
}
