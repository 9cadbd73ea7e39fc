//! Firing coordinator.
//!
//! One call to [`ReminderCoordinator::run_cycle`] is one poll cycle:
//!
//! ```text
//! Fetch -> Evaluate -> Acknowledge -> (caller) Deliver
//! ```
//!
//! Fetch failures skip the cycle. Malformed rows are skipped one by one.
//! Fired one-shot rules are deactivated before the batch is handed out, so
//! a later cycle in the same tolerance window no longer sees them.
//! Recurring rules are never touched and stay due for the rest of their
//! window.

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;

use super::evaluator::DueEvaluator;
use super::notify::NotificationSink;
use super::rule::{DueReminder, MalformedRule};
use super::store::RuleStore;

/// What one cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Due reminders, in store order.
    pub due: Vec<DueReminder>,
    /// One-shot rules deactivated this cycle.
    pub deactivated: Vec<i64>,
    /// Rows skipped because they could not be parsed.
    pub malformed: Vec<MalformedRule>,
    /// One-shot rules whose deactivation failed. They were still delivered
    /// and may be delivered again next cycle.
    pub ack_failures: Vec<i64>,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// The store could not be read; nothing was evaluated.
    Skipped { error: DatabaseError },
}

impl CycleOutcome {
    pub fn due(&self) -> &[DueReminder] {
        match self {
            CycleOutcome::Completed(report) => &report.due,
            CycleOutcome::Skipped { .. } => &[],
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped { .. })
    }

    pub fn into_due(self) -> Vec<DueReminder> {
        match self {
            CycleOutcome::Completed(report) => report.due,
            CycleOutcome::Skipped { .. } => Vec::new(),
        }
    }
}

pub struct ReminderCoordinator<S> {
    store: S,
    evaluator: DueEvaluator,
}

impl<S: RuleStore> ReminderCoordinator<S> {
    pub fn new(store: S, evaluator: DueEvaluator) -> Self {
        Self { store, evaluator }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn evaluator(&self) -> &DueEvaluator {
        &self.evaluator
    }

    /// Run one fetch/evaluate/acknowledge pass as of `now`.
    pub fn run_cycle(&self, now: NaiveDateTime) -> CycleOutcome {
        let active = match self.store.list_active_rules() {
            Ok(active) => active,
            Err(error) => {
                warn!(%error, retryable = error.is_retryable(), "reminder cycle skipped: store unavailable");
                return CycleOutcome::Skipped { error };
            }
        };

        for bad in &active.malformed {
            warn!(id = bad.id, field = bad.field, value = %bad.value, "skipping malformed reminder");
        }

        let mut report = CycleReport {
            malformed: active.malformed,
            ..CycleReport::default()
        };

        for rule in &active.rules {
            let Some(due) = self.evaluator.check(rule, now) else {
                continue;
            };

            if !rule.repeat_kind().is_recurring() {
                match self.store.deactivate(rule.id) {
                    Ok(()) => report.deactivated.push(rule.id),
                    Err(error) => {
                        warn!(id = rule.id, %error, "failed to deactivate fired one-shot reminder");
                        report.ack_failures.push(rule.id);
                    }
                }
            }

            info!(
                id = due.id,
                kind = %due.repeat_kind,
                date = %due.effective_date,
                "reminder due"
            );
            report.due.push(due);
        }

        debug!(
            %now,
            evaluated = active.rules.len(),
            due = report.due.len(),
            deactivated = report.deactivated.len(),
            malformed = report.malformed.len(),
            "reminder cycle complete"
        );

        CycleOutcome::Completed(report)
    }

    /// Run a cycle and hand a non-empty due set to `sink` as one batch.
    pub fn run_and_deliver<N: NotificationSink + ?Sized>(&self, now: NaiveDateTime, sink: &mut N) -> CycleOutcome {
        let outcome = self.run_cycle(now);
        if !outcome.due().is_empty() {
            sink.deliver(outcome.due());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::notify::MemorySink;
    use crate::reminder::rule::{Repeat, ReminderRule};
    use crate::reminder::store::LoadedRules;
    use chrono::{NaiveDate, NaiveTime};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory store with switchable failures.
    #[derive(Default)]
    struct FakeStore {
        rules: Mutex<BTreeMap<i64, ReminderRule>>,
        malformed: Vec<MalformedRule>,
        fail_list: bool,
        fail_deactivate: bool,
    }

    impl FakeStore {
        fn with(rules: Vec<ReminderRule>) -> Self {
            Self {
                rules: Mutex::new(rules.into_iter().map(|r| (r.id, r)).collect()),
                ..Default::default()
            }
        }

        fn get(&self, id: i64) -> ReminderRule {
            self.rules.lock().unwrap()[&id].clone()
        }
    }

    impl RuleStore for FakeStore {
        fn list_active_rules(&self) -> Result<LoadedRules, DatabaseError> {
            if self.fail_list {
                return Err(DatabaseError::Locked);
            }
            Ok(LoadedRules {
                rules: self.rules.lock().unwrap().values().filter(|r| r.is_active).cloned().collect(),
                malformed: self.malformed.clone(),
            })
        }

        fn deactivate(&self, id: i64) -> Result<(), DatabaseError> {
            if self.fail_deactivate {
                return Err(DatabaseError::QueryFailed("disk I/O error".into()));
            }
            if let Some(r) = self.rules.lock().unwrap().get_mut(&id) {
                r.is_active = false;
            }
            Ok(())
        }

        fn upsert(&self, rule: &ReminderRule) -> Result<i64, DatabaseError> {
            self.rules.lock().unwrap().insert(rule.id, rule.clone());
            Ok(rule.id)
        }

        fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
            Ok(self.rules.lock().unwrap().remove(&id).is_some())
        }
    }

    fn rule(id: i64, start: NaiveDate, repeat: Repeat) -> ReminderRule {
        let mut r = ReminderRule::new(start, NaiveTime::from_hms_opt(8, 0, 0).unwrap(), format!("r{id}"), repeat);
        r.id = id;
        r
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        today().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn one_shot_is_deactivated_and_not_fired_again() {
        let store = FakeStore::with(vec![rule(1, today(), Repeat::None)]);
        let coordinator = ReminderCoordinator::new(store, DueEvaluator::new());

        let first = coordinator.run_cycle(at(8, 0));
        assert_eq!(first.due().len(), 1);
        assert!(!coordinator.store().get(1).is_active);

        let second = coordinator.run_cycle(at(8, 1));
        assert!(second.due().is_empty());
    }

    #[test]
    fn recurring_rules_stay_active() {
        let store = FakeStore::with(vec![rule(1, today(), Repeat::Daily)]);
        let coordinator = ReminderCoordinator::new(store, DueEvaluator::new());

        for minute in 0..=5 {
            let outcome = coordinator.run_cycle(at(8, minute));
            assert_eq!(outcome.due().len(), 1);
            assert!(coordinator.store().get(1).is_active);
        }
    }

    #[test]
    fn fetch_failure_skips_cycle() {
        let store = FakeStore {
            fail_list: true,
            ..FakeStore::with(vec![rule(1, today(), Repeat::Daily)])
        };
        let coordinator = ReminderCoordinator::new(store, DueEvaluator::new());
        let mut sink = MemorySink::new();

        let outcome = coordinator.run_and_deliver(at(8, 0), &mut sink);
        assert!(outcome.is_skipped());
        assert!(sink.batches().is_empty());
    }

    #[test]
    fn malformed_rows_do_not_block_others() {
        let store = FakeStore {
            malformed: vec![MalformedRule {
                id: 9,
                field: "time",
                value: "8 o'clock".into(),
            }],
            ..FakeStore::with(vec![rule(1, today(), Repeat::Daily)])
        };
        let coordinator = ReminderCoordinator::new(store, DueEvaluator::new());

        match coordinator.run_cycle(at(8, 0)) {
            CycleOutcome::Completed(report) => {
                assert_eq!(report.due.len(), 1);
                assert_eq!(report.malformed.len(), 1);
            }
            CycleOutcome::Skipped { error } => panic!("unexpected skip: {error}"),
        }
    }

    #[test]
    fn failed_ack_still_delivers() {
        let store = FakeStore {
            fail_deactivate: true,
            ..FakeStore::with(vec![rule(1, today(), Repeat::None)])
        };
        let coordinator = ReminderCoordinator::new(store, DueEvaluator::new());
        let mut sink = MemorySink::new();

        let outcome = coordinator.run_and_deliver(at(8, 0), &mut sink);
        let CycleOutcome::Completed(report) = outcome else {
            panic!("cycle skipped");
        };
        assert_eq!(report.ack_failures, vec![1]);
        assert!(report.deactivated.is_empty());
        assert_eq!(sink.delivered().len(), 1);
    }

    #[test]
    fn due_set_is_delivered_as_one_batch() {
        let store = FakeStore::with(vec![
            rule(1, today(), Repeat::None),
            rule(2, today(), Repeat::Daily),
            rule(3, today(), Repeat::Monthly(2)),
        ]);
        let coordinator = ReminderCoordinator::new(store, DueEvaluator::new());
        let mut sink = MemorySink::new();

        coordinator.run_and_deliver(at(8, 3), &mut sink);
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        let ids: Vec<i64> = batches[0].iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn nothing_due_delivers_nothing() {
        let store = FakeStore::with(vec![rule(1, today(), Repeat::Daily)]);
        let coordinator = ReminderCoordinator::new(store, DueEvaluator::new());
        let mut sink = MemorySink::new();

        coordinator.run_and_deliver(at(12, 0), &mut sink);
        assert!(sink.batches().is_empty());
    }
}
