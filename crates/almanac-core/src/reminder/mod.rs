//! Reminder engine.
//!
//! - [`rule`]: the persisted rule model and its repeat policies
//! - [`evaluator`]: pure due/not-due decision for one rule
//! - [`coordinator`]: one poll cycle over every active rule
//! - [`poller`]: sequential periodic driver on tokio

pub mod coordinator;
pub mod evaluator;
pub mod lunar;
pub mod notify;
pub mod poller;
pub mod rule;
pub mod store;

pub use coordinator::{CycleOutcome, CycleReport, ReminderCoordinator};
pub use evaluator::{DueEvaluator, DEFAULT_TOLERANCE_MINUTES};
pub use lunar::{LunarDate, LunarOracle, TableOracle};
pub use notify::{DedupSink, MemorySink, NotificationSink};
pub use poller::{Poller, PollerHandle, DEFAULT_POLL_INTERVAL};
pub use rule::{DueReminder, MalformedRule, MonthDay, ReminderRule, Repeat, RepeatKind};
pub use store::{LoadedRules, RuleStore};
