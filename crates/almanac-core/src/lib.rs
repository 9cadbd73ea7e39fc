//! # Almanac Core Library
//!
//! This library provides the core logic for the Almanac calendar: coloured
//! date tags and the recurring-reminder engine behind them. All operations
//! are available through the standalone `almanac` CLI, which is a thin layer
//! over this crate.
//!
//! ## Architecture
//!
//! - **Rule Store**: durable reminder rules behind the [`RuleStore`] trait,
//!   backed by SQLite in [`CalendarDb`]
//! - **Due Evaluator**: a pure decision of whether one rule fires at one instant
//! - **Firing Coordinator**: one poll cycle that fetches, evaluates,
//!   deactivates fired one-shot rules and reports the due batch
//! - **Poller**: a sequential tokio loop that drives the coordinator
//!
//! ## Key Components
//!
//! - [`ReminderCoordinator`]: one poll cycle over every active rule
//! - [`DueEvaluator`]: repeat-policy matching with a tolerance window
//! - [`CalendarDb`]: tag and reminder persistence
//! - [`Config`]: application configuration management

pub mod clock;
pub mod error;
pub mod reminder;
pub mod storage;
pub mod tag;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use reminder::{
    CycleOutcome, CycleReport, DueEvaluator, DueReminder, NotificationSink, Poller, ReminderCoordinator,
    ReminderRule, Repeat, RepeatKind, RuleStore,
};
pub use storage::{CalendarDb, Config};
pub use tag::{Tag, TagOverview, TagSearchField};
