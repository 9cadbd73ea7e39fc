//! Reminder commands for CLI.

use std::sync::Arc;

use chrono::NaiveDateTime;
use clap::Subcommand;
use serde::Serialize;

use almanac_core::clock::{Clock, FixedClock, SystemClock};
use almanac_core::reminder::rule::parse_time_of_day;
use almanac_core::reminder::{DedupSink, LoadedRules, NotificationSink, Poller};
use almanac_core::storage::{CalendarDb, NotificationFormat};
use almanac_core::{
    Config, CycleOutcome, ReminderCoordinator, ReminderRule, RepeatKind, RuleStore, ValidationError,
};

use super::{evaluator, parse_day, parse_repeat, warn_if_never_due, CmdResult};
use crate::output::StdoutSink;

#[derive(Subcommand)]
pub enum ReminderAction {
    /// Add a reminder
    Add {
        /// Start date (YYYY-MM-DD)
        date: String,
        /// Time of day (HH:MM)
        time: String,
        /// Message shown when the reminder fires
        message: String,
        /// Repeat kind: none, daily, weekly, monthly, yearly, lunar_yearly
        #[arg(long, default_value = "none")]
        repeat: String,
        /// Weekday 0-6 (Sunday=0), day of month 1-31, or MM-DD
        #[arg(long)]
        repeat_value: Option<String>,
    },
    /// List reminders
    List {
        /// Include inactive reminders
        #[arg(long)]
        all: bool,
    },
    /// Show one reminder
    Show {
        /// Reminder ID
        id: i64,
    },
    /// Delete a reminder
    Delete {
        /// Reminder ID
        id: i64,
    },
    /// Stop a reminder from firing
    Deactivate {
        /// Reminder ID
        id: i64,
    },
    /// Re-enable a reminder
    Activate {
        /// Reminder ID
        id: i64,
    },
    /// Run one poll cycle and print what is due
    Check {
        /// Evaluate as of this local time instead of now ("YYYY-MM-DD HH:MM")
        #[arg(long)]
        at: Option<String>,
    },
    /// Poll in the foreground until Ctrl-C
    Watch,
}

/// JSON view of a stored rule.
#[derive(Serialize)]
struct RuleView<'a> {
    id: i64,
    date: String,
    time: String,
    message: &'a str,
    is_active: bool,
    repeat_type: RepeatKind,
    repeat_value: Option<String>,
}

impl<'a> From<&'a ReminderRule> for RuleView<'a> {
    fn from(rule: &'a ReminderRule) -> Self {
        Self {
            id: rule.id,
            date: rule.start_date.to_string(),
            time: rule.time_of_day.format("%H:%M").to_string(),
            message: &rule.message,
            is_active: rule.is_active,
            repeat_type: rule.repeat_kind(),
            repeat_value: rule.repeat_value(),
        }
    }
}

fn print_rules(loaded: &LoadedRules) -> CmdResult {
    for bad in &loaded.malformed {
        tracing::warn!(id = bad.id, field = bad.field, value = %bad.value, "skipping malformed reminder");
    }
    let views: Vec<RuleView> = loaded.rules.iter().map(RuleView::from).collect();
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

fn parse_instant(raw: &str) -> Result<NaiveDateTime, ValidationError> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M").map_err(|_| ValidationError::InvalidValue {
        field: "at".into(),
        message: format!("expected \"YYYY-MM-DD HH:MM\", got '{raw}'"),
    })
}

fn not_found(id: i64) -> ValidationError {
    ValidationError::NotFound {
        kind: "reminder",
        id: id.to_string(),
    }
}

fn coordinator(db: CalendarDb, config: &Config) -> ReminderCoordinator<CalendarDb> {
    ReminderCoordinator::new(db, evaluator(config))
}

pub fn run(action: ReminderAction, config: &Config) -> CmdResult {
    let db = CalendarDb::open()?;

    match action {
        ReminderAction::Add {
            date,
            time,
            message,
            repeat,
            repeat_value,
        } => {
            let start = parse_day(&date)?;
            let rule = ReminderRule::new(
                start,
                parse_time_of_day(&time)?,
                message,
                parse_repeat(&repeat, repeat_value.as_deref(), start)?,
            );
            warn_if_never_due(&rule.repeat, &evaluator(config));
            let id = db.insert_rule(&rule)?;
            println!("Reminder created: {id}");
        }
        ReminderAction::List { all } => {
            let loaded = if all { db.list_rules()? } else { db.list_active_rules()? };
            print_rules(&loaded)?;
        }
        ReminderAction::Show { id } => {
            let rule = db.get_rule(id)?.ok_or_else(|| not_found(id))?;
            println!("{}", serde_json::to_string_pretty(&RuleView::from(&rule))?);
        }
        ReminderAction::Delete { id } => {
            if !db.delete(id)? {
                return Err(not_found(id).into());
            }
            println!("Reminder deleted: {id}");
        }
        ReminderAction::Deactivate { id } => {
            if !db.set_active(id, false)? {
                return Err(not_found(id).into());
            }
            println!("Reminder deactivated: {id}");
        }
        ReminderAction::Activate { id } => {
            if !db.set_active(id, true)? {
                return Err(not_found(id).into());
            }
            println!("Reminder activated: {id}");
        }
        ReminderAction::Check { at } => {
            let clock: Box<dyn Clock> = match at {
                Some(raw) => Box::new(FixedClock::new(parse_instant(&raw)?)),
                None => Box::new(SystemClock),
            };
            let mut sink = StdoutSink::new(&config.notifications);
            let outcome = coordinator(db, config).run_and_deliver(clock.now(), &mut sink);

            match outcome {
                CycleOutcome::Skipped { error } => return Err(error.into()),
                CycleOutcome::Completed(report) => {
                    if report.due.is_empty() && sink.format() == NotificationFormat::Text {
                        println!("No reminders due");
                    }
                    if !report.ack_failures.is_empty() {
                        tracing::warn!(ids = ?report.ack_failures, "some one-shot reminders may fire again");
                    }
                }
            }
        }
        ReminderAction::Watch => watch(db, config)?,
    }
    Ok(())
}

fn watch(db: CalendarDb, config: &Config) -> CmdResult {
    let runtime = tokio::runtime::Runtime::new()?;
    let coordinator = Arc::new(coordinator(db, config));
    let mut sink = DedupSink::new(StdoutSink::new(&config.notifications));

    runtime.block_on(async {
        let mut handle = Poller::spawn(coordinator, Arc::new(SystemClock), config.poll_interval());
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                batch = handle.recv() => match batch {
                    Some(batch) => sink.deliver(&batch),
                    None => break,
                },
                _ = &mut ctrl_c => {
                    tracing::info!("interrupted, stopping");
                    break;
                }
            }
        }

        handle.shutdown().await;
    });
    Ok(())
}
