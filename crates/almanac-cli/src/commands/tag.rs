//! Date tag commands for CLI.

use clap::Subcommand;

use almanac_core::reminder::rule::parse_time_of_day;
use almanac_core::storage::CalendarDb;
use almanac_core::tag::{ReminderDraft, DEFAULT_TAG_COLOR};
use almanac_core::{Config, TagOverview, TagSearchField};

use super::{evaluator, parse_day, parse_repeat, warn_if_never_due, CmdResult};

const BRIEF_HEADLINE_CHARS: usize = 40;

#[derive(Subcommand)]
pub enum TagAction {
    /// Tag a date, replacing its existing tag and reminders
    Set {
        /// Date (YYYY-MM-DD)
        date: String,
        /// Tag text
        text: String,
        /// Colour as #RRGGBB
        #[arg(long, default_value = DEFAULT_TAG_COLOR)]
        color: String,
        /// Also remind at this time (HH:MM)
        #[arg(long)]
        remind: Option<String>,
        /// Repeat kind: none, daily, weekly, monthly, yearly, lunar_yearly
        #[arg(long, requires = "remind")]
        repeat: Option<String>,
        /// Weekday 0-6 (Sunday=0), day of month 1-31, or MM-DD
        #[arg(long, requires = "remind")]
        repeat_value: Option<String>,
        /// Leave the date's reminders untouched
        #[arg(long, conflicts_with = "remind")]
        keep_reminders: bool,
    },
    /// Show the tag on a date
    Get {
        /// Date (YYYY-MM-DD)
        date: String,
    },
    /// List all tags, newest first
    List {
        /// One line per tag instead of JSON
        #[arg(long)]
        brief: bool,
    },
    /// Search tags
    Search {
        /// Text to look for; empty lists everything
        query: String,
        /// Field to search: text, date or color
        #[arg(long, default_value = "text")]
        by: String,
        /// One line per tag instead of JSON
        #[arg(long)]
        brief: bool,
    },
    /// Delete the tag on a date together with its reminders
    Delete {
        /// Date (YYYY-MM-DD)
        date: String,
    },
}

/// `2024-02-10 #1E90FF Lunar new year [08:00 yearly]`
fn brief_line(overview: &TagOverview) -> String {
    let mut line = format!(
        "{} {} {}",
        overview.tag.date,
        overview.tag.color,
        overview.headline(BRIEF_HEADLINE_CHARS)
    );
    if let (Some(time), Some(kind)) = (&overview.reminder_time, overview.repeat_kind) {
        line.push_str(&format!(" [{time} {kind}]"));
    }
    line
}

fn print_tags(tags: &[TagOverview], brief: bool) -> CmdResult {
    if brief {
        for tag in tags {
            println!("{}", brief_line(tag));
        }
    } else {
        println!("{}", serde_json::to_string_pretty(tags)?);
    }
    Ok(())
}

pub fn run(action: TagAction, config: &Config) -> CmdResult {
    let db = CalendarDb::open()?;

    match action {
        TagAction::Set {
            date,
            text,
            color,
            remind,
            repeat,
            repeat_value,
            keep_reminders,
        } => {
            let date = parse_day(&date)?;
            if keep_reminders {
                let tag = db.save_tag(date, &text, &color)?;
                println!("Tag saved: {}", tag.date);
                return Ok(());
            }
            let draft = match remind {
                Some(time) => Some(ReminderDraft {
                    time_of_day: parse_time_of_day(&time)?,
                    repeat: parse_repeat(repeat.as_deref().unwrap_or("none"), repeat_value.as_deref(), date)?,
                }),
                None => None,
            };
            if let Some(draft) = &draft {
                warn_if_never_due(&draft.repeat, &evaluator(config));
            }
            let (tag, rule_id) = db.save_tag_with_reminder(date, &text, &color, draft)?;
            println!("Tag saved: {}", tag.date);
            if let Some(id) = rule_id {
                println!("Reminder created: {id}");
            }
        }
        TagAction::Get { date } => {
            let date = parse_day(&date)?;
            match db.get_tag(date)? {
                Some(tag) => println!("{}", serde_json::to_string_pretty(&tag)?),
                None => println!("No tag on {date}"),
            }
        }
        TagAction::List { brief } => print_tags(&db.list_tags()?, brief)?,
        TagAction::Search { query, by, brief } => {
            let field: TagSearchField = by.parse()?;
            print_tags(&db.search_tags(&query, field)?, brief)?;
        }
        TagAction::Delete { date } => {
            let date = parse_day(&date)?;
            if db.delete_tag(date)? {
                println!("Tag deleted: {date}");
            } else {
                println!("No tag on {date}");
            }
        }
    }
    Ok(())
}
