//! Date tags.
//!
//! A tag is a coloured note pinned to one calendar date. Saving a tag can
//! also set the reminder for that date; the reminder's message is a short
//! excerpt of the tag text.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::reminder::{Repeat, RepeatKind};

pub const DEFAULT_TAG_COLOR: &str = "#1E90FF";

/// Reminder messages derived from tag text keep this many characters.
const REMINDER_EXCERPT_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub date: NaiveDate,
    pub text: String,
    pub color: String,
}

/// A tag with the active reminder on the same date, if there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOverview {
    #[serde(flatten)]
    pub tag: Tag,
    pub reminder_time: Option<String>,
    pub repeat_kind: Option<RepeatKind>,
    pub repeat_value: Option<String>,
}

impl TagOverview {
    /// First line of the tag text, cut to `max_chars`.
    pub fn headline(&self, max_chars: usize) -> String {
        let first = self.tag.text.lines().next().unwrap_or_default();
        excerpt(first, max_chars)
    }
}

/// Column a tag search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSearchField {
    #[default]
    Text,
    Date,
    Color,
}

impl TagSearchField {
    pub(crate) fn column(self) -> &'static str {
        match self {
            TagSearchField::Text => "t.tag",
            TagSearchField::Date => "t.date",
            TagSearchField::Color => "t.color",
        }
    }
}

impl FromStr for TagSearchField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(TagSearchField::Text),
            "date" => Ok(TagSearchField::Date),
            "color" => Ok(TagSearchField::Color),
            other => Err(ValidationError::invalid("search_field", format!("unknown field '{other}'"))),
        }
    }
}

impl fmt::Display for TagSearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TagSearchField::Text => "text",
            TagSearchField::Date => "date",
            TagSearchField::Color => "color",
        })
    }
}

/// Reminder settings supplied when saving a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderDraft {
    pub time_of_day: NaiveTime,
    pub repeat: Repeat,
}

/// Check a `#RRGGBB` colour and return it upper-cased.
pub fn normalize_color(color: &str) -> Result<String, ValidationError> {
    let hex = color
        .strip_prefix('#')
        .filter(|h| h.len() == 6 && h.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| ValidationError::invalid("color", format!("expected #RRGGBB, got '{color}'")))?;
    Ok(format!("#{}", hex.to_ascii_uppercase()))
}

/// Message for a reminder created from tag text.
pub fn reminder_message_from_tag(text: &str) -> String {
    excerpt(text.trim(), REMINDER_EXCERPT_CHARS)
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_kept_whole() {
        assert_eq!(reminder_message_from_tag("Dentist"), "Dentist");
        let exactly_twenty = "a".repeat(20);
        assert_eq!(reminder_message_from_tag(&exactly_twenty), exactly_twenty);
    }

    #[test]
    fn long_text_is_cut_on_char_boundary() {
        let text = "春节快乐，记得给爷爷奶奶打电话拜年，还要准备红包和年夜饭";
        let msg = reminder_message_from_tag(text);
        assert!(msg.ends_with("..."));
        assert_eq!(msg.chars().count(), 23);
    }

    #[test]
    fn color_validation() {
        assert_eq!(normalize_color("#1e90ff").unwrap(), "#1E90FF");
        assert!(normalize_color("1E90FF").is_err());
        assert!(normalize_color("#12345").is_err());
        assert!(normalize_color("#GGGGGG").is_err());
    }

    #[test]
    fn search_field_parses() {
        assert_eq!("color".parse::<TagSearchField>().unwrap(), TagSearchField::Color);
        assert!("tag".parse::<TagSearchField>().is_err());
    }

    #[test]
    fn headline_uses_first_line() {
        let overview = TagOverview {
            tag: Tag {
                id: 1,
                date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
                text: "Lunar new year\nvisit family".into(),
                color: DEFAULT_TAG_COLOR.into(),
            },
            reminder_time: None,
            repeat_kind: None,
            repeat_value: None,
        };
        assert_eq!(overview.headline(50), "Lunar new year");
        assert_eq!(overview.headline(5), "Lunar...");
    }
}
