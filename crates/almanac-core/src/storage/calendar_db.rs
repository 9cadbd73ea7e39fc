//! SQLite-based storage for date tags and reminder rules.
//!
//! Provides persistent storage for:
//! - Tags: one coloured note per calendar date
//! - Reminders: rules evaluated by the reminder engine
//!
//! The connection sits behind a mutex; every public method takes the lock
//! for the duration of a single statement or transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::data_dir;
use super::migrations;
use crate::error::{CoreError, DatabaseError, ValidationError};
use crate::reminder::rule::{parse_date, parse_time_of_day, DATE_FORMAT, TIME_FORMAT};
use crate::reminder::{LoadedRules, MalformedRule, ReminderRule, Repeat, RepeatKind, RuleStore};
use crate::tag::{
    normalize_color, reminder_message_from_tag, ReminderDraft, Tag, TagOverview, TagSearchField,
};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const RULE_COLUMNS: &str = "id, date, time, message, is_active, repeat_type, repeat_value";

const TAG_OVERVIEW_QUERY: &str = "SELECT t.id, t.date, t.tag, t.color, r.time, r.repeat_type, r.repeat_value
     FROM tags t
     LEFT JOIN reminders r ON r.id = (
         SELECT MIN(id) FROM reminders WHERE date = t.date AND is_active = 1
     )";

// === Helper Functions ===

/// Raw reminder row.
///
/// Cells are read by storage class rather than by Rust type, so a BLOB or a
/// stray string in one row surfaces as a [`MalformedRule`] for that row
/// instead of failing the query.
struct RuleRow {
    id: i64,
    date: Option<String>,
    time: Option<String>,
    message: Option<String>,
    is_active: Result<bool, String>,
    repeat_type: Option<String>,
    repeat_value: Option<String>,
}

/// Text view of a cell. Numbers are rendered, BLOBs become a placeholder
/// that no parser accepts.
fn text_cell(row: &Row, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(x) => Some(x.to_string()),
        ValueRef::Blob(bytes) => Some(format!("<blob of {} bytes>", bytes.len())),
    })
}

fn flag_cell(row: &Row, idx: usize) -> rusqlite::Result<Result<bool, String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Ok(true),
        ValueRef::Integer(n) => Ok(n != 0),
        _ => Err(text_cell(row, idx)?.unwrap_or_default()),
    })
}

impl RuleRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: text_cell(row, 1)?,
            time: text_cell(row, 2)?,
            message: text_cell(row, 3)?,
            is_active: flag_cell(row, 4)?,
            repeat_type: text_cell(row, 5)?,
            repeat_value: text_cell(row, 6)?,
        })
    }

    fn parse(self) -> Result<ReminderRule, MalformedRule> {
        let id = self.id;
        let malformed = |field: &'static str, value: Option<&str>| MalformedRule {
            id,
            field,
            value: value.unwrap_or_default().to_string(),
        };

        let start_date = self
            .date
            .as_deref()
            .and_then(|d| parse_date(d).ok())
            .ok_or_else(|| malformed("date", self.date.as_deref()))?;
        let time_of_day = self
            .time
            .as_deref()
            .and_then(|t| parse_time_of_day(t).ok())
            .ok_or_else(|| malformed("time", self.time.as_deref()))?;
        let kind = self
            .repeat_type
            .as_deref()
            .unwrap_or("none")
            .parse::<RepeatKind>()
            .map_err(|_| malformed("repeat_type", self.repeat_type.as_deref()))?;
        let repeat = Repeat::from_parts(kind, self.repeat_value.as_deref())
            .map_err(|_| malformed("repeat_value", self.repeat_value.as_deref()))?;
        let is_active = self
            .is_active
            .map_err(|raw| malformed("is_active", Some(raw.as_str())))?;

        Ok(ReminderRule {
            id,
            start_date,
            time_of_day,
            message: self.message.unwrap_or_default(),
            is_active,
            repeat,
        })
    }
}

fn split_rows(rows: Vec<RuleRow>) -> LoadedRules {
    let mut loaded = LoadedRules::default();
    for row in rows {
        match row.parse() {
            Ok(rule) => loaded.rules.push(rule),
            Err(bad) => loaded.malformed.push(bad),
        }
    }
    loaded
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_date(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        date: date_column(row, 1)?,
        text: row.get(2)?,
        color: row.get(3)?,
    })
}

fn row_to_overview(row: &Row) -> rusqlite::Result<TagOverview> {
    let tag = row_to_tag(row)?;
    let reminder_time: Option<String> = row.get(4)?;
    let repeat_type: Option<String> = row.get(5)?;
    let repeat_kind = match (&reminder_time, repeat_type) {
        (Some(_), Some(code)) => code.parse::<RepeatKind>().ok(),
        (Some(_), None) => Some(RepeatKind::None),
        (None, _) => None,
    };
    Ok(TagOverview {
        tag,
        reminder_time,
        repeat_kind,
        repeat_value: row.get(6)?,
    })
}

fn validate_tag_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::invalid("text", "tag text is empty"));
    }
    Ok(())
}

fn insert_rule_in(conn: &Connection, rule: &ReminderRule) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO reminders (date, time, message, is_active, repeat_type, repeat_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            format_date(rule.start_date),
            rule.time_of_day.format(TIME_FORMAT).to_string(),
            rule.message,
            rule.is_active,
            rule.repeat_kind().as_str(),
            rule.repeat_value(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// SQLite database for tags and reminders.
pub struct CalendarDb {
    conn: Mutex<Connection>,
}

impl CalendarDb {
    /// Open the database at `~/.config/almanac/almanac.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created or the
    /// database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("almanac.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::create_tables(&conn)?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn create_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tags (
                id     INTEGER PRIMARY KEY,
                date   TEXT NOT NULL,
                tag    TEXT NOT NULL,
                color  TEXT NOT NULL DEFAULT '#1E90FF'
            );

            CREATE TABLE IF NOT EXISTS reminders (
                id           INTEGER PRIMARY KEY,
                date         TEXT,
                time         TEXT,
                message      TEXT,
                is_active    INTEGER DEFAULT 1,
                repeat_type  TEXT NOT NULL DEFAULT 'none',
                repeat_value TEXT DEFAULT NULL
            );",
        )
    }

    /// A panic while the lock was held leaves the connection usable:
    /// statements are atomic and open transactions roll back on drop.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Reminders ===

    /// Insert a new rule, ignoring `rule.id`. Returns the assigned id.
    pub fn insert_rule(&self, rule: &ReminderRule) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        Ok(insert_rule_in(&conn, rule)?)
    }

    /// Fetch one rule by id.
    ///
    /// # Errors
    /// Returns [`CoreError::MalformedRule`] if the stored row cannot be parsed.
    pub fn get_rule(&self, id: i64) -> Result<Option<ReminderRule>, CoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM reminders WHERE id = ?1"),
                params![id],
                RuleRow::from_row,
            )
            .optional()
            .map_err(DatabaseError::from)?;
        match row {
            Some(row) => Ok(Some(row.parse()?)),
            None => Ok(None),
        }
    }

    /// All rules, active and inactive, by ascending id.
    pub fn list_rules(&self) -> Result<LoadedRules, DatabaseError> {
        self.query_rules("", params![])
    }

    /// Rules whose start date is `date`.
    pub fn rules_on_date(&self, date: NaiveDate) -> Result<LoadedRules, DatabaseError> {
        self.query_rules("WHERE date = ?1", params![format_date(date)])
    }

    fn query_rules(&self, filter: &str, params: &[&dyn rusqlite::ToSql]) -> Result<LoadedRules, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {RULE_COLUMNS} FROM reminders {filter} ORDER BY id"))?;
        let rows = stmt
            .query_map(params, RuleRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(split_rows(rows))
    }

    /// Set `is_active` explicitly. Returns whether the rule exists.
    pub fn set_active(&self, id: i64, active: bool) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE reminders SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(changed > 0)
    }

    // === Tags ===

    pub fn get_tag(&self, date: NaiveDate) -> Result<Option<Tag>, DatabaseError> {
        let conn = self.conn();
        let tag = conn
            .query_row(
                "SELECT id, date, tag, color FROM tags WHERE date = ?1 ORDER BY id DESC LIMIT 1",
                params![format_date(date)],
                row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    /// Save the tag for `date`, replacing any existing one. Reminders on the
    /// date are left alone.
    pub fn save_tag(&self, date: NaiveDate, text: &str, color: &str) -> Result<Tag, CoreError> {
        validate_tag_text(text)?;
        let color = normalize_color(color)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let tag = Self::replace_tag_in(&tx, date, text, &color)?;
        tx.commit()?;
        Ok(tag)
    }

    /// Save the tag for `date` and replace that date's reminders, in one
    /// transaction.
    ///
    /// With `reminder` set, a single active rule starting on `date` is
    /// created, its message taken from the tag text. Without it the date
    /// ends up with no reminders. Returns the tag and the new rule's id.
    pub fn save_tag_with_reminder(
        &self,
        date: NaiveDate,
        text: &str,
        color: &str,
        reminder: Option<ReminderDraft>,
    ) -> Result<(Tag, Option<i64>), CoreError> {
        validate_tag_text(text)?;
        let color = normalize_color(color)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let tag = Self::replace_tag_in(&tx, date, text, &color)?;
        tx.execute("DELETE FROM reminders WHERE date = ?1", params![format_date(date)])?;

        let rule_id = match reminder {
            Some(draft) => {
                let rule = ReminderRule::new(date, draft.time_of_day, reminder_message_from_tag(text), draft.repeat);
                Some(insert_rule_in(&tx, &rule)?)
            }
            None => None,
        };

        tx.commit()?;
        Ok((tag, rule_id))
    }

    fn replace_tag_in(conn: &Connection, date: NaiveDate, text: &str, color: &str) -> rusqlite::Result<Tag> {
        let date_str = format_date(date);
        conn.execute("DELETE FROM tags WHERE date = ?1", params![date_str])?;
        conn.execute(
            "INSERT INTO tags (date, tag, color) VALUES (?1, ?2, ?3)",
            params![date_str, text, color],
        )?;
        Ok(Tag {
            id: conn.last_insert_rowid(),
            date,
            text: text.to_string(),
            color: color.to_string(),
        })
    }

    /// Delete the tag on `date` together with every reminder on that date.
    /// Returns whether anything was removed.
    pub fn delete_tag(&self, date: NaiveDate) -> Result<bool, DatabaseError> {
        let date_str = format_date(date);
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let tags = tx.execute("DELETE FROM tags WHERE date = ?1", params![date_str])?;
        let reminders = tx.execute("DELETE FROM reminders WHERE date = ?1", params![date_str])?;
        tx.commit()?;
        Ok(tags + reminders > 0)
    }

    /// Every tag with its active reminder, newest date first.
    pub fn list_tags(&self) -> Result<Vec<TagOverview>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{TAG_OVERVIEW_QUERY} ORDER BY t.date DESC"))?;
        let tags = stmt
            .query_map([], row_to_overview)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Tags whose `field` contains `query`. A blank query lists every tag.
    pub fn search_tags(&self, query: &str, field: TagSearchField) -> Result<Vec<TagOverview>, DatabaseError> {
        let query = query.trim();
        if query.is_empty() {
            return self.list_tags();
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{TAG_OVERVIEW_QUERY} WHERE {} LIKE ?1 ORDER BY t.date DESC",
            field.column()
        ))?;
        let tags = stmt
            .query_map(params![format!("%{query}%")], row_to_overview)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }
}

impl RuleStore for CalendarDb {
    fn list_active_rules(&self) -> Result<LoadedRules, DatabaseError> {
        self.query_rules("WHERE is_active = 1", params![])
    }

    fn deactivate(&self, id: i64) -> Result<(), DatabaseError> {
        self.set_active(id, false).map(|_| ())
    }

    fn upsert(&self, rule: &ReminderRule) -> Result<i64, DatabaseError> {
        if rule.id == 0 {
            return self.insert_rule(rule);
        }

        let conn = self.conn();
        conn.execute(
            "INSERT INTO reminders (id, date, time, message, is_active, repeat_type, repeat_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                date = excluded.date,
                time = excluded.time,
                message = excluded.message,
                is_active = excluded.is_active,
                repeat_type = excluded.repeat_type,
                repeat_value = excluded.repeat_value",
            params![
                rule.id,
                format_date(rule.start_date),
                rule.time_of_day.format(TIME_FORMAT).to_string(),
                rule.message,
                rule.is_active,
                rule.repeat_kind().as_str(),
                rule.repeat_value(),
            ],
        )?;
        Ok(rule.id)
    }

    fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let removed = conn.execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}
