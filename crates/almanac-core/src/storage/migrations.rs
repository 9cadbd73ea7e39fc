//! Database schema migrations for almanac.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.
//!
//! Databases written by older releases have a `reminders` table without the
//! repeat columns; v2 adds them.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| row.get::<_, i32>(0))
        .unwrap_or_else(|e| {
            if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                tracing::warn!(error = %e, "failed to read schema_version");
            }
            0
        })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> SqliteResult<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Migration v1: baseline. Tables are created by `CalendarDb` directly.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    set_schema_version(conn, 1)
}

/// Migration v2: repeat rules on reminders.
///
/// Adds, when missing:
/// - repeat_type: none | daily | weekly | monthly | yearly | lunar_yearly
/// - repeat_value: kind-specific value, NULL for none/daily
///
/// Existing reminders become one-shot.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    if !has_column(&tx, "reminders", "repeat_type")? {
        tx.execute_batch("ALTER TABLE reminders ADD COLUMN repeat_type TEXT NOT NULL DEFAULT 'none';")?;
    }
    if !has_column(&tx, "reminders", "repeat_value")? {
        tx.execute_batch("ALTER TABLE reminders ADD COLUMN repeat_value TEXT DEFAULT NULL;")?;
    }

    // Older rows may carry NULL where the column existed without a default.
    tx.execute(
        "UPDATE reminders SET repeat_type = 'none' WHERE repeat_type IS NULL OR repeat_type = ''",
        [],
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: indexes for the poll query and per-date lookups.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_reminders_is_active ON reminders(is_active);
         CREATE INDEX IF NOT EXISTS idx_reminders_date ON reminders(date);
         CREATE INDEX IF NOT EXISTS idx_tags_date ON tags(date);",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()
}
