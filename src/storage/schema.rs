//! Schema constants and introspection helpers.
//!
//! Migrations never trust the recorded version alone: before additive DDL
//! they look at the live shape through `PRAGMA table_info` and
//! `sqlite_master`, which is what these helpers wrap.

use rusqlite::{Connection, Result};

/// User-entered tables in an order that is safe for bulk deletes
/// (children before parents).
///
/// `radicals` is reference data and survives a clear.
pub const CLEARABLE_TABLES: &[&str] = &[
    "component_grouping_members",
    "component_groupings",
    "component_occurrences",
    "component_forms",
    "kanji_classifications",
    "kanji_meaning_group_members",
    "kanji_meaning_reading_groups",
    "kanji_meanings",
    "on_readings",
    "kun_readings",
    "vocab_kanji",
    "vocabulary",
    "kanjis",
    "components",
];

/// Read the schema version recorded in the database header.
///
/// A fresh database reports 0.
pub fn user_version(conn: &Connection) -> Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Record a new schema version.
pub fn set_user_version(conn: &Connection, version: u32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)
}

/// Column names of a table, in declaration order.
///
/// Returns an empty list when the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    stmt.query_map([table], |row| row.get(0))?
        .collect::<Result<Vec<String>>>()
}

/// Whether a table has a column with the given name.
pub fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    Ok(table_columns(conn, table)?.iter().any(|c| c == column))
}

/// Whether a table exists.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// All user tables, sorted by name.
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    stmt.query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>>>()
}

/// Row count of a single table.
///
/// The name must come from [`list_tables`] or [`CLEARABLE_TABLES`]; it is
/// quoted but not otherwise validated.
pub fn row_count(conn: &Connection, table: &str) -> Result<i64> {
    let quoted = table.replace('"', "\"\"");
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{quoted}\""), [], |row| {
        row.get(0)
    })
}
