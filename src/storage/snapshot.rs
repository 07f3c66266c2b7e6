//! Database image codec.
//!
//! The persisted form of the database is the plain SQLite file image. These
//! functions move a connection between that byte form and a live in-memory
//! handle using SQLite's online backup API, staging through a temporary file.

use crate::error::{Error, Result};
use crate::storage::schema::list_tables;
use rusqlite::backup::Progress;
use rusqlite::{Connection, DatabaseName};
use std::fs;

/// Magic string every SQLite database file starts with.
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Table that must exist for an image to count as a kanji database.
const REQUIRED_TABLE: &str = "kanjis";

/// Create a fresh, empty in-memory database.
///
/// # Errors
///
/// Returns an error if SQLite cannot allocate the connection.
pub fn open_empty() -> Result<Connection> {
    Ok(Connection::open_in_memory()?)
}

/// Reconstruct an in-memory database from a persisted image.
///
/// # Errors
///
/// Returns [`Error::InvalidImage`] if the bytes are not a readable SQLite
/// database, or an I/O error if the staging file cannot be written.
pub fn open_image(bytes: &[u8]) -> Result<Connection> {
    if !has_sqlite_header(bytes) {
        return Err(Error::InvalidImage(format!(
            "missing SQLite header ({} bytes)",
            bytes.len()
        )));
    }

    let staging = tempfile::NamedTempFile::new()?;
    fs::write(staging.path(), bytes)?;

    let mut conn = Connection::open_in_memory()?;
    conn.restore(DatabaseName::Main, staging.path(), None::<fn(Progress)>)
        .map_err(|e| Error::InvalidImage(e.to_string()))?;

    // Force the schema to be parsed so a damaged image fails here rather
    // than on the first query.
    conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
        .map_err(|e| Error::InvalidImage(e.to_string()))?;

    Ok(conn)
}

/// Serialize the connection's main database to its file image.
///
/// # Errors
///
/// Returns an error if the backup or the staging file read fails.
pub fn export_image(conn: &Connection) -> Result<Vec<u8>> {
    let staging = tempfile::NamedTempFile::new()?;
    conn.backup(DatabaseName::Main, staging.path(), None)?;
    Ok(fs::read(staging.path())?)
}

/// Whether the bytes start with the SQLite file header.
#[must_use]
pub fn has_sqlite_header(bytes: &[u8]) -> bool {
    bytes.len() >= SQLITE_HEADER.len() && &bytes[..SQLITE_HEADER.len()] == SQLITE_HEADER
}

/// Check that an image is a readable kanji database before importing it.
///
/// This is the import-side gate: the image must decode, pass SQLite's
/// `quick_check`, and contain the `kanjis` table. Schema version is not
/// checked here; migrations take care of older images.
///
/// # Errors
///
/// Returns [`Error::InvalidImage`] describing the first failed check.
pub fn validate_image(bytes: &[u8]) -> Result<()> {
    let conn = open_image(bytes)?;

    let check: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| Error::InvalidImage(e.to_string()))?;
    if check != "ok" {
        return Err(Error::InvalidImage(format!("integrity check failed: {check}")));
    }

    let tables = list_tables(&conn)?;
    if !tables.iter().any(|t| t == REQUIRED_TABLE) {
        return Err(Error::InvalidImage(format!(
            "no `{REQUIRED_TABLE}` table found"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_then_open_preserves_rows_and_version() {
        let conn = open_empty().unwrap();
        conn.execute_batch(
            "CREATE TABLE kanjis (id INTEGER PRIMARY KEY, character TEXT);
             INSERT INTO kanjis (character) VALUES ('水');
             PRAGMA user_version = 4;",
        )
        .unwrap();

        let bytes = export_image(&conn).unwrap();
        assert!(has_sqlite_header(&bytes));

        let restored = open_image(&bytes).unwrap();
        let character: String = restored
            .query_row("SELECT character FROM kanjis", [], |row| row.get(0))
            .unwrap();
        let version: u32 = restored
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(character, "水");
        assert_eq!(version, 4);
    }

    #[test]
    fn test_open_image_rejects_garbage() {
        let err = open_image(b"definitely not a database").unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));

        let err = open_image(&[]).unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn test_open_image_rejects_header_only_garbage() {
        let mut bytes = SQLITE_HEADER.to_vec();
        bytes.extend(std::iter::repeat_n(0xAB_u8, 4096));
        assert!(open_image(&bytes).is_err());
    }

    #[test]
    fn test_validate_image_requires_kanji_table() {
        let conn = open_empty().unwrap();
        conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY);")
            .unwrap();
        let err = validate_image(&export_image(&conn).unwrap()).unwrap_err();
        assert!(err.to_string().contains("kanjis"));

        conn.execute_batch("CREATE TABLE kanjis (id INTEGER PRIMARY KEY);")
            .unwrap();
        validate_image(&export_image(&conn).unwrap()).unwrap();
    }
}
