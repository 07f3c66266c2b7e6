//! Import a database file, replacing the current one.

use crate::cli::commands::{open_session, soften_persist};
use crate::error::{Error, Result};
use crate::storage::{MigrationReport, validate_image};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions accepted for import.
pub const IMPORT_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

#[derive(Serialize)]
struct ImportOutput {
    path: PathBuf,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    migration: Option<MigrationReport>,
    persisted: bool,
}

/// Check the file extension before reading anything.
///
/// # Errors
///
/// [`Error::InvalidImage`] if the extension is not one of
/// [`IMPORT_EXTENSIONS`].
pub fn check_extension(path: &Path) -> Result<()> {
    let ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMPORT_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)));

    if ok {
        Ok(())
    } else {
        Err(Error::InvalidImage(format!(
            "{} does not end in .db, .sqlite or .sqlite3",
            path.display()
        )))
    }
}

/// Execute the import command.
///
/// The current database stays in place unless the file is a readable
/// SQLite database with a `kanjis` table that migrates cleanly.
///
/// # Errors
///
/// Returns an error for unreadable or invalid files and failed migrations.
/// A failed save after a successful swap is reported as a warning.
pub async fn execute(data_dir: Option<&PathBuf>, file: &Path, json: bool) -> Result<()> {
    check_extension(file)?;
    let bytes = fs::read(file)?;
    validate_image(&bytes)?;

    let session = open_session(data_dir.map(PathBuf::as_path), None).await?;

    let (migration, persisted) = match session.replace_database(&bytes).await {
        Ok(report) => (Some(report), true),
        Err(e @ Error::Persist(_)) => (None, soften_persist(Err(e), json)?),
        Err(e) => return Err(e),
    };

    let output = ImportOutput {
        path: file.to_path_buf(),
        bytes: bytes.len(),
        migration,
        persisted,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "{} {} ({} bytes)",
        "Imported".green().bold(),
        output.path.display(),
        output.bytes
    );
    if let Some(report) = output.migration.filter(|r| r.applied > 0) {
        println!(
            "  Migrated schema v{} -> v{} ({} steps)",
            report.from, report.to, report.applied
        );
    }
    Ok(())
}
