//! Export the database to a file.

use crate::cli::commands::open_session;
use crate::error::Result;
use crate::storage::image_digest;
use chrono::{DateTime, Local};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct ExportOutput {
    path: PathBuf,
    bytes: usize,
    sha256: String,
}

/// Timestamped file name for an export, e.g.
/// `kanji-dictionary-2026-03-09-14-05.db`.
#[must_use]
pub fn export_filename(now: DateTime<Local>) -> String {
    format!("kanji-dictionary-{}.db", now.format("%Y-%m-%d-%H-%M"))
}

/// Execute the export command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the file cannot be
/// written.
pub async fn execute(data_dir: Option<&PathBuf>, output: Option<&PathBuf>, json: bool) -> Result<()> {
    let session = open_session(data_dir.map(PathBuf::as_path), None).await?;
    let image = session.export()?;

    let path = output
        .cloned()
        .unwrap_or_else(|| PathBuf::from(export_filename(Local::now())));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, &image)?;

    let output = ExportOutput {
        path,
        bytes: image.len(),
        sha256: image_digest(&image),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "{} {} ({} bytes)",
            "Exported".green().bold(),
            output.path.display(),
            output.bytes
        );
    }
    Ok(())
}
