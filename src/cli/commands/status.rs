//! Status command implementation.

use crate::cli::commands::open_session;
use crate::error::Result;
use crate::session::SessionStatus;
use crate::storage::image_digest;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    #[serde(flatten)]
    session: SessionStatus,
    image_bytes: usize,
    image_sha256: String,
}

/// Execute status command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or exported.
pub async fn execute(data_dir: Option<&PathBuf>, json: bool) -> Result<()> {
    let session = open_session(data_dir.map(PathBuf::as_path), None).await?;
    let image = session.export()?;

    let output = StatusOutput {
        session: session.status()?,
        image_bytes: image.len(),
        image_sha256: image_digest(&image),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let status = &output.session;
    println!("jisaku Status");
    println!("=============");
    println!();
    println!("Store:   {}", status.store);

    let schema = format!("v{} (latest v{})", status.schema_version, status.latest_version);
    if status.schema_version > status.latest_version {
        println!("Schema:  {} {}", schema.yellow(), "newer than this build".yellow());
    } else if status.pending_migrations.is_empty() {
        println!("Schema:  {}", schema.green());
    } else {
        println!(
            "Schema:  {} ({} pending)",
            schema.yellow(),
            status.pending_migrations.len()
        );
    }

    let digest = output.image_sha256.get(..12).unwrap_or(&output.image_sha256);
    println!("Image:   {} bytes, sha256 {digest}", output.image_bytes);
    println!();

    let width = status
        .tables
        .iter()
        .map(|t| t.table.len())
        .max()
        .unwrap_or(0);
    println!("{}", "Tables".bold());
    for table in &status.tables {
        let line = format!("  {:<width$}  {:>6}", table.table, table.rows);
        if table.rows == 0 {
            println!("{}", line.dimmed());
        } else {
            println!("{line}");
        }
    }

    Ok(())
}
