//! Delete all application data.

use crate::cli::commands::{open_session, soften_persist};
use crate::error::{Error, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ClearOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    rows_deleted: Option<usize>,
    persisted: bool,
}

/// Execute the clear command.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] without `--yes`, or the database error
/// if the delete fails.
pub async fn execute(data_dir: Option<&PathBuf>, yes: bool, json: bool) -> Result<()> {
    if !yes {
        return Err(Error::InvalidArgument(
            "this deletes every kanji, component and vocabulary entry; pass --yes to confirm"
                .to_string(),
        ));
    }

    let session = open_session(data_dir.map(PathBuf::as_path), None).await?;

    let (rows_deleted, persisted) = match session.clear_all().await {
        Ok(rows) => (Some(rows), true),
        Err(e @ Error::Persist(_)) => (None, soften_persist(Err(e), json)?),
        Err(e) => return Err(e),
    };

    let output = ClearOutput {
        rows_deleted,
        persisted,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else if let Some(rows) = output.rows_deleted {
        println!("{} {rows} rows deleted", "Cleared".green().bold());
    } else {
        println!("{}", "Cleared".green().bold());
    }
    Ok(())
}
