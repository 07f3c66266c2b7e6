//! Write statement command.

use crate::cli::commands::{open_session, parse_params, soften_persist};
use crate::error::{Error, Result};
use colored::Colorize;
use rusqlite::params_from_iter;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct RunOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    changed: Option<usize>,
    persisted: bool,
}

/// Execute a write statement, then wait for the save.
///
/// # Errors
///
/// Returns an error for invalid parameters or a failing statement. A failed
/// save is reported as a warning only.
pub async fn execute(
    data_dir: Option<&PathBuf>,
    sql: &str,
    raw_params: &[String],
    batch: bool,
    json: bool,
) -> Result<()> {
    if batch && !raw_params.is_empty() {
        return Err(Error::InvalidArgument(
            "--param cannot be combined with --batch".to_string(),
        ));
    }
    let params = parse_params(raw_params)?;
    let session = open_session(data_dir.map(PathBuf::as_path), None).await?;

    let changed = if batch {
        session.run_batch(sql)?;
        None
    } else {
        Some(session.run(sql, params_from_iter(params))?)
    };

    let persisted = soften_persist(session.flush().await, json)?;
    let output = RunOutput { changed, persisted };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    match output.changed {
        Some(n) => println!("{} {n} row{}", "Changed".green(), if n == 1 { "" } else { "s" }),
        None => println!("{}", "Batch applied".green()),
    }
    Ok(())
}
