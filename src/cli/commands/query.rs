//! Read-only query command.

use crate::cli::commands::{open_session, parse_params, print_table};
use crate::error::{Error, Result};
use rusqlite::params_from_iter;
use std::path::PathBuf;

/// Execute a read-only query and print the rows.
///
/// Write statements are refused here so that every change goes through
/// `jisaku run`, which saves afterwards.
///
/// # Errors
///
/// Returns an error for invalid parameters, write statements, or SQL
/// errors.
pub async fn execute(
    data_dir: Option<&PathBuf>,
    sql: &str,
    raw_params: &[String],
    json: bool,
) -> Result<()> {
    let params = parse_params(raw_params)?;
    let session = open_session(data_dir.map(PathBuf::as_path), None).await?;

    if !session.is_read_only(sql)? {
        return Err(Error::InvalidArgument(
            "statement modifies the database; use `jisaku run` instead".to_string(),
        ));
    }

    let result = session.exec(sql, params_from_iter(params))?;

    if json {
        println!("{}", serde_json::to_string(&result.to_json())?);
    } else {
        print_table(&result);
    }
    Ok(())
}
