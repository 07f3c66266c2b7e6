//! Command implementations.

pub mod clear;
pub mod completions;
pub mod export;
pub mod import;
pub mod init;
pub mod query;
pub mod run;
pub mod shell;
pub mod status;
pub mod version;

use crate::config::{load_settings, require_data_dir};
use crate::error::{Error, Result};
use crate::lifecycle::LifecycleTarget;
use crate::session::{DatabaseSession, QueryResult, SessionOptions};
use crate::store::{BlobStore, FileBlobStore, NAMESPACE, STORE_NAME};
use colored::Colorize;
use rusqlite::types::Value;
use std::path::Path;
use std::sync::Arc;

/// Open the on-disk store under the resolved data directory and bring a
/// session up on it.
///
/// # Errors
///
/// Configuration, store and initialization errors.
pub async fn open_session(
    data_dir: Option<&Path>,
    lifecycle: Option<Arc<dyn LifecycleTarget>>,
) -> Result<DatabaseSession> {
    let data_dir = require_data_dir(data_dir)?;
    let settings = load_settings(&data_dir)?;
    let store: Arc<dyn BlobStore> = Arc::new(FileBlobStore::open(&data_dir, NAMESPACE, STORE_NAME)?);

    let mut options = SessionOptions::default().with_debounce(settings.persist_debounce());
    if let Some(target) = lifecycle {
        options = options.with_lifecycle(target);
    }

    let session = DatabaseSession::new(store, options);
    session.initialize().await?;
    Ok(session)
}

/// Turn a failed save into a warning.
///
/// A persist failure leaves the in-memory change in place, so the command
/// still succeeds. Returns whether the save went through.
///
/// # Errors
///
/// Any error other than [`Error::Persist`] is passed through.
pub fn soften_persist(outcome: Result<()>, json: bool) -> Result<bool> {
    match outcome {
        Ok(()) => Ok(true),
        Err(e @ Error::Persist(_)) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else {
                eprintln!("{} {e}", "Warning:".yellow().bold());
                if let Some(hint) = e.hint() {
                    eprintln!("  Hint: {hint}");
                }
            }
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Parse `--param` values.
///
/// Each value is read as a JSON scalar: `null`, booleans (stored as 0/1),
/// integers, floats and quoted strings. Anything that is not valid JSON is
/// taken as literal text, so `-p 日` works without quoting.
///
/// # Errors
///
/// [`Error::InvalidArgument`] for JSON arrays and objects.
pub fn parse_params(raw: &[String]) -> Result<Vec<Value>> {
    raw.iter().map(String::as_str).map(parse_param).collect()
}

fn parse_param(raw: &str) -> Result<Value> {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Ok(Value::Text(raw.to_string()));
    };

    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Integer(i64::from(b))),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Real))
            .ok_or_else(|| Error::InvalidArgument(format!("unsupported number: {n}"))),
        serde_json::Value::String(s) => Ok(Value::Text(s)),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(Error::InvalidArgument(
            format!("parameter must be a scalar: {raw}"),
        )),
    }
}

/// Display form of a value in table output.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}

/// Print a query result as an aligned table.
pub fn print_table(result: &QueryResult) {
    if result.columns.is_empty() {
        return;
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(display_value).collect())
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .map(|row| row.get(i).map_or(0, |c| c.chars().count()))
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| pad(c, *w))
        .collect();
    println!("{}", header.join("  ").bold());

    for row in &cells {
        let line: Vec<String> = row.iter().zip(&widths).map(|(c, w)| pad(c, *w)).collect();
        println!("{}", line.join("  ").trim_end());
    }

    let count = result.rows.len();
    println!(
        "{}",
        format!("({count} row{})", if count == 1 { "" } else { "s" }).dimmed()
    );
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{text}{}", " ".repeat(width.saturating_sub(len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let raw: Vec<String> = ["1", "2.5", "null", "true", "\"N5\"", "日"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            parse_params(&raw).unwrap(),
            vec![
                Value::Integer(1),
                Value::Real(2.5),
                Value::Null,
                Value::Integer(1),
                Value::Text("N5".into()),
                Value::Text("日".into()),
            ]
        );
    }

    #[test]
    fn test_parse_params_rejects_compound_values() {
        let err = parse_params(&["[1, 2]".to_string()]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_soften_persist() {
        assert!(soften_persist(Ok(()), true).unwrap());
        assert!(!soften_persist(Err(Error::Persist("disk full".into())), true).unwrap());
        assert!(soften_persist(Err(Error::NotInitialized), true).is_err());
    }

    #[test]
    fn test_pad_counts_characters_not_bytes() {
        assert_eq!(pad("字", 3), "字  ");
        assert_eq!(display_value(&Value::Blob(vec![0; 4])), "<blob 4 bytes>");
    }
}
