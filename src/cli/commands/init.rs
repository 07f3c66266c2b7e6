//! Initialize the jisaku data directory.
//!
//! Creates `<data_dir>/config.json` if it is missing and brings the database
//! up to the latest schema. Running it again on an existing database only
//! applies pending migrations, so it doubles as an explicit upgrade step.

use crate::cli::commands::open_session;
use crate::config::{config_path, is_test_mode, load_settings, require_data_dir, save_settings};
use crate::error::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    data_dir: PathBuf,
    store: String,
    schema_version: u32,
    settings_written: bool,
    test_mode: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the settings cannot be written or the database
/// cannot be opened, migrated or saved.
pub async fn execute(data_dir: Option<&PathBuf>, debounce_ms: Option<u64>, json: bool) -> Result<()> {
    let data_dir = require_data_dir(data_dir.map(PathBuf::as_path))?;

    let settings_written = debounce_ms.is_some() || !config_path(&data_dir).exists();
    if settings_written {
        let mut settings = load_settings(&data_dir)?;
        if let Some(ms) = debounce_ms {
            settings.persist_debounce_ms = ms;
        }
        save_settings(&data_dir, &settings)?;
    }

    let session = open_session(Some(data_dir.as_path()), None).await?;
    let status = session.status()?;

    let output = InitOutput {
        data_dir,
        store: status.store,
        schema_version: status.schema_version,
        settings_written,
        test_mode: is_test_mode(),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "{} database at {}",
        "Initialized".green().bold(),
        output.store
    );
    println!("  Schema version: {}", output.schema_version);
    if output.settings_written {
        println!(
            "  Settings:       {}",
            config_path(&output.data_dir).display()
        );
    }
    if output.test_mode {
        println!("  {}", "(test mode: JISAKU_TEST_DB is set)".dimmed());
    }
    Ok(())
}
