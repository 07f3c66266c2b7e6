//! Version command implementation.

use crate::error::Result;
use crate::storage::LATEST_SCHEMA_VERSION;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    schema_version: u32,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };

    if json {
        let output = VersionOutput {
            version,
            build,
            schema_version: LATEST_SCHEMA_VERSION,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
        return Ok(());
    }

    println!("jisaku version {version} ({build}, schema v{LATEST_SCHEMA_VERSION})");
    Ok(())
}
