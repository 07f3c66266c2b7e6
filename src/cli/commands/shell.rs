//! Interactive SQL shell.
//!
//! Reads one statement per line from stdin. Read-only statements print their
//! rows; anything else runs as a write and schedules a save. OS signals are
//! fed to the session's lifecycle hooks while the shell runs:
//!
//! - `SIGUSR1` saves in the background (as when the app is hidden)
//! - `SIGHUP` saves synchronously
//! - `SIGINT` / `SIGTERM` save synchronously and exit

use crate::cli::commands::{open_session, print_table, soften_persist};
use crate::error::Result;
use crate::lifecycle::{LifecycleEvents, LifecycleSignal, pump_os_signals};
use crate::session::{DatabaseSession, SessionOptions};
use crate::store::MemoryBlobStore;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "\
.help             show this help
.tables           list tables with row counts
.status           schema version and save state
.persist          save now
.hide             simulate the app being hidden
.quit             save and exit";

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Execute the shell command.
///
/// # Errors
///
/// Returns an error if the session cannot be opened or stdin fails.
pub async fn execute(data_dir: Option<&PathBuf>, ephemeral: bool, json: bool) -> Result<()> {
    let events = Arc::new(LifecycleEvents::new());

    let session = if ephemeral {
        let session = DatabaseSession::new(
            Arc::new(MemoryBlobStore::new()),
            SessionOptions::default().with_lifecycle(events.clone()),
        );
        session.initialize().await?;
        session
    } else {
        open_session(data_dir.map(PathBuf::as_path), Some(events.clone())).await?
    };

    let mut signals = tokio::spawn(pump_os_signals(Arc::clone(&events)));
    let mut signals_live = true;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if !json {
        println!(
            "jisaku shell on {} (.help for commands)",
            session.persister().store().describe()
        );
    }

    loop {
        if !json {
            print!("{}", "jisaku> ".cyan());
            let _ = std::io::stdout().flush();
        }

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if handle_line(&session, &events, line.trim(), json).await == Flow::Quit {
                    break;
                }
            }
            joined = &mut signals, if signals_live => {
                match joined {
                    Ok(Ok(signal)) => return exit_on_signal(&session, signal, json).await,
                    Ok(Err(e)) => warn!(error = %e, "Signal handlers unavailable"),
                    Err(e) => warn!(error = %e, "Signal task ended"),
                }
                signals_live = false;
            }
        }
    }

    signals.abort();
    soften_persist(session.flush().await, json)?;
    Ok(())
}

/// Leave after a terminating signal.
///
/// The dispatch already wrote the image synchronously. A cycle that was
/// running at that moment still writes its older image, so wait for the
/// trailing cycle queued behind it before the runtime goes away.
async fn exit_on_signal(session: &DatabaseSession, signal: LifecycleSignal, json: bool) -> Result<()> {
    info!(%signal, "Exiting on signal");
    soften_persist(session.flush().await, json)?;
    Ok(())
}

async fn handle_line(
    session: &DatabaseSession,
    events: &LifecycleEvents,
    line: &str,
    json: bool,
) -> Flow {
    if line.is_empty() {
        return Flow::Continue;
    }

    match line {
        ".quit" | ".exit" => return Flow::Quit,
        ".help" => println!("{HELP}"),
        ".tables" => match session.status() {
            Ok(status) => {
                for table in status.tables {
                    println!("{:<32} {}", table.table, table.rows);
                }
            }
            Err(e) => report(&e.to_string(), json),
        },
        ".status" => match session.status() {
            Ok(status) => println!(
                "schema v{} (latest v{}), save {:?}",
                status.schema_version, status.latest_version, status.persist
            ),
            Err(e) => report(&e.to_string(), json),
        },
        ".persist" => {
            if let Err(e) = soften_persist(session.persist().await, json) {
                report(&e.to_string(), json);
            }
        }
        ".hide" => events.dispatch(LifecycleSignal::VisibilityHidden),
        sql if sql.starts_with('.') => report(&format!("unknown command: {sql}"), json),
        sql => run_sql(session, sql, json),
    }
    Flow::Continue
}

fn run_sql(session: &DatabaseSession, sql: &str, json: bool) {
    let outcome = session.is_read_only(sql).and_then(|read_only| {
        if read_only {
            let result = session.exec(sql, [])?;
            if json {
                println!("{}", result.to_json());
            } else {
                print_table(&result);
            }
        } else {
            let changed = session.run(sql, [])?;
            if json {
                println!("{}", serde_json::json!({ "changed": changed }));
            } else {
                println!("{}", format!("({changed} changed)").dimmed());
            }
        }
        Ok(())
    });

    if let Err(e) = outcome {
        report(&e.to_string(), json);
    }
}

fn report(message: &str, json: bool) {
    if json {
        eprintln!("{}", serde_json::json!({ "error": { "message": message } }));
    } else {
        eprintln!("{} {message}", "Error:".red());
    }
}
