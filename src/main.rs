//! jisaku CLI entry point.

use clap::Parser;
use jisaku::cli::commands;
use jisaku::cli::{Cli, Commands, OutputFormat};
use jisaku::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR --format json OR non-TTY stdout,
    // except for the shell, which stays interactive behind a pipe.
    let interactive = matches!(cli.command, Commands::Shell { .. });
    let json = cli.json
        || cli.format == OutputFormat::Json
        || (!interactive && !std::io::IsTerminal::is_terminal(&std::io::stdout()));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => return report(&Error::Io(e), json, cli.quiet),
    };

    match runtime.block_on(run(&cli, json)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e, json, cli.quiet),
    }
}

fn report(e: &Error, json: bool, quiet: bool) -> ExitCode {
    if json {
        eprintln!("{}", e.to_structured_json());
    } else if !quiet {
        if let Some(hint) = e.hint() {
            eprintln!("Error: {e}\n  Hint: {hint}");
        } else {
            eprintln!("Error: {e}");
        }
    }
    ExitCode::from(e.exit_code())
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

async fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let data_dir = cli.data_dir.as_ref();

    match &cli.command {
        Commands::Init { debounce_ms } => commands::init::execute(data_dir, *debounce_ms, json).await,
        Commands::Version => commands::version::execute(json),
        Commands::Status => commands::status::execute(data_dir, json).await,

        // SQL
        Commands::Query { sql, params } => {
            commands::query::execute(data_dir, sql, params, json).await
        }
        Commands::Run { sql, params, batch } => {
            commands::run::execute(data_dir, sql, params, *batch, json).await
        }

        // Data management
        Commands::Export { output } => {
            commands::export::execute(data_dir, output.as_ref(), json).await
        }
        Commands::Import { file } => commands::import::execute(data_dir, file, json).await,
        Commands::Clear { yes } => commands::clear::execute(data_dir, *yes, json).await,

        Commands::Shell { ephemeral } => commands::shell::execute(data_dir, *ephemeral, json).await,

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
