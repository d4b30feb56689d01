use clap::{Parser, Subcommand};
use fsbench_server::{
    config::{ConfigErrors, ServerConfig},
    database::{ConnectionError, SharedConnection, ID},
    submit::{ingest_archive, reprocess, SubmitError},
    web,
};
use std::{fs::File, io::BufReader, path::PathBuf, process::ExitCode, sync::Arc};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Collects fio benchmark runs and serves their charts
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// YAML config file, defaults are used without one
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the web frontend (default)
    Serve,
    /// Create the database schema and storage directories
    Init,
    /// Ingest a benchmark archive from disk and print the new group id
    Ingest { archive: PathBuf },
    /// Render the charts of a stored benchmark again
    Reprocess { benchmark: ID },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error("Database error: {0}")]
    Database(#[from] ConnectionError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = ?error, "{error}");

            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = ServerConfig::load(cli.config.as_deref())?;

    if config.preflight_checks() {
        return Err(ConfigErrors::PreflightFailed.into());
    }

    let connection = SharedConnection::load(&config.database)?;
    connection.init()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(web::serve(Arc::new(config), connection.clone()))?;
        }
        Command::Init => info!(path = ?config.database.path, "Database is ready"),
        Command::Ingest { archive } => {
            let reader = BufReader::new(File::open(&archive)?);
            let group = ingest_archive(&connection, &config.storage, reader)?;

            println!("{group}");
        }
        Command::Reprocess { benchmark } => {
            let charts = reprocess(&connection, &config.storage, benchmark)?;
            info!(benchmark = benchmark, "Rendered {} charts", charts.len());
        }
    }

    connection.close()?;

    Ok(())
}
