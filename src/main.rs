mod commands;
mod watch;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use docreuse::{Config, Error, Mode, diagnostics};
use tracing_subscriber::EnvFilter;

use crate::commands::OutputFormat;

#[derive(Parser)]
#[command(
    name = "docreuse",
    version,
    about = "Suggest entity and attribute reuse in DocBook XML and AsciiDoc sources"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every resolved entity or attribute visible from a document
    Definitions {
        /// The DocBook or AsciiDoc document
        document: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Override the mode inferred from the file extension
        #[arg(long, value_enum)]
        mode: Option<Mode>,
    },
    /// Rewrite a document, replacing each suggestion with its first candidate
    Fix {
        /// The DocBook or AsciiDoc document
        document: PathBuf,
        /// Override the mode inferred from the file extension
        #[arg(long, value_enum)]
        mode: Option<Mode>,
    },
    /// Report literal text that an existing entity or attribute already defines (exit 0/1/2)
    Scan {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Override the mode inferred from each file extension
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        /// Documents or directories to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Scan a document, then rescan whenever it or a definition file changes
    Watch {
        /// The DocBook or AsciiDoc document
        document: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Override the mode inferred from the file extension
        #[arg(long, value_enum)]
        mode: Option<Mode>,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = Config::load(Path::new(".")).and_then(|config| return run(cli.command, config));
    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(2)
        },
    };
}

/// Log to stderr, filtered by `RUST_LOG` and defaulting to warnings.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Dispatch one subcommand.
///
/// # Errors
///
/// Returns whatever error the subcommand surfaces.
fn run(command: Commands, config: Config) -> Result<ExitCode, Error> {
    return match command {
        Commands::Definitions { document, format, mode } => {
            commands::definitions(&document, mode, format, config).map(|()| return ExitCode::SUCCESS)
        },
        Commands::Fix { document, mode } => commands::fix(&document, mode, config).map(|()| return ExitCode::SUCCESS),
        Commands::Scan { format, mode, paths } => commands::scan(&paths, mode, format, config),
        Commands::Watch { document, format, mode } => watch::run(&document, mode, format, config),
    };
}
