//! Kestrel command-line tool
//!
//! Checks, compiles and runs JSON-encoded source units.
//! Set `KESTREL_LOG` (for example `KESTREL_LOG=kestrel_runtime=debug`) to
//! enable tracing on stderr.

use clap::{Parser, Subcommand};
use kestrel_cli::commands::{check, compile, run};
use kestrel_cli::{resolve_color_choice, CompileOptions, OutputFormat, Reporter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kestrel")]
#[command(about = "Kestrel compiler and runtime", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format for diagnostics and summaries
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    /// Color output: auto, always or never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze units and report diagnostics without emitting code
    Check {
        /// JSON-encoded source units
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        options: CompileOptions,
    },

    /// Compile units to class files
    Compile {
        /// JSON-encoded source units
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        options: CompileOptions,
    },

    /// Compile in memory and run a static main method
    Run {
        /// JSON-encoded source units
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Class whose `main` is executed
        #[arg(long = "main", value_name = "CLASS")]
        main_class: String,
        #[command(flatten)]
        options: CompileOptions,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("KESTREL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .compact()
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let mut reporter = Reporter::new(cli.format, resolve_color_choice(cli.color.as_deref()));

    let outcome = match &cli.command {
        Commands::Check { files, options } => {
            check::execute(files, options, &mut reporter).map(|summary| summary.errors == 0)
        }
        Commands::Compile { files, options } => {
            compile::execute(files, options, &mut reporter).map(|report| report.is_success())
        }
        Commands::Run {
            files,
            main_class,
            options,
        } => run::execute(files, main_class, options, &mut reporter, std::io::stdout()),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            let _ = reporter.fatal(&format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}
