//! # Sitrep Binary
//!
//! CLI entry point. Dispatches to the command functions in `cli.rs` and the
//! server in `api.rs`; logging goes to stderr so stdout stays parseable.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use sitrep::{api, cli};

#[derive(Parser)]
#[command(name = "sitrep", version, about = "Project status aggregation and diagnostics")]
struct Cli {
    /// Project root directory.
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config and create the database.
    Init {
        /// Overwrite an existing config.
        #[arg(long)]
        force: bool,
    },
    /// Collect signals and print the aggregated status report.
    Status {
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Record a fix for a build error.
    Fix {
        /// The raw error message.
        error: String,
        /// What was done to fix it.
        solution: String,
        /// Verify the fix by running the configured build command.
        #[arg(long)]
        verify: bool,
    },
    /// Look up recorded solutions for an error message.
    Solution {
        /// The raw error message.
        error: String,
    },
    /// Append a development note to the context log.
    Note {
        /// The note text.
        text: String,
    },
    /// Record a development-phase transition.
    Phase {
        /// The new phase name.
        name: String,
    },
    /// Print recent context entries.
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Filter by entry kind ('note' or 'phase_change').
        #[arg(long)]
        kind: Option<String>,
    },
    /// Print the most recently seen errors.
    Errors {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:7878")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitrep=info,tower_http=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let root = args.root;

    let result = match args.command {
        Command::Init { force } => cli::cmd_init(&root, force),
        Command::Status { json } => cli::cmd_status(&root, json).await,
        Command::Fix {
            error,
            solution,
            verify,
        } => cli::cmd_fix(&root, &error, &solution, verify).await,
        Command::Solution { error } => cli::cmd_solution(&root, &error),
        Command::Note { text } => cli::cmd_note(&root, &text),
        Command::Phase { name } => cli::cmd_phase(&root, &name),
        Command::Log { limit, kind } => cli::cmd_log(&root, limit, kind.as_deref()),
        Command::Errors { limit } => cli::cmd_errors(&root, limit),
        Command::Serve { addr } => api::serve(&root, &addr).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
