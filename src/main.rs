use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sigil::diagnostics::{render_diagnostic, CheckError};
use sigil::server::run_master;
use sigil::server::worker::{run_worker, WorkerRole};
use sigil::sigilfile::SigilConfig;

#[derive(Parser)]
#[command(name = "sigil", version, about = "Signature-driven type checker for dynamic object-oriented code")]
struct Cli {
    /// Path to the project Sigilfile
    #[arg(long, global = true)]
    sigilfile: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check signature and code files and print diagnostics
    Check {
        /// Specific files to check (defaults to the whole project)
        paths: Vec<PathBuf>,
    },
    /// Start the LSP master (communicates over stdin/stdout)
    Langserver,
    /// Run a single worker process; spawned by the master, not by hand
    Worker {
        /// Serve hover/completion/navigation queries
        #[arg(long)]
        interaction: bool,
        /// Validate the signature environment
        #[arg(long)]
        signature: bool,
        /// Batch-check assigned files
        #[arg(long)]
        typecheck: bool,
        /// This worker's slot among the check workers
        #[arg(long, default_value_t = 0)]
        index: usize,
        /// Total number of check workers
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            2
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32, CheckError> {
    let config = SigilConfig::load(cli.sigilfile.as_deref())?;
    match cli.command {
        Commands::Check { paths } => {
            let results = sigil::check_project(&config, &paths)?;
            let mut reported = false;
            for (path, source, diagnostics) in &results {
                for diagnostic in diagnostics {
                    reported = true;
                    render_diagnostic(source, path, diagnostic);
                }
            }
            Ok(if reported { 1 } else { 0 })
        }
        Commands::Langserver => run_master(&config),
        Commands::Worker { interaction, signature, typecheck, index, count } => {
            let role = if interaction {
                WorkerRole::Interaction
            } else if signature {
                WorkerRole::Signature
            } else if typecheck {
                WorkerRole::Check { index, count }
            } else {
                return Err(CheckError::protocol(
                    "worker requires --interaction, --signature or --typecheck",
                ));
            };
            run_worker(role, config)?;
            Ok(0)
        }
    }
}
