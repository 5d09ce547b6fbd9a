//! # Activity Timeline CLI (`timeline`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `timeline init` | Create the SQLite database and schema |
//! | `timeline run` | Scan, extract, store, and optionally correlate and export |
//! | `timeline correlate` | Recompute file/milestone correlations |
//! | `timeline export` | Write the unified timeline JSON |
//! | `timeline threads` | Group emails into threads and export them |
//! | `timeline stats` | Print store counts |
//!
//! ## Examples
//!
//! ```bash
//! timeline run --scan-dir ./project --email-dir ./mail --correlate --output timeline.json
//! timeline --config ./timeline.toml export --output timeline.json
//! timeline threads --email-dir ./mail --output threads.json
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use activity_timeline::pipeline::{self, RunOptions};
use activity_timeline::{config, logging, migrate, stats};

/// Unified activity timeline: file-system snapshots plus milestones mined
/// from project communication.
#[derive(Parser)]
#[command(name = "timeline", version, about)]
struct Cli {
    /// Path to a configuration file (TOML). Built-in defaults are used
    /// when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file. Overrides `[db].path`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Safe to run repeatedly.
    Init,

    /// Run the batch: scan, extract, store.
    ///
    /// With no input directory there is nothing to do and the command
    /// exits successfully.
    Run {
        /// Project directory to snapshot.
        #[arg(long)]
        scan_dir: Option<PathBuf>,

        /// Directory of `.eml`, `.msg` and `.txt` messages.
        #[arg(long)]
        email_dir: Option<PathBuf>,

        /// Directory of `.txt`, `.md`, `.rst`, `.docx` and `.pdf` documents.
        #[arg(long)]
        docs_dir: Option<PathBuf>,

        /// Write the unified timeline JSON here after storing.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Recompute correlations after storing.
        #[arg(long)]
        correlate: bool,

        /// Recommendation phrase file, one phrase per line.
        #[arg(long)]
        recommendations: Option<PathBuf>,
    },

    /// Recompute correlations between file scans and milestones.
    Correlate,

    /// Write the unified timeline JSON (stdout when no output is given).
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Group emails into communication threads, store and export them.
    Threads {
        #[arg(long)]
        email_dir: PathBuf,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show event, correlation and thread counts.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut cfg = config::load_or_default(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        cfg.db.path = db;
    }

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Run {
            scan_dir,
            email_dir,
            docs_dir,
            output,
            correlate,
            recommendations,
        } => {
            let options = RunOptions {
                scan_dir,
                email_dir,
                docs_dir,
                output,
                correlate,
                recommendations,
            };
            pipeline::run(&cfg, &options).await?;
        }
        Commands::Correlate => {
            pipeline::correlate(&cfg).await?;
        }
        Commands::Export { output } => {
            pipeline::export(&cfg, output.as_deref()).await?;
        }
        Commands::Threads { email_dir, output } => {
            pipeline::threads(&cfg, &email_dir, output.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
