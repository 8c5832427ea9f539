//! # Sociograph CLI (`sgr`)
//!
//! Single executable driving the follow-graph pipeline. All commands accept
//! a `--config` flag pointing to a TOML configuration file.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sgr init` | Create the SQLite database and seed the interest taxonomy |
//! | `sgr enroll <handle>` | Queue profile/followers/following jobs for a target |
//! | `sgr scheduled [seeds…]` | Run the quota-governed dispatch loop |
//! | `sgr manual <handle>` | Crawl one target end to end immediately |
//! | `sgr analysis` | Run the periodic interest-classification loop |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sociograph::{config, pipeline};

/// Sociograph — a rate-limited social follow-graph ingestion and
/// interest-classification pipeline.
#[derive(Parser)]
#[command(
    name = "sgr",
    about = "Sociograph — follow-graph crawling, mutual derivation, and interest classification",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sociograph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and seed the interest taxonomy.
    ///
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Enroll a target account for crawling.
    ///
    /// Creates one pending job per type (profile, followers, following)
    /// unless the target already has jobs inside the dedup window.
    Enroll {
        /// Target account handle.
        handle: String,
    },

    /// Run the scheduled pipeline: enroll any seed targets, then dispatch
    /// pending jobs on a fixed tick under the daily quota.
    Scheduled {
        /// Seed targets to enroll before the loop starts.
        seeds: Vec<String>,
    },

    /// Crawl one target end to end right now: profile, followers,
    /// following, mutuals, interest classification.
    Manual {
        /// Target account handle.
        handle: String,
    },

    /// Run the interest-analysis loop over accounts with completed
    /// following crawls and no scores yet.
    Analysis,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            pipeline::setup(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Enroll { handle } => {
            if pipeline::enroll(&cfg, &handle).await? {
                println!("enrolled {handle}: 3 jobs queued");
            } else {
                println!("{handle} already has recent jobs, nothing queued");
            }
        }
        Commands::Scheduled { seeds } => {
            pipeline::run_scheduled(&cfg, &seeds).await?;
        }
        Commands::Manual { handle } => {
            if pipeline::run_manual(&cfg, &handle).await? {
                println!("manual crawl of {handle} completed");
            } else {
                println!("manual crawl of {handle} failed, see logs");
            }
        }
        Commands::Analysis => {
            pipeline::run_analysis(&cfg).await?;
        }
    }

    Ok(())
}
