//! finance-gate
//!
//! Front proxy for the finance REST API.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                     FINANCE GATE                     │
//!                 │                                                      │
//!   Client ──────▶│  trace/request-id ─▶ rate limit ─▶ sanitize ─▶ proxy │──────▶ Finance API
//!                 │                          │                           │
//!   429 ◀─────────│──────────────────────────┘                           │
//!                 │                                                      │
//!                 │  config (+ watcher)   sweeper   metrics   shutdown   │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use finance_gate::lifecycle::startup;
use finance_gate::observability::logging;

#[derive(Parser)]
#[command(name = "finance-gate")]
#[command(
    about = "Rate limiting and sanitizing front proxy for the finance API",
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file. Watched for rate limit changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = startup::load(cli.config.as_deref())?;

    if cli.check {
        println!("Configuration OK");
        return Ok(());
    }

    logging::init(&config.observability)?;

    startup::run(config, cli.config).await
}
