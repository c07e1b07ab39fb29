use anyhow::Result;
use std::env;

use vote_rewards::{Config, Store};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("init") => run_init(),
        Some("status") => run_status(),
        _ => {
            eprintln!("Usage: vote-rewards <init|status>");
            eprintln!();
            eprintln!("  init    create the database and schema");
            eprintln!("  status  show account and queue counts");
            eprintln!();
            eprintln!("Run the intake server with: cargo run --bin vote-rewards-server --features server");
            Ok(())
        }
    }
}

fn run_init() -> Result<()> {
    let config = Config::from_env()?;
    let _store = Store::open(&config.db_path)?;
    tracing::info!("database initialized at {}", config.db_path.display());
    Ok(())
}

fn run_status() -> Result<()> {
    let config = Config::from_env()?;
    let store = Store::open(&config.db_path)?;
    let counts = store.counts()?;

    println!("Database: {}", config.db_path.display());
    println!("Accounts:            {}", counts.accounts);
    println!("Pending votes:       {}", counts.pending_votes);
    println!("Pending withdrawals: {}", counts.pending_withdrawals);
    Ok(())
}
