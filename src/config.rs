// Runtime configuration from environment variables
//
// VOTE_DB_PATH      - SQLite database file (default: vote-rewards.db)
// CAMPAIGN_URL      - external voting page shown on "begin voting" (required)
// ADMIN_IDS         - comma-separated administrator ids (required)
// BIND_ADDR         - intake server bind address (default: 0.0.0.0:3000)

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub campaign_url: String,
    pub admin_ids: Vec<i64>,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let db_path = env::var("VOTE_DB_PATH")
            .unwrap_or_else(|_| "vote-rewards.db".to_string())
            .into();

        let campaign_url =
            env::var("CAMPAIGN_URL").context("CAMPAIGN_URL environment variable is required")?;

        let admin_ids = env::var("ADMIN_IDS")
            .context("ADMIN_IDS environment variable is required")?
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<i64>()
                    .with_context(|| format!("invalid administrator id '{}'", part))
            })
            .collect::<Result<Vec<_>>>()?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(Config {
            db_path,
            campaign_url,
            admin_ids,
            bind_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test so they
    // never race each other.
    #[test]
    fn test_from_env() {
        env::set_var("CAMPAIGN_URL", "https://example.org/campaign");
        env::set_var("ADMIN_IDS", "100, 200");
        env::remove_var("VOTE_DB_PATH");
        env::remove_var("BIND_ADDR");

        let config = Config::from_env().unwrap();
        assert_eq!(config.campaign_url, "https://example.org/campaign");
        assert_eq!(config.admin_ids, vec![100, 200]);
        assert_eq!(config.db_path, PathBuf::from("vote-rewards.db"));
        assert_eq!(config.bind_addr, "0.0.0.0:3000");

        env::set_var("ADMIN_IDS", "not-a-number");
        assert!(Config::from_env().is_err());

        env::remove_var("ADMIN_IDS");
        assert!(Config::from_env().is_err());
    }
}
