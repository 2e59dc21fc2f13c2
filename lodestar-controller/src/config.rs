//! Controller configuration
//!
//! Every setting comes from a `LODESTAR_*` environment variable with a
//! sensible default, except the credential key which must always be provided.

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address
    pub http_addr: String,

    /// SQLite connection string
    pub database_url: String,

    /// Nomad API address (e.g., "http://127.0.0.1:4646")
    pub nomad_addr: String,

    /// ACL token sent with every Nomad request
    pub nomad_token: Option<String>,

    pub nomad_region: Option<String>,

    pub nomad_namespace: Option<String>,

    /// Directory holding one working copy per repository
    pub repo_base_dir: PathBuf,

    /// Time between reconciliation cycles
    pub poll_interval: Duration,

    /// Dry-run changed jobs and skip registrations that would change nothing
    pub plan_before_apply: bool,

    /// Hex encoded 32-byte key used to encrypt stored credentials
    pub credential_key: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - LODESTAR_CREDENTIAL_KEY (required, 64 hex characters)
    /// - LODESTAR_HTTP_ADDR (optional, default: 0.0.0.0:8080)
    /// - LODESTAR_DATABASE_URL (optional, default: sqlite://data/lodestar.sqlite?mode=rwc)
    /// - LODESTAR_NOMAD_ADDR (optional, default: http://127.0.0.1:4646)
    /// - LODESTAR_NOMAD_TOKEN / LODESTAR_NOMAD_REGION / LODESTAR_NOMAD_NAMESPACE (optional)
    /// - LODESTAR_REPO_BASE_DIR (optional, default: data/repos)
    /// - LODESTAR_POLL_INTERVAL (optional, seconds, default: 30)
    /// - LODESTAR_PLAN_BEFORE_APPLY (optional, default: false)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let credential_key = std::env::var("LODESTAR_CREDENTIAL_KEY")
            .context("LODESTAR_CREDENTIAL_KEY environment variable not set")?;

        let poll_interval = match std::env::var("LODESTAR_POLL_INTERVAL") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("invalid LODESTAR_POLL_INTERVAL: {}", raw))?,
            Err(_) => defaults.poll_interval,
        };

        let plan_before_apply = std::env::var("LODESTAR_PLAN_BEFORE_APPLY")
            .map(|raw| parse_bool(&raw))
            .unwrap_or(defaults.plan_before_apply);

        Ok(Self {
            http_addr: env_or("LODESTAR_HTTP_ADDR", defaults.http_addr),
            database_url: env_or("LODESTAR_DATABASE_URL", defaults.database_url),
            nomad_addr: env_or("LODESTAR_NOMAD_ADDR", defaults.nomad_addr),
            nomad_token: env_opt("LODESTAR_NOMAD_TOKEN"),
            nomad_region: env_opt("LODESTAR_NOMAD_REGION"),
            nomad_namespace: env_opt("LODESTAR_NOMAD_NAMESPACE"),
            repo_base_dir: std::env::var("LODESTAR_REPO_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.repo_base_dir),
            poll_interval,
            plan_before_apply,
            credential_key,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.nomad_addr.is_empty() {
            anyhow::bail!("nomad_addr cannot be empty");
        }

        if !self.nomad_addr.starts_with("http://") && !self.nomad_addr.starts_with("https://") {
            anyhow::bail!("nomad_addr must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.credential_key.len() != 64
            || !self.credential_key.chars().all(|c| c.is_ascii_hexdigit())
        {
            anyhow::bail!("credential_key must be 64 hex characters");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://data/lodestar.sqlite?mode=rwc".to_string(),
            nomad_addr: "http://127.0.0.1:4646".to_string(),
            nomad_token: None,
            nomad_region: None,
            nomad_namespace: None,
            repo_base_dir: PathBuf::from("data/repos"),
            poll_interval: Duration::from_secs(30),
            plan_before_apply: false,
            credential_key: String::new(),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    env_opt(name).unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            credential_key: "ab".repeat(32),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.nomad_addr, "http://127.0.0.1:4646");
        assert!(!config.plan_before_apply);
        // No key configured
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid();
        assert!(config.validate().is_ok());

        config.nomad_addr = "127.0.0.1:4646".to_string();
        assert!(config.validate().is_err());
        config.nomad_addr = "https://nomad.internal".to_string();
        assert!(config.validate().is_ok());

        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.poll_interval = Duration::from_secs(5);

        config.credential_key = "zz".repeat(32);
        assert!(config.validate().is_err());
        config.credential_key = "ab".repeat(16);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" ON "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }
}
