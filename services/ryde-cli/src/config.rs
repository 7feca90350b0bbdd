//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The account password comes from the RYDE_PASSWORD env var or
//! password_file, never from the TOML itself.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use common::Secret;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to RYDE_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session persistence settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_file")]
    pub file: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file: default_session_file(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_session_file() -> PathBuf {
    PathBuf::from("ryde-session.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `RYDE_API_BASE_URL` and `RYDE_SESSION_FILE` replace their file
    /// counterparts. Password resolution order:
    /// 1. RYDE_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        if let Ok(base_url) = std::env::var("RYDE_API_BASE_URL") {
            config.api.base_url = base_url;
        }
        if let Ok(file) = std::env::var("RYDE_SESSION_FILE") {
            config.session.file = PathBuf::from(file);
        }

        // Validate after the overlay so env-provided values are checked too
        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            bail!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            );
        }
        if config.api.timeout_secs == 0 {
            bail!("timeout_secs must be greater than 0");
        }

        // Resolve password: env var takes precedence over file
        if let Ok(password) = std::env::var("RYDE_PASSWORD") {
            config.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = config.password_file {
            let password = std::fs::read_to_string(password_file)
                .with_context(|| format!("reading password_file {}", password_file.display()))?;
            let password = password.trim().to_owned();
            if !password.is_empty() {
                config.password = Some(Secret::new(password));
            }
        }

        Ok(config)
    }

    /// Resolve the config file path from CLI arg or RYDE_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("RYDE_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("ryde.toml")
    }
}
