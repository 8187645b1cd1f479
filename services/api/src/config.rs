//! services/api/src/config.rs
//!
//! Defines the upload service's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// Uploads larger than this are refused unless `MAX_UPLOAD_BYTES` says otherwise.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Root of the statically served `/assets` tree.
    pub assets_dir: PathBuf,
    /// Directory under `assets_dir` that profile images are written to.
    pub upload_subdir: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Storage Settings ---
        let assets_dir = std::env::var("ASSETS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./assets"));

        let upload_subdir =
            std::env::var("UPLOAD_SUBDIR").unwrap_or_else(|_| "teachers".to_string());
        if upload_subdir.is_empty() || upload_subdir.contains(['/', '\\']) || upload_subdir == ".."
        {
            return Err(ConfigError::InvalidValue(
                "UPLOAD_SUBDIR".to_string(),
                format!("'{}' must be a single directory name", upload_subdir),
            ));
        }

        let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw.parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("MAX_UPLOAD_BYTES".to_string(), e.to_string())
            })?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            bind_address,
            log_level,
            assets_dir,
            upload_subdir,
            max_upload_bytes,
        })
    }

    /// Where uploaded images are written.
    pub fn upload_dir(&self) -> PathBuf {
        self.assets_dir.join(&self.upload_subdir)
    }

    /// The public URL prefix uploaded images are served under.
    pub fn upload_url_prefix(&self) -> String {
        format!("/assets/{}", self.upload_subdir)
    }
}
