//! Configuration Module
//!
//! Defines all configuration structures for the fulfillment scheduler.
//! Configuration is loaded from TOML files and parsed using serde.

use serde::Deserialize;
use std::fs;

/// Main configuration structure.
///
/// Loaded from a TOML file (e.g., config/default.toml).
///
/// # Example TOML
/// ```toml
/// [api]
/// host = "127.0.0.1"
/// port = 8080
///
/// [database]
/// url = "sqlite://fulfillment.db?mode=rwc"
///
/// [dashboard]
/// batch_page_size = 20
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub dashboard: DashboardConfig,
}

/// API server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// IP address to bind to (e.g., "127.0.0.1" or "0.0.0.0")
    pub host: String,
    /// TCP port to listen on
    pub port: u16,
}

/// Database configuration for the batch/order store.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL (e.g., "sqlite://fulfillment.db?mode=rwc")
    pub url: String,
}

/// Vendor dashboard configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Default page size for the active-batch listing
    pub batch_page_size: usize,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
