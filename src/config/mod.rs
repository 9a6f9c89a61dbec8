use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::logging::LoggingConfig;

/// Main application configuration, assembled from the environment only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub logging: LoggingConfig,
}

/// Content store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    #[serde(skip_serializing)]
    pub token: String,
}

/// Outbound fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub accept_language: String,
    pub user_agents: Vec<String>,
    /// Spacing between consecutive asset uploads
    pub upload_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset: "production".to_string(),
            api_version: "2024-01-01".to_string(),
            token: String::new(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            accept_language: "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            user_agents: Vec::new(),
            upload_delay_ms: 300,
        }
    }
}

impl AppConfig {
    /// Build configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        ConfigOverrides::apply(&mut config, lookup);
        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.store.token.trim().is_empty() {
            return Err(anyhow::anyhow!("SANITY_API_TOKEN must be set"));
        }

        if self.store.project_id.trim().is_empty() {
            return Err(anyhow::anyhow!("SANITY_PROJECT_ID must be set"));
        }

        if self.store.dataset.trim().is_empty() {
            return Err(anyhow::anyhow!("SANITY_DATASET must not be empty"));
        }

        if self.fetch.max_retries == 0 {
            return Err(anyhow::anyhow!("Fetch max_retries must be > 0"));
        }

        Ok(())
    }
}

/// Environment variable overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment overrides to configuration
    pub fn apply<F>(config: &mut AppConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Store credentials
        if let Some(token) = lookup("SANITY_API_TOKEN") {
            config.store.token = token.trim().to_string();
        }

        if let Some(project_id) = lookup("SANITY_PROJECT_ID") {
            config.store.project_id = project_id.trim().to_string();
        }

        if let Some(dataset) = lookup("SANITY_DATASET") {
            config.store.dataset = dataset.trim().to_string();
        }

        if let Some(version) = lookup("SANITY_API_VERSION") {
            config.store.api_version = version.trim().trim_start_matches('v').to_string();
        }

        // Logging
        if let Some(level) = lookup("CATALOG_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(dir) = lookup("CATALOG_SYNC_LOG_DIR").filter(|d| !d.trim().is_empty()) {
            config.logging.directory = Some(PathBuf::from(dir));
        }
    }
}
