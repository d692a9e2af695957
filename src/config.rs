use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Base of the public URIs minted for services and catalog records
    pub harvester_uri: String,
    pub harvest_admin_root_url: String,
    pub harvest_admin_api_key: String,
    pub organizations_uri: String,
    pub fetch_timeout_secs: u64,
    pub max_concurrent_sources: usize,
    /// Fail a harvest whose source yields no services instead of removing
    /// everything previously harvested from it
    pub empty_source_is_error: bool,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            harvester_uri: "http://localhost:8080/public-services".to_string(),
            harvest_admin_root_url: "http://localhost:8081".to_string(),
            harvest_admin_api_key: String::new(),
            organizations_uri: "http://localhost:8082/organizations".to_string(),
            fetch_timeout_secs: 600,
            max_concurrent_sources: 8,
            empty_source_is_error: false,
        }
    }
}

impl HarvesterConfig {
    /// Defaults overridden by every non-blank environment variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("HARVESTER_URI") {
            cfg.harvester_uri = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = var("HARVEST_ADMIN_ROOT_URL") {
            cfg.harvest_admin_root_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = var("HARVEST_ADMIN_API_KEY") {
            cfg.harvest_admin_api_key = v;
        }
        if let Some(v) = var("ORGANIZATIONS_URI") {
            cfg.organizations_uri = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = var("FETCH_TIMEOUT_SECS") {
            cfg.fetch_timeout_secs = parse("FETCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("MAX_CONCURRENT_SOURCES") {
            cfg.max_concurrent_sources = parse("MAX_CONCURRENT_SOURCES", &v)?;
            if cfg.max_concurrent_sources == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "MAX_CONCURRENT_SOURCES",
                    value: v,
                });
            }
        }
        if let Some(v) = var("EMPTY_SOURCE_IS_ERROR") {
            cfg.empty_source_is_error = parse("EMPTY_SOURCE_IS_ERROR", &v)?;
        }

        Ok(cfg)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        })
}
