use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

pub const DEFAULT_RPC_URL: &str = "https://api.hive.blog";
pub const DEFAULT_MAX_DEPTH: u32 = 3;

const RPC_URL_ENV: &str = "THREADLINE_RPC_URL";
const MAX_DEPTH_ENV: &str = "THREADLINE_MAX_DEPTH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rpc_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Deepest reply depth expanded below the root (its direct replies are depth 0).
    pub max_depth: u32,
    /// Fetch the full record of each listed reply instead of trusting the listing.
    pub hydrate_children: bool,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            user_agent: format!("threadline/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            max_depth: DEFAULT_MAX_DEPTH,
            hydrate_children: true,
            log_filter: "threadline=info,thread_aggregator=info,condenser_client=info"
                .to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads `path` when given, otherwise defaults, then applies environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rpc_url) = lookup(RPC_URL_ENV) {
            self.rpc_url = rpc_url;
        }
        if let Some(max_depth) = lookup(MAX_DEPTH_ENV) {
            self.max_depth = max_depth
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    field: "max_depth".to_string(),
                    value: max_depth.clone(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.rpc_url).map_err(|_| ConfigError::InvalidValue {
            field: "rpc_url".to_string(),
            value: self.rpc_url.clone(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationFailed {
                reason: format!("rpc_url must use http or https, got {}", url.scheme()),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "request_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "user_agent must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
