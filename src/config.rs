use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "domain_appraiser";
pub const CONFIG_NAME: &str = "config";

/// Overrides `api_key` from the config file when set.
pub const API_KEY_ENV: &str = "DOMAIN_APPRAISER_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory of the sled database holding the persisted collections.
    pub database_path: String,
    /// JSON endpoint answering valuation requests.
    pub api_endpoint: String,
    pub api_key: String,
    pub currency: String,
    /// Default tracing filter; `RUST_LOG` takes precedence.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "domain_appraiser_db".to_string(),
            api_endpoint: "http://localhost:8787/valuation".to_string(),
            api_key: String::new(),
            currency: "USD".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .or_else(|| Some(self.api_key.clone()))
            .filter(|key| !key.trim().is_empty())
    }
}
