use std::time::Duration;

use crate::driver::ClientSettings;
use crate::uri;

pub const DEFAULT_URI: &str = "mongodb://localhost:27017/appdb?authSource=admin";
pub const DEFAULT_APP_NAME: &str = "replica-link";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Settings {
    pub mongodb_uri: String,
    pub app_name: String,
    pub connect_timeout: Duration,
    pub bind_addr: String,
    /// Ask on the terminal for credentials missing from the URI.
    pub prompt_credentials: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mongodb_uri: DEFAULT_URI.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            prompt_credentials: false,
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let connect_timeout_secs = get("MONGODB_CONNECT_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        let prompt_credentials = get("MONGODB_PROMPT_CREDENTIALS")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            mongodb_uri: get("MONGODB_URI")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.mongodb_uri),
            app_name: get("APP_NAME")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.app_name),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            bind_addr: get("BIND_ADDR")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.bind_addr),
            prompt_credentials,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.mongodb_uri = uri.into();
        self
    }

    /// Driver settings; a replica-set URI turns on the secondary-preferred bias.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            uri: self.mongodb_uri.clone(),
            app_name: self.app_name.clone(),
            connect_timeout: self.connect_timeout,
            secondary_preferred: uri::is_replica_set(&self.mongodb_uri),
        }
    }
}
