//! Typed configuration from environment variables.
//!
//! Loads once at startup. Sensitive values are wrapped in
//! `secrecy::SecretString` to prevent log leaks. Queue backend options live
//! in a TOML file named by `DISPATCHQ_CONFIG`; see [`QueueSettings`].

pub mod secrets;

use crate::error::Result;
use crate::queue::QueueSettings;
use secrets::{ExposeSecret, SecretString};
use std::path::PathBuf;

#[derive(Debug)]
pub struct Config {
    /// Path of the queue settings file.
    pub queue_config: Option<PathBuf>,
    /// Overrides the distributed backend's address when set.
    pub database_url: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            queue_config: optional_var("DISPATCHQ_CONFIG").map(PathBuf::from),
            database_url: optional_var("DATABASE_URL").map(SecretString::from),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Queue settings from `queue_config` (defaults when unset), with
    /// `database_url` applied to the distributed backend.
    pub fn queue_settings(&self) -> Result<QueueSettings> {
        let mut settings = match self.queue_config {
            Some(ref path) => QueueSettings::load(path)?,
            None => QueueSettings::default(),
        };
        if let Some(ref url) = self.database_url {
            let table = settings.backend_options_mut("distributed");
            table.remove("url");
            table.insert(
                "address".to_string(),
                toml::Value::String(url.expose_secret().to_string()),
            );
        }
        Ok(settings)
    }
}

/// Unset and empty are treated the same.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
