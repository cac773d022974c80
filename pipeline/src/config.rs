//! Pipeline configuration and secret resolution.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use async_trait::async_trait;

use crate::providers::events::{EventError, SecretResolver};

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to the `RocksDB` data directory (default: "/data/commutecast").
    pub data_dir: String,

    /// Weather provider base URL.
    pub weather_base_url: String,

    /// Event provider base URL.
    pub events_base_url: String,

    /// Maximum deliveries before a chunk message is dead-lettered.
    pub max_receives: u32,
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/commutecast".into()),
            weather_base_url: std::env::var("WEATHER_BASE_URL")
                .unwrap_or_else(|_| "https://api.open-meteo.com/v1".into()),
            events_base_url: std::env::var("EVENTS_BASE_URL")
                .unwrap_or_else(|_| "https://app.ticketmaster.com/discovery/v2".into()),
            max_receives: std::env::var("QUEUE_MAX_RECEIVES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(commutecast_store::queue::DEFAULT_MAX_RECEIVES),
        }
    }

    /// The secret resolver for this deployment: a secrets file when one is
    /// mounted, environment variables otherwise.
    #[must_use]
    pub fn secret_resolver(&self) -> Arc<dyn SecretResolver> {
        Arc::new(FileOrEnvSecretResolver)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: "/data/commutecast".into(),
            weather_base_url: "https://api.open-meteo.com/v1".into(),
            events_base_url: "https://app.ticketmaster.com/discovery/v2".into(),
            max_receives: commutecast_store::queue::DEFAULT_MAX_RECEIVES,
        }
    }
}

/// Events secrets file structure.
#[derive(Debug, Deserialize)]
struct EventsSecrets {
    api_key: String,
}

/// Resolves secrets from a mounted JSON file, falling back to environment
/// variables. Resolution happens on first use, once per process.
struct FileOrEnvSecretResolver;

#[async_trait]
impl SecretResolver for FileOrEnvSecretResolver {
    async fn resolve(&self, name: &str) -> Result<String, EventError> {
        // Probe the conventional secrets file locations first.
        let secret_paths = [
            ".secrets/events.json",
            "commutecast/.secrets/events.json",
            "../.secrets/events.json",
        ];
        for path in &secret_paths {
            if let Ok(secrets) = load_secrets_file::<EventsSecrets>(path) {
                tracing::info!(path = %path, "loaded event provider key from file");
                return Ok(secrets.api_key);
            }
        }

        // Fall back to the environment: "events-api-key" -> EVENTS_API_KEY.
        let var = name.to_uppercase().replace('-', "_");
        std::env::var(&var)
            .map_err(|_| EventError::Secret(format!("secret {name} not found (tried {var})")))
    }
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_fallback_resolves_the_key() {
        std::env::set_var("TEST_EVENTS_API_KEY", "k-123");
        let resolver = FileOrEnvSecretResolver;
        let key = resolver.resolve("test-events-api-key").await.unwrap();
        assert_eq!(key, "k-123");
    }

    #[tokio::test]
    async fn missing_secret_is_an_error() {
        let resolver = FileOrEnvSecretResolver;
        assert!(resolver.resolve("never-configured-secret").await.is_err());
    }
}
