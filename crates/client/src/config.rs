//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CLEMENTINE_API_BASE_URL` - Base URL of the backend API
//!   (e.g., `http://localhost:8080/api`)
//!
//! ## Optional
//! - `CLEMENTINE_STATE_DIR` - Directory for persisted local state
//!   (default: `.clementine`)
//! - `CLEMENTINE_PROFILE` - Profile name scoping the persisted state file
//!   (default: `default`)

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client application configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend API.
    pub api_base_url: Url,
    /// Directory holding the persisted key-value state.
    pub state_dir: PathBuf,
    /// Profile name; each profile gets its own state file.
    pub profile: String,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_base_url(
            "CLEMENTINE_API_BASE_URL",
            &get_required_env("CLEMENTINE_API_BASE_URL")?,
        )?;
        let state_dir = PathBuf::from(get_env_or_default("CLEMENTINE_STATE_DIR", ".clementine"));
        let profile = get_env_or_default("CLEMENTINE_PROFILE", "default");

        Ok(Self {
            api_base_url,
            state_dir,
            profile,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse and validate an HTTP(S) base URL.
fn parse_base_url(var_name: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_url_valid() {
        let url = parse_base_url("TEST_VAR", "http://localhost:8080/api").expect("valid url");
        assert_eq!(url.as_str(), "http://localhost:8080/api");
    }

    #[test]
    fn test_parse_base_url_rejects_non_http() {
        let result = parse_base_url("TEST_VAR", "ftp://example.com");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_parse_base_url_rejects_garbage() {
        let result = parse_base_url("TEST_VAR", "not a url");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("CLEMENTINE_API_BASE_URL".to_string());
        assert_eq!(
            err.to_string(),
            "Missing environment variable: CLEMENTINE_API_BASE_URL"
        );
    }
}
