use std::path::PathBuf;
use std::time::Duration;

use crate::store::BackendKind;

/// Subsystem configuration.
///
/// Loaded from the environment with sane defaults; there is no CLI layer
/// here, callers that want flag parsing build an `AuthConfig` themselves.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Token-refresh endpoint (POST, JSON).
    pub token_endpoint: String,

    /// OAuth client id sent with every refresh request.
    pub client_id: String,

    /// Environment variable consulted by the discovery chain.
    pub credential_env_var: String,

    /// Service name under which the OS secret store entry is filed.
    pub keyring_service: String,

    /// Account name for the OS secret store entry.
    pub keyring_user: String,

    /// Location of the local secrets file.
    pub secrets_file: PathBuf,

    /// Backend that takes writes. `None` selects the OS secret store with
    /// fallback to the secrets file when the store is unavailable.
    pub write_backend: Option<BackendKind>,

    /// Proactive refresh triggers this long before computed expiry.
    pub refresh_skew: Duration,

    /// Attempt ceiling for one refresh operation.
    pub refresh_max_attempts: u32,

    /// Base delay for exponential backoff between refresh attempts.
    pub refresh_base_delay: Duration,

    /// Timeout applied to each HTTP request, refresh attempts included.
    pub http_timeout: Duration,

    /// Per-backend time budget during `clear()`; logout stays interactive.
    pub clear_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let secrets_file = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("claude-auth")
            .join("credentials.json");

        Self {
            token_endpoint: "https://console.anthropic.com/v1/oauth/token".to_string(),
            client_id: "claude-cli".to_string(),
            credential_env_var: "ANTHROPIC_API_KEY".to_string(),
            keyring_service: "claude-auth".to_string(),
            keyring_user: "default".to_string(),
            secrets_file,
            write_backend: None,
            refresh_skew: Duration::from_secs(300),
            refresh_max_attempts: 3,
            refresh_base_delay: Duration::from_secs(1),
            http_timeout: Duration::from_secs(30),
            clear_timeout: Duration::from_millis(50),
        }
    }
}

impl AuthConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Reads a `.env` file if one exists. Unparseable values fall back to
    /// their defaults rather than failing startup.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(v) = std::env::var("CLAUDE_AUTH_TOKEN_ENDPOINT") {
            config.token_endpoint = v;
        }
        if let Ok(v) = std::env::var("CLAUDE_AUTH_CLIENT_ID") {
            config.client_id = v;
        }
        if let Ok(v) = std::env::var("CLAUDE_AUTH_CREDENTIAL_ENV_VAR") {
            config.credential_env_var = v;
        }
        if let Ok(v) = std::env::var("CLAUDE_AUTH_SECRETS_FILE") {
            config.secrets_file = expand_tilde(&v);
        }
        if let Some(v) = env_parse::<u64>("CLAUDE_AUTH_REFRESH_SKEW_SECS") {
            config.refresh_skew = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u32>("CLAUDE_AUTH_REFRESH_MAX_ATTEMPTS") {
            config.refresh_max_attempts = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("CLAUDE_AUTH_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("CLAUDE_AUTH_CLEAR_TIMEOUT_MS") {
            config.clear_timeout = Duration::from_millis(v);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Expand tilde (~) in file paths to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.refresh_skew, Duration::from_secs(300));
        assert_eq!(config.refresh_max_attempts, 3);
        assert_eq!(config.refresh_base_delay, Duration::from_secs(1));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.credential_env_var, "ANTHROPIC_API_KEY");
        assert!(config.write_backend.is_none());
        assert!(config.secrets_file.ends_with("claude-auth/credentials.json"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("CLAUDE_AUTH_TOKEN_ENDPOINT", "http://127.0.0.1:9/token");
        std::env::set_var("CLAUDE_AUTH_REFRESH_SKEW_SECS", "60");
        std::env::set_var("CLAUDE_AUTH_REFRESH_MAX_ATTEMPTS", "5");

        let config = AuthConfig::from_env();
        assert_eq!(config.token_endpoint, "http://127.0.0.1:9/token");
        assert_eq!(config.refresh_skew, Duration::from_secs(60));
        assert_eq!(config.refresh_max_attempts, 5);

        std::env::remove_var("CLAUDE_AUTH_TOKEN_ENDPOINT");
        std::env::remove_var("CLAUDE_AUTH_REFRESH_SKEW_SECS");
        std::env::remove_var("CLAUDE_AUTH_REFRESH_MAX_ATTEMPTS");
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back() {
        std::env::set_var("CLAUDE_AUTH_REFRESH_SKEW_SECS", "not-a-number");
        let config = AuthConfig::from_env();
        assert_eq!(config.refresh_skew, Duration::from_secs(300));
        std::env::remove_var("CLAUDE_AUTH_REFRESH_SKEW_SECS");
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/secrets/file.json");
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.to_string_lossy().contains("secrets/file.json"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }
}
