//! Explicit backend configuration.
//!
//! A [`BackendConfig`] is everything a backend needs at construction. Values
//! left unset here are looked up in the environment by the backend's factory,
//! never anywhere else.

use secrecy::SecretString;
use std::fmt;
use std::time::Duration;

use super::{CompletionConfig, ProviderError};

/// Model used when none is given.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Per-request timeout used when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_MAX_TOKENS: u32 = 1024;

pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Configuration for constructing a backend.
pub struct BackendConfig {
    /// Model name sent with every request
    pub model: String,

    /// API key; when unset the backend's environment variables are consulted
    pub api_key: Option<SecretString>,

    /// Endpoint root; when unset the backend's environment variable or default applies
    pub base_url: Option<String>,

    pub timeout: Duration,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Mark the document context block as cacheable where supported
    pub prompt_caching: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            prompt_caching: true,
        }
    }
}

impl BackendConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_prompt_caching(mut self, enabled: bool) -> Self {
        self.prompt_caching = enabled;
        self
    }

    /// Per-request settings derived from this configuration.
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            prompt_caching: self.prompt_caching,
        }
    }

    /// Resolve the endpoint root: config, then each of `env_vars`, then `default`.
    ///
    /// Blank values are skipped. The result has no trailing slash and must
    /// be an http(s) URL.
    pub fn resolve_base_url(
        &self,
        backend: &str,
        env_vars: &[&str],
        default: Option<&str>,
    ) -> Result<String, ProviderError> {
        let from_env = || {
            env_vars
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .find(|v| !v.trim().is_empty())
        };

        let url = self
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(from_env)
            .or_else(|| default.map(str::to_string))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{} base URL required: pass --base-url or set {}",
                    backend,
                    env_vars.join(" or ")
                ))
            })?;

        let url = url.trim().trim_end_matches('/').to_string();
        validate_base_url(&url)?;
        Ok(url)
    }
}

/// Only http(s) endpoints are accepted.
pub(crate) fn validate_base_url(url: &str) -> Result<(), ProviderError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ProviderError::NotConfigured(format!(
            "base_url must start with http:// or https://, got '{}'",
            url
        )))
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("timeout", &humantime::format_duration(self.timeout).to_string())
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("prompt_caching", &self.prompt_caching)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BackendConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.api_key.is_none());
        assert!(config.prompt_caching);
    }

    #[test]
    fn test_debug_redacts_key() {
        let secret = "sk-very-secret-value";
        let config = BackendConfig::new("gpt-4o").with_api_key(secret);
        let debug = format!("{:?}", config);
        assert!(!debug.contains(secret), "Secret exposed in Debug!");
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("1m"));
    }

    #[test]
    fn test_completion_config_carries_settings() {
        let config = BackendConfig::new("claude-sonnet-4-5")
            .with_timeout(Duration::from_secs(5))
            .with_max_tokens(200)
            .with_temperature(0.3)
            .with_prompt_caching(false);
        let completion = config.completion_config();
        assert_eq!(completion.model, "claude-sonnet-4-5");
        assert_eq!(completion.timeout, Duration::from_secs(5));
        assert_eq!(completion.max_tokens, 200);
        assert_eq!(completion.temperature, 0.3);
        assert!(!completion.prompt_caching);
    }

    #[test]
    fn test_base_url_prefers_config() {
        std::env::set_var("DOCVAL_TEST_URL_PRIORITY", "https://env.example.com");
        let config = BackendConfig::default().with_base_url("https://config.example.com/v1/");
        let url = config
            .resolve_base_url("test", &["DOCVAL_TEST_URL_PRIORITY"], None)
            .unwrap();
        assert_eq!(url, "https://config.example.com/v1");
        std::env::remove_var("DOCVAL_TEST_URL_PRIORITY");
    }

    #[test]
    fn test_base_url_env_chain_then_default() {
        std::env::set_var("DOCVAL_TEST_URL_SECOND", "http://localhost:8080");
        let config = BackendConfig::default();
        let url = config
            .resolve_base_url(
                "test",
                &["DOCVAL_TEST_URL_UNSET_1", "DOCVAL_TEST_URL_SECOND"],
                Some("https://default.example.com"),
            )
            .unwrap();
        assert_eq!(url, "http://localhost:8080");
        std::env::remove_var("DOCVAL_TEST_URL_SECOND");

        let url = config
            .resolve_base_url(
                "test",
                &["DOCVAL_TEST_URL_UNSET_2"],
                Some("https://default.example.com"),
            )
            .unwrap();
        assert_eq!(url, "https://default.example.com");
    }

    #[test]
    fn test_base_url_missing_without_default() {
        let err = BackendConfig::default()
            .resolve_base_url("nebulaone", &["DOCVAL_TEST_URL_UNSET_3"], None)
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(err.to_string().contains("DOCVAL_TEST_URL_UNSET_3"));
    }

    #[test]
    fn test_base_url_scheme_checked() {
        for bad in ["file:///etc/passwd", "ftp://example.com", "example.com"] {
            let config = BackendConfig::default().with_base_url(bad);
            assert!(
                config.resolve_base_url("test", &[], None).is_err(),
                "{} should be rejected",
                bad
            );
        }
    }
}
