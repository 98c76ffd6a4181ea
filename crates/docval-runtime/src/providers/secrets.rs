//! Credential handling for LLM backends.
//!
//! Every backend keeps its API key in an [`ApiCredential`]:
//!
//! - **No accidental logging**: the value never appears in Debug/Display output
//! - **Zeroed on drop**: via the `secrecy` crate
//! - **Explicit exposure**: `.expose()` at the point of use only
//!
//! ## Resolution order
//!
//! ```ignore
//! // --api-key wins, then each variable in order
//! let cred = ApiCredential::resolve(
//!     config.api_key.as_ref(),
//!     &["OPENAI_API_KEY", "GITHUB_TOKEN"],
//!     "OpenAI API key",
//! )?;
//!
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
///
/// Useful for debugging configuration issues without exposing the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Supplied in the backend configuration (e.g. `--api-key`)
    Config,
    /// Loaded from an environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// # Example
///
/// ```ignore
/// let cred = ApiCredential::new("sk-secret-key", CredentialSource::Programmatic, "Test key");
///
/// // Safe to log - shows [REDACTED]
/// tracing::debug!(credential = %cred, "backend ready");
/// ```
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
    env_var: Option<String>,
}

impl ApiCredential {
    /// Create a new credential from a string value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
            env_var: None,
        }
    }

    fn from_env_var(var: &str, value: String, name: &'static str) -> Self {
        Self {
            env_var: Some(var.to_string()),
            ..Self::new(value, CredentialSource::Environment, name)
        }
    }

    /// Take the configured key if there is one, else fall back to the
    /// environment variables in order.
    ///
    /// A blank configured key counts as unset.
    pub fn resolve(
        configured: Option<&SecretString>,
        env_vars: &[&str],
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = configured.map(|s| s.expose_secret()) {
            if !value.trim().is_empty() {
                return Ok(Self::new(value, CredentialSource::Config, name));
            }
        }

        if let Some((var, value)) = first_env(env_vars) {
            return Ok(Self::from_env_var(var, value, name));
        }

        Err(ProviderError::NotConfigured(format!(
            "{} required: pass --api-key or set the {} environment variable",
            name,
            env_vars.join(" or ")
        )))
    }

    /// Check if a credential could be resolved, without loading it.
    pub fn is_available(configured: Option<&SecretString>, env_vars: &[&str]) -> bool {
        configured.is_some_and(|s| !s.expose_secret().trim().is_empty())
            || first_env(env_vars).is_some()
    }

    /// Expose the credential value for use in an API call.
    ///
    /// Only call this where the value is needed (setting an HTTP header).
    /// Never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Human-readable name of this credential.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The environment variable the value came from, if any.
    pub fn env_var(&self) -> Option<&str> {
        self.env_var.as_deref()
    }
}

fn first_env<'a>(env_vars: &[&'a str]) -> Option<(&'a str, String)> {
    env_vars.iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| (*var, v))
    })
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
