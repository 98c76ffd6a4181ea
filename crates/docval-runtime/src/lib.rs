//! # docval-runtime
//!
//! LLM backends and the validation loop for docval.
//!
//! `docval-core` knows how to read documents and specifications and how to
//! score results; this crate is where the network calls happen:
//! - [`providers`]: the backend trait, `BackendConfig`, credentials and the
//!   name-keyed registry (`openai`, `github`, `nebulaone`, `anthropic`)
//! - [`prompts`]: what each validation call sends
//! - [`validator`]: parse, ask, collect, report
//!
//! ## Example
//!
//! ```rust,ignore
//! use docval_runtime::{BackendConfig, ProviderRegistry, Validator};
//!
//! let registry = ProviderRegistry::with_defaults();
//! let config = BackendConfig::new("gpt-4o-mini");
//! let validator = Validator::from_backend(&registry, "openai", &config)?;
//!
//! let specs = docval_core::load_spec_file("specs.json")?;
//! let report = validator.validate(Path::new("report.docx"), &specs, None).await?;
//! println!("{}/{} passed", report.passed_count, report.total_specs);
//! ```

use thiserror::Error;

pub mod prompts;
pub mod providers;
pub mod usage;
pub mod validator;

pub use prompts::PromptMode;
pub use providers::{
    ApiCredential, BackendConfig, ChatMessage, CompletionConfig, CompletionResponse,
    CredentialSource, LlmProvider, ProviderError, ProviderFactory, ProviderRegistry, TokenUsage,
};
pub use usage::UsageTracker;
pub use validator::{Validator, ValidatorBuilder};

/// Errors from a validation run.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Parse(#[from] docval_core::ParseError),

    #[error(transparent)]
    Spec(#[from] docval_core::SpecError),

    #[error("Duplicate specification name: '{0}'")]
    DuplicateSpec(String),

    /// Backend construction or configuration failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A backend request failed mid-run
    #[error("Backend request failed while checking '{spec}': {source}")]
    Backend {
        spec: String,
        #[source]
        source: ProviderError,
    },

    #[error("Validator not configured: {0}")]
    NotConfigured(String),
}

impl RuntimeError {
    /// Whether re-running might succeed (a transient backend failure).
    pub fn is_transient(&self) -> bool {
        match self {
            RuntimeError::Backend { source, .. } | RuntimeError::Provider(source) => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_backend_error_message_names_spec() {
        let err = RuntimeError::Backend {
            spec: "Has Title".to_string(),
            source: ProviderError::Timeout(Duration::from_secs(30)),
        };
        assert!(err.to_string().contains("'Has Title'"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_errors_are_not_transient() {
        let err = RuntimeError::from(docval_core::ParseError::UnsupportedFormat {
            extension: "xyz".to_string(),
            supported: ".docx, .html".to_string(),
        });
        assert!(!err.is_transient());
    }
}
