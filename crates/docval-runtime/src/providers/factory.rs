//! Backend factories and the name-keyed registry.
//!
//! Adding a backend means registering a factory; nothing else matches on
//! backend names.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create("OpenAI", &BackendConfig::new("gpt-4o-mini"))?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BackendConfig, LlmProvider, ProviderError, DEFAULT_MODEL};

/// Factory for creating a backend from a [`BackendConfig`].
pub trait ProviderFactory: Send + Sync {
    /// Unique, lowercase backend name (e.g. "openai", "anthropic").
    fn provider_type(&self) -> &'static str;

    /// Create a backend instance.
    ///
    /// Missing credentials or endpoints fail here, before any request.
    fn create(&self, config: &BackendConfig) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate configuration without creating a backend.
    fn validate_config(&self, config: &BackendConfig) -> Result<(), ProviderError>;

    /// Model used when the caller does not name one.
    fn default_model(&self) -> &'static str {
        DEFAULT_MODEL
    }

    /// Human-readable description of this backend.
    fn description(&self) -> &'static str {
        "LLM backend"
    }
}

/// Registry of available backend factories, keyed by lowercase name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same name.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_ascii_lowercase(), factory);
    }

    /// Create a backend by name (case-insensitive).
    ///
    /// The configuration is validated first, so a bad key or endpoint fails
    /// with the factory's own message before construction.
    pub fn create(
        &self,
        provider_type: &str,
        config: &BackendConfig,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.lookup(provider_type)?;
        factory.validate_config(config)?;
        factory.create(config)
    }

    /// List available backend names.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Get the factory for a backend name.
    pub fn get_factory(&self, provider_type: &str) -> Option<&Arc<dyn ProviderFactory>> {
        self.factories
            .get(provider_type.trim().to_ascii_lowercase().as_str())
    }

    /// Default model for a backend name.
    pub fn default_model(&self, provider_type: &str) -> Option<&'static str> {
        self.get_factory(provider_type).map(|f| f.default_model())
    }

    fn lookup(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.get_factory(provider_type).ok_or_else(|| {
            let available: Vec<String> = self
                .factories
                .iter()
                .map(|(name, factory)| format!("{} ({})", name, factory.description()))
                .collect();
            ProviderError::NotConfigured(format!(
                "Unknown backend: '{}'. Available: {}",
                provider_type,
                available.join(", ")
            ))
        })
    }

    /// Create a registry with all built-in backends registered.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "openai")]
        for flavor in super::OpenAiFlavor::ALL {
            registry.register(Arc::new(super::OpenAiProviderFactory::new(flavor)));
        }

        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicProviderFactory));

        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, TokenUsage};
    use async_trait::async_trait;

    struct MockProvider {
        model: String,
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: "Result: PASS".to_string(),
                usage: TokenUsage::default(),
                model: self.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct MockProviderFactory;

    impl ProviderFactory for MockProviderFactory {
        fn provider_type(&self) -> &'static str {
            "mock"
        }

        fn create(&self, config: &BackendConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            Ok(Arc::new(MockProvider {
                model: config.model.clone(),
            }))
        }

        fn validate_config(&self, config: &BackendConfig) -> Result<(), ProviderError> {
            if config.model.is_empty() {
                return Err(ProviderError::NotConfigured("model required".to_string()));
            }
            Ok(())
        }

        fn default_model(&self) -> &'static str {
            "mock-1"
        }

        fn description(&self) -> &'static str {
            "Mock backend for testing"
        }
    }

    #[test]
    fn test_registry_register_and_create() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProviderFactory));

        assert!(registry.get_factory("mock").is_some());
        assert!(registry.get_factory("unknown").is_none());

        let provider = registry
            .create("mock", &BackendConfig::new("mock-2"))
            .unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_registry_names_are_case_insensitive() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProviderFactory));

        assert!(registry.get_factory("MOCK").is_some());
        assert!(registry.create(" Mock ", &BackendConfig::default()).is_ok());
        assert_eq!(registry.default_model("mOcK"), Some("mock-1"));
    }

    #[test]
    fn test_registry_unknown_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProviderFactory));

        match registry.create("unknown", &BackendConfig::default()) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("Unknown backend: 'unknown'"));
                assert!(msg.contains("mock (Mock backend for testing)"));
            }
            _ => panic!("Expected NotConfigured error"),
        }
    }

    #[test]
    fn test_registry_create_validates_config() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProviderFactory));

        match registry.create("mock", &BackendConfig::new("")) {
            Err(ProviderError::NotConfigured(msg)) => assert_eq!(msg, "model required"),
            _ => panic!("Expected NotConfigured error"),
        }
    }

    #[cfg(feature = "all-providers")]
    #[test]
    fn test_default_registry() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(
            registry.available_types(),
            vec!["anthropic", "github", "nebulaone", "openai"]
        );
        assert_eq!(registry.default_model("openai"), Some("gpt-4o-mini"));
    }
}
