//! The validator: parse a document, ask the backend about each
//! specification, assemble the report.
//!
//! Specifications are evaluated strictly one after another, in list order.
//! Each call is awaited before the next one starts and no call sees another
//! specification's outcome.
//!
//! Failure handling:
//! - Spec problems, missing files, unsupported formats and parse errors fail
//!   before any backend call
//! - A backend request error fails the run; nothing is retried
//! - A response that cannot be parsed becomes a failed result and the run
//!   continues

use std::path::Path;
use std::sync::Arc;

use docval_core::{
    parse_verdict, select_parser, validate_specs, DocumentStructure, ReportUsage, SpecError,
    ValidationReport, ValidationResult, ValidationSpec,
};

use crate::prompts::{build_messages, PromptMode};
use crate::providers::{
    BackendConfig, CompletionConfig, LlmProvider, ProviderError, ProviderRegistry,
};
use crate::usage::UsageTracker;
use crate::RuntimeError;

/// Validates documents against specifications using one backend.
pub struct Validator {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    mode: PromptMode,
    /// Usage over the validator's lifetime
    usage: UsageTracker,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("backend", &self.provider.name())
            .field("model", &self.completion.model)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Validator {
    /// Create a validator with the default prompt mode.
    pub fn new(provider: Arc<dyn LlmProvider>, completion: CompletionConfig) -> Self {
        Self {
            provider,
            completion,
            mode: PromptMode::default(),
            usage: UsageTracker::new(),
        }
    }

    pub fn builder() -> ValidatorBuilder {
        ValidatorBuilder::new()
    }

    /// Create a validator for a named backend.
    ///
    /// Credentials and endpoints are resolved here, so a misconfigured
    /// backend fails before any document is read.
    pub fn from_backend(
        registry: &ProviderRegistry,
        backend: &str,
        config: &BackendConfig,
    ) -> Result<Self, RuntimeError> {
        let provider = registry.create(backend, config)?;
        tracing::debug!(
            backend = provider.name(),
            model = %config.model,
            timeout = %humantime::format_duration(config.timeout),
            "Backend configured"
        );
        Ok(Self::new(provider, config.completion_config()))
    }

    pub fn with_prompt_mode(mut self, mode: PromptMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn prompt_mode(&self) -> PromptMode {
        self.mode
    }

    pub fn backend_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.completion.model
    }

    /// Usage of every run so far.
    pub fn usage(&self) -> ReportUsage {
        self.usage.snapshot()
    }

    /// Validate the document at `path`.
    ///
    /// `parser_hint` overrides extension-based parser selection.
    pub async fn validate(
        &self,
        path: &Path,
        specs: &[ValidationSpec],
        parser_hint: Option<&str>,
    ) -> Result<ValidationReport, RuntimeError> {
        check_specs(specs)?;

        let parser = select_parser(path, parser_hint)?;
        tracing::info!(
            path = %path.display(),
            parser = %parser.format(),
            specs = specs.len(),
            "Validating document"
        );
        let structure = parser.parse(path)?;

        self.validate_structure(&structure, specs).await
    }

    /// Validate an already parsed document.
    pub async fn validate_structure(
        &self,
        structure: &DocumentStructure,
        specs: &[ValidationSpec],
    ) -> Result<ValidationReport, RuntimeError> {
        check_specs(specs)?;

        let structure_json = structure.to_prompt_json();
        let run_usage = UsageTracker::new();
        let mut results = Vec::with_capacity(specs.len());

        for spec in specs {
            let result = self.validate_spec(&structure_json, spec, &run_usage).await?;
            results.push(result);
        }

        let report = ValidationReport::assemble(&structure.file_path, specs, results)
            .with_backend(self.provider.name(), &self.completion.model)
            .with_usage(run_usage.snapshot());

        tracing::info!(
            path = %structure.file_path,
            passed = report.passed_count,
            total = report.total_specs,
            score = report.score,
            "Validation complete"
        );

        Ok(report)
    }

    async fn validate_spec(
        &self,
        structure_json: &str,
        spec: &ValidationSpec,
        run_usage: &UsageTracker,
    ) -> Result<ValidationResult, RuntimeError> {
        let messages = build_messages(self.mode, structure_json, spec);

        let estimated: u32 = messages
            .iter()
            .map(|m| self.provider.estimate_tokens(&m.content))
            .sum();
        tracing::debug!(
            spec = spec.name(),
            backend = self.provider.name(),
            model = %self.completion.model,
            mode = %self.mode,
            estimated_tokens = estimated,
            prompt = %messages.last().map(|m| m.content.as_str()).unwrap_or_default(),
            "LLM REQUEST"
        );
        tracing::trace!(spec = spec.name(), messages = ?messages, "LLM REQUEST messages");

        let response = self
            .provider
            .complete(messages, &self.completion)
            .await
            .map_err(|source| backend_error(spec, source))?;

        run_usage.record(&response.usage);
        self.usage.record(&response.usage);

        tracing::debug!(
            spec = spec.name(),
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            cache_read_tokens = response.usage.cache_read_tokens,
            stop_reason = ?response.stop_reason,
            response = %response.content,
            "LLM RESPONSE"
        );

        Ok(match parse_verdict(&response.content) {
            Ok(verdict) => ValidationResult::from_verdict(spec.name(), verdict),
            Err(e) => {
                tracing::warn!(spec = spec.name(), error = %e, "Unparseable backend response");
                ValidationResult::unparseable(spec.name(), &e, &response.content)
            }
        })
    }
}

fn check_specs(specs: &[ValidationSpec]) -> Result<(), RuntimeError> {
    validate_specs(specs).map_err(|e| match e {
        SpecError::DuplicateName(name) => RuntimeError::DuplicateSpec(name),
        other => RuntimeError::Spec(other),
    })
}

fn backend_error(spec: &ValidationSpec, source: ProviderError) -> RuntimeError {
    tracing::error!(
        spec = spec.name(),
        transient = source.is_transient(),
        error = %source,
        "Backend request failed"
    );
    RuntimeError::Backend {
        spec: spec.name().to_string(),
        source,
    }
}

/// Builder for [`Validator`].
pub struct ValidatorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    completion: CompletionConfig,
    mode: PromptMode,
}

impl ValidatorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            completion: CompletionConfig::default(),
            mode: PromptMode::default(),
        }
    }

    /// Set the backend.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Take model, limits and timeout from a backend configuration.
    pub fn backend_config(mut self, config: &BackendConfig) -> Self {
        self.completion = config.completion_config();
        self
    }

    pub fn completion_config(mut self, completion: CompletionConfig) -> Self {
        self.completion = completion;
        self
    }

    pub fn prompt_mode(mut self, mode: PromptMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<Validator, RuntimeError> {
        let provider = self
            .provider
            .ok_or_else(|| RuntimeError::NotConfigured("No backend set".to_string()))?;

        Ok(Validator::new(provider, self.completion).with_prompt_mode(self.mode))
    }
}

impl Default for ValidatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionResponse, TokenUsage};
    use async_trait::async_trait;
    use docval_core::HtmlParser;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replies with scripted responses in order and records every request.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.requests.lock().push(messages);
            let reply = self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok("Result: PASS".to_string()))?;
            Ok(CompletionResponse {
                content: reply,
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 10,
                    ..Default::default()
                },
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn untitled_page() -> DocumentStructure {
        HtmlParser::new().parse_str(
            "page.html",
            "<html><body><h1>Intro</h1><p>No title here.</p></body></html>",
        )
    }

    #[tokio::test]
    async fn test_results_follow_spec_order() {
        let provider = ScriptedProvider::new(vec![
            Ok("Result: FAIL\nConfidence: 0.95\nReasoning: metadata title is null"),
            Ok("Result: PASS\nConfidence: 0.9\nReasoning: one h1"),
        ]);
        let validator = Validator::new(provider.clone(), CompletionConfig::default());
        let specs = vec![
            ValidationSpec::new("Has Title", "Document must contain a title"),
            ValidationSpec::new("Has Headings", "Document must use headings"),
        ];

        let report = validator
            .validate_structure(&untitled_page(), &specs)
            .await
            .unwrap();

        assert_eq!(report.total_specs, 2);
        assert_eq!(report.results[0].spec_name, "Has Title");
        assert!(!report.results[0].passed);
        assert!(report.results[1].passed);
        assert_eq!(report.score, 0.5);
        assert_eq!(report.backend.as_deref(), Some("scripted"));
        assert_eq!(report.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(report.usage.unwrap().requests, 2);
    }

    #[tokio::test]
    async fn test_prompt_carries_spec_and_metadata() {
        let provider = ScriptedProvider::new(vec![Ok("Result: FAIL")]);
        let validator = Validator::builder()
            .provider(provider.clone())
            .prompt_mode(PromptMode::PerSpec)
            .build()
            .unwrap();
        let specs = vec![ValidationSpec::new("Has Title", "Document must contain a title")];

        validator
            .validate_structure(&untitled_page(), &specs)
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].len(), 2);
        let prompt = &requests[0][1].content;
        assert!(prompt.contains("Has Title"));
        assert!(prompt.contains("\"metadata\""));
        assert!(prompt.contains("\"title\": null"));
    }

    #[tokio::test]
    async fn test_shared_context_never_leaks_earlier_specs() {
        let provider = ScriptedProvider::new(vec![]);
        let validator = Validator::new(provider.clone(), CompletionConfig::default());
        let specs = vec![
            ValidationSpec::new("First", "first requirement"),
            ValidationSpec::new("Second", "second requirement"),
        ];

        validator
            .validate_structure(&untitled_page(), &specs)
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests[1].len(), 4);
        assert!(requests[1].iter().all(|m| !m.content.contains("First")));
        assert_eq!(requests[0][..3], requests[1][..3]);
    }

    #[tokio::test]
    async fn test_unparseable_response_does_not_stop_run() {
        let provider = ScriptedProvider::new(vec![
            Ok("I cannot tell."),
            Ok("Result: PASS\nConfidence: 0.8\nReasoning: fine"),
        ]);
        let validator = Validator::new(provider, CompletionConfig::default());
        let specs = vec![ValidationSpec::new("A", "a"), ValidationSpec::new("B", "b")];

        let report = validator
            .validate_structure(&untitled_page(), &specs)
            .await
            .unwrap();

        assert!(!report.results[0].passed);
        assert_eq!(report.results[0].confidence, 0.0);
        assert!(report.results[0]
            .reasoning
            .starts_with("Could not parse backend response"));
        assert!(report.results[1].passed);
    }

    #[tokio::test]
    async fn test_backend_error_is_fatal() {
        let provider = ScriptedProvider::new(vec![
            Ok("Result: PASS"),
            Err(ProviderError::AuthError("invalid key".to_string())),
        ]);
        let validator = Validator::new(provider.clone(), CompletionConfig::default());
        let specs = vec![
            ValidationSpec::new("A", "a"),
            ValidationSpec::new("B", "b"),
            ValidationSpec::new("C", "c"),
        ];

        let err = validator
            .validate_structure(&untitled_page(), &specs)
            .await
            .unwrap_err();

        match err {
            RuntimeError::Backend { spec, source } => {
                assert_eq!(spec, "B");
                assert!(!source.is_transient());
            }
            other => panic!("Expected Backend error, got {:?}", other),
        }
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected_before_any_call() {
        let provider = ScriptedProvider::new(vec![]);
        let validator = Validator::new(provider.clone(), CompletionConfig::default());
        let specs = vec![ValidationSpec::new("A", "a"), ValidationSpec::new("A", "b")];

        let err = validator
            .validate_structure(&untitled_page(), &specs)
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::DuplicateSpec(name) if name == "A"));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_zero_specs_scores_zero() {
        let provider = ScriptedProvider::new(vec![]);
        let validator = Validator::new(provider.clone(), CompletionConfig::default());

        let report = validator
            .validate_structure(&untitled_page(), &[])
            .await
            .unwrap();

        assert_eq!(report.total_specs, 0);
        assert_eq!(report.score, 0.0);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_lifetime_usage_spans_runs() {
        let provider = ScriptedProvider::new(vec![]);
        let validator = Validator::new(provider, CompletionConfig::default());
        let specs = vec![ValidationSpec::new("A", "a")];

        for _ in 0..2 {
            let report = validator
                .validate_structure(&untitled_page(), &specs)
                .await
                .unwrap();
            assert_eq!(report.usage.unwrap().requests, 1);
        }
        assert_eq!(validator.usage().requests, 2);
        assert_eq!(validator.usage().total_tokens(), 220);
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(matches!(
            Validator::builder().build(),
            Err(RuntimeError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_from_backend_unknown_name() {
        let registry = ProviderRegistry::new();
        let err = Validator::from_backend(&registry, "nope", &BackendConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Provider(ProviderError::NotConfigured(_))
        ));
    }
}
