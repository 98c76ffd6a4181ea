//! OpenAI-compatible chat completions backends.
//!
//! One implementation serves three registry names that differ only in where
//! their key and endpoint come from:
//!
//! | backend     | key (after `--api-key`)                 | endpoint (after `--base-url`)                       |
//! |-------------|-----------------------------------------|-----------------------------------------------------|
//! | `openai`    | `OPENAI_API_KEY`, `GITHUB_TOKEN`        | `OPENAI_BASE_URL`, else `https://api.openai.com/v1` |
//!
//! An `openai` backend whose key came from `GITHUB_TOKEN` defaults to GitHub
//! Models instead, since that token is useless against api.openai.com.
//! | `github`    | `GITHUB_TOKEN`, `OPENAI_API_KEY`        | `OPENAI_BASE_URL`, else GitHub Models               |
//! | `nebulaone` | `NEBULAONE_API_KEY`, `OPENAI_API_KEY`   | `NEBULAONE_BASE_URL`, no default                    |

use super::{
    config::validate_base_url,
    factory::ProviderFactory,
    http,
    secrets::{ApiCredential, CredentialSource},
    BackendConfig, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const GITHUB_MODELS_BASE_URL: &str = "https://models.inference.ai.azure.com";

/// Which OpenAI-compatible service a backend talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavor {
    OpenAi,
    GitHub,
    NebulaOne,
}

impl OpenAiFlavor {
    pub const ALL: [OpenAiFlavor; 3] = [
        OpenAiFlavor::OpenAi,
        OpenAiFlavor::GitHub,
        OpenAiFlavor::NebulaOne,
    ];

    /// Registry name.
    pub fn name(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "openai",
            OpenAiFlavor::GitHub => "github",
            OpenAiFlavor::NebulaOne => "nebulaone",
        }
    }

    fn credential_name(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "OpenAI API key",
            OpenAiFlavor::GitHub => "GitHub token",
            OpenAiFlavor::NebulaOne => "NebulaOne API key",
        }
    }

    /// Environment variables consulted for the key, in order.
    pub fn key_env_vars(&self) -> &'static [&'static str] {
        match self {
            OpenAiFlavor::OpenAi => &["OPENAI_API_KEY", "GITHUB_TOKEN"],
            OpenAiFlavor::GitHub => &["GITHUB_TOKEN", "OPENAI_API_KEY"],
            OpenAiFlavor::NebulaOne => &["NEBULAONE_API_KEY", "OPENAI_API_KEY"],
        }
    }

    /// Environment variables consulted for the endpoint, in order.
    pub fn base_url_env_vars(&self) -> &'static [&'static str] {
        match self {
            OpenAiFlavor::OpenAi | OpenAiFlavor::GitHub => &["OPENAI_BASE_URL"],
            OpenAiFlavor::NebulaOne => &["NEBULAONE_BASE_URL"],
        }
    }

    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            OpenAiFlavor::OpenAi => Some(OPENAI_DEFAULT_BASE_URL),
            OpenAiFlavor::GitHub => Some(GITHUB_MODELS_BASE_URL),
            OpenAiFlavor::NebulaOne => None,
        }
    }

    /// Default endpoint given the variable the key was read from.
    pub fn default_base_url_for_key(&self, key_var: Option<&str>) -> Option<&'static str> {
        match (self, key_var) {
            (OpenAiFlavor::OpenAi, Some("GITHUB_TOKEN")) => Some(GITHUB_MODELS_BASE_URL),
            _ => self.default_base_url(),
        }
    }

    fn description(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "OpenAI chat completions",
            OpenAiFlavor::GitHub => "GitHub Models (OpenAI-compatible)",
            OpenAiFlavor::NebulaOne => "NebulaOne (OpenAI-compatible, requires a base URL)",
        }
    }
}

/// A chat completions backend.
pub struct OpenAiProvider {
    flavor: OpenAiFlavor,
    credential: ApiCredential,
    base_url: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("flavor", &self.flavor)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    /// Create a backend with an explicit key and endpoint.
    pub fn new(
        flavor: OpenAiFlavor,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            flavor,
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                flavor.credential_name(),
            ),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create from a [`BackendConfig`], falling back to the flavor's
    /// environment variables.
    pub fn from_config(flavor: OpenAiFlavor, config: &BackendConfig) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(
            config.api_key.as_ref(),
            flavor.key_env_vars(),
            flavor.credential_name(),
        )?;
        let base_url = config.resolve_base_url(
            flavor.name(),
            flavor.base_url_env_vars(),
            flavor.default_base_url_for_key(credential.env_var()),
        )?;

        Ok(Self {
            flavor,
            credential,
            base_url,
        })
    }

    pub fn flavor(&self) -> OpenAiFlavor {
        self.flavor
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u32,
}

fn into_completion(body: ChatResponse, requested_model: &str) -> Result<CompletionResponse, ProviderError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            cache_read_tokens: u.prompt_tokens_details.map_or(0, |d| d.cached_tokens),
            cache_creation_tokens: 0,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        model: body.model.unwrap_or_else(|| requested_model.to_string()),
        stop_reason: choice.finish_reason,
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        // Only expose the credential here, at the point of use
        let builder = http::client()
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .json(&request);

        let response = http::send(builder, config.timeout).await?;
        let body: ChatResponse = http::read_json(response, config.timeout).await?;
        into_completion(body, &config.model)
    }

    fn name(&self) -> &str {
        self.flavor.name()
    }
}

/// Factory for one OpenAI-compatible registry name.
pub struct OpenAiProviderFactory {
    flavor: OpenAiFlavor,
}

impl OpenAiProviderFactory {
    pub fn new(flavor: OpenAiFlavor) -> Self {
        Self { flavor }
    }
}

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        self.flavor.name()
    }

    fn create(&self, config: &BackendConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_config(self.flavor, config)?))
    }

    fn validate_config(&self, config: &BackendConfig) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config.api_key.as_ref(), self.flavor.key_env_vars()) {
            return Err(ProviderError::NotConfigured(format!(
                "{} required: pass --api-key or set {}",
                self.flavor.credential_name(),
                self.flavor.key_env_vars().join(" or ")
            )));
        }

        if let Some(url) = &config.base_url {
            validate_base_url(url.trim())?;
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        self.flavor.description()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let messages = vec![
            ChatMessage::system("You are a document validation expert."),
            ChatMessage::user("Document Structure: {}"),
        ];
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_tokens: 1024,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Document Structure: {}");
        assert_eq!(json["max_tokens"], 1024);
    }

    #[test]
    fn test_response_parsing() {
        let body: ChatResponse = serde_json::from_str(
            r#"{
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Result: FAIL\nConfidence: 0.7"},
                    "finish_reason": "stop"
                }],
                "usage": {
                    "prompt_tokens": 900,
                    "completion_tokens": 30,
                    "total_tokens": 930,
                    "prompt_tokens_details": {"cached_tokens": 768}
                }
            }"#,
        )
        .unwrap();

        let completion = into_completion(body, "gpt-4o-mini").unwrap();
        assert_eq!(completion.content, "Result: FAIL\nConfidence: 0.7");
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(completion.usage.total(), 930);
        assert_eq!(completion.usage.cache_read_tokens, 768);
        assert_eq!(completion.stop_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_response_without_usage_or_model() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": null}, "finish_reason": null}]}"#,
        )
        .unwrap();
        let completion = into_completion(body, "local-model").unwrap();
        assert_eq!(completion.content, "");
        assert_eq!(completion.model, "local-model");
        assert_eq!(completion.usage, TokenUsage::default());
    }

    #[test]
    fn test_response_without_choices_is_parse_error() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            into_completion(body, "m"),
            Err(ProviderError::ParseError(_))
        ));
    }

    #[test]
    fn test_flavor_defaults() {
        assert_eq!(OpenAiFlavor::OpenAi.default_base_url(), Some(OPENAI_DEFAULT_BASE_URL));
        assert_eq!(OpenAiFlavor::GitHub.default_base_url(), Some(GITHUB_MODELS_BASE_URL));
        assert_eq!(OpenAiFlavor::NebulaOne.default_base_url(), None);
        assert_eq!(OpenAiFlavor::GitHub.key_env_vars()[0], "GITHUB_TOKEN");
    }

    #[test]
    fn test_github_token_selects_github_models_endpoint() {
        let openai = OpenAiFlavor::OpenAi;
        assert_eq!(
            openai.default_base_url_for_key(Some("GITHUB_TOKEN")),
            Some(GITHUB_MODELS_BASE_URL)
        );
        assert_eq!(
            openai.default_base_url_for_key(Some("OPENAI_API_KEY")),
            Some(OPENAI_DEFAULT_BASE_URL)
        );
        assert_eq!(openai.default_base_url_for_key(None), Some(OPENAI_DEFAULT_BASE_URL));
        assert_eq!(
            OpenAiFlavor::NebulaOne.default_base_url_for_key(Some("OPENAI_API_KEY")),
            None
        );
    }

    #[test]
    fn test_from_config_explicit_values() {
        let config = BackendConfig::new("gpt-4o")
            .with_api_key("sk-config")
            .with_base_url("http://localhost:11434/v1/");
        let provider = OpenAiProvider::from_config(OpenAiFlavor::OpenAi, &config).unwrap();

        assert_eq!(provider.base_url, "http://localhost:11434/v1");
        assert_eq!(provider.credential.source(), CredentialSource::Config);
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_nebulaone_requires_base_url() {
        // Explicit key, so only the endpoint can be missing
        let config = BackendConfig::default().with_api_key("key");
        if std::env::var("NEBULAONE_BASE_URL").is_err() {
            let err = OpenAiProvider::from_config(OpenAiFlavor::NebulaOne, &config).unwrap_err();
            assert!(matches!(err, ProviderError::NotConfigured(_)));
            assert!(err.to_string().contains("NEBULAONE_BASE_URL"));
        }

        let config = config.with_base_url("https://nebula.example.com/v1");
        let provider = OpenAiProvider::from_config(OpenAiFlavor::NebulaOne, &config).unwrap();
        assert_eq!(provider.name(), "nebulaone");
    }

    #[test]
    fn test_factory_rejects_bad_base_url() {
        let factory = OpenAiProviderFactory::new(OpenAiFlavor::GitHub);
        let config = BackendConfig::default()
            .with_api_key("ghp_token")
            .with_base_url("models.example.com");
        assert!(factory.validate_config(&config).is_err());
        assert_eq!(factory.provider_type(), "github");
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret = "sk-proj-very-secret";
        let provider = OpenAiProvider::new(OpenAiFlavor::OpenAi, secret, OPENAI_DEFAULT_BASE_URL);
        let debug = format!("{:?}", provider);
        assert!(!debug.contains(secret), "API key was exposed in Debug output!");
        assert!(debug.contains("[REDACTED]"));
    }
}
