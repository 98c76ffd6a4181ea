//! Anthropic Messages API backend.
//!
//! Supports prompt caching: when a conversation carries the document in its
//! own leading turn, that turn is marked `ephemeral` so later specifications
//! reuse it.
//!
//! ## Security
//!
//! The API key lives in an [`ApiCredential`]. See the
//! [`secrets`](super::secrets) module for details.

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

/// Environment variable holding the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

pub const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-5";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude backend.
pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    /// Create a backend with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Anthropic API key",
            ),
            base_url: ANTHROPIC_DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from a [`BackendConfig`], falling back to `ANTHROPIC_API_KEY`.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(
            config.api_key.as_ref(),
            &[ANTHROPIC_API_KEY_ENV],
            "Anthropic API key",
        )?;
        let base_url =
            config.resolve_base_url("anthropic", &[], Some(ANTHROPIC_DEFAULT_BASE_URL))?;

        Ok(Self {
            credential,
            base_url,
        })
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Anthropic API request format.
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    type_: String,
}

impl CacheControl {
    fn ephemeral() -> Self {
        Self {
            type_: "ephemeral".to_string(),
        }
    }
}

/// Anthropic API response format.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

/// Convert chat messages to the Messages API shape.
///
/// System messages are lifted into `system`. With caching on, the first turn
/// gets a cache breakpoint, but only when more turns follow it.
fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> AnthropicRequest {
    let (system, turns): (Vec<ChatMessage>, Vec<ChatMessage>) =
        messages.into_iter().partition(ChatMessage::is_system);

    let system = if system.is_empty() {
        None
    } else {
        Some(
            system
                .into_iter()
                .map(|m| m.content)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    };

    let cache_first = config.prompt_caching && turns.len() > 1;
    let messages = turns
        .into_iter()
        .enumerate()
        .map(|(i, msg)| AnthropicMessage {
            role: msg.role,
            content: vec![ContentBlock::Text {
                text: msg.content,
                cache_control: (cache_first && i == 0).then(CacheControl::ephemeral),
            }],
        })
        .collect();

    AnthropicRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        system,
        messages,
        temperature: config.temperature,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        // Only expose the credential here, at the point of use
        let builder = http::client()
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);

        let response = http::send(builder, config.timeout).await?;
        let body: AnthropicResponse = http::read_json(response, config.timeout).await?;

        let content = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
                cache_read_tokens: body.usage.cache_read_input_tokens,
                cache_creation_tokens: body.usage.cache_creation_input_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for the `anthropic` backend.
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, config: &BackendConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &BackendConfig) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config.api_key.as_ref(), &[ANTHROPIC_API_KEY_ENV]) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: pass --api-key or set {}",
                ANTHROPIC_API_KEY_ENV
            )));
        }

        if let Some(url) = &config.base_url {
            validate_base_url(url.trim())?;
        }

        Ok(())
    }

    fn default_model(&self) -> &'static str {
        ANTHROPIC_DEFAULT_MODEL
    }

    fn description(&self) -> &'static str {
        "Anthropic Claude with prompt caching of the document context"
    }
}
