//! HTTP plumbing shared by the network backends.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use std::time::Duration;

use super::ProviderError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body echoed back in an error message.
const MAX_ERROR_CHARS: usize = 500;

/// Process-wide client; the per-request timeout is set on each request.
pub(super) fn client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default()
    })
}

/// Send a request, turning transport failures and non-2xx statuses into
/// [`ProviderError`]s.
pub(super) async fn send(
    request: RequestBuilder,
    timeout: Duration,
) -> Result<Response, ProviderError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| transport_error(e, timeout))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    Err(status_error(status.as_u16(), retry_after, &body))
}

/// Read a successful response body as JSON.
pub(super) async fn read_json<T: DeserializeOwned>(
    response: Response,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(e, timeout))?;
    serde_json::from_str(&body).map_err(|e| ProviderError::ParseError(e.to_string()))
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::HttpError(error.to_string())
    }
}

pub(super) fn status_error(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after },
        401 | 403 => ProviderError::AuthError(error_message(status, body)),
        _ => ProviderError::ApiError {
            status,
            message: error_message(status, body),
        },
    }
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"message": ..}`; anything else is echoed, truncated.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<JsonValue>(body) {
        let message = json["error"]["message"]
            .as_str()
            .or_else(|| json["error"].as_str())
            .or_else(|| json["message"].as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {}", status);
    }
    body.chars().take(MAX_ERROR_CHARS).collect()
}
