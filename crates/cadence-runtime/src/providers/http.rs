//! HTTP plumbing shared by the adapters: status mapping and request sending.

use std::time::Duration;

use cadence_core::ProviderName;

use super::ProviderError;

/// Map a non-success HTTP status to the error taxonomy.
///
/// 401/403 are credential problems, 429 is a rate limit, 408 and 5xx are
/// transient. Any other 4xx means the backend rejected the request itself,
/// which a verbatim retry cannot fix.
pub fn status_error(
    provider: ProviderName,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    let detail = error_detail(body);
    match status {
        401 | 403 => ProviderError::auth(format!(
            "{} rejected the credential in {} (HTTP {}): {}",
            provider,
            provider.credential_env_var(),
            status,
            detail
        )),
        429 => ProviderError::RateLimited {
            provider,
            retry_after,
        },
        408 | 500..=599 => {
            ProviderError::Transient(format!("{} returned HTTP {}: {}", provider, status, detail))
        }
        _ => ProviderError::InvalidResponse(format!(
            "{} rejected the request (HTTP {}): {}",
            provider, status, detail
        )),
    }
}

/// Parse a `retry-after` header given in seconds. Values that are negative,
/// not finite or too large for a `Duration` are ignored.
pub(crate) fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    let secs: f64 = value?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// The backend's error message, when the body is a `{"error": {"message"}}`
/// document; otherwise the start of the raw body.
fn error_detail(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    if let Some(message) = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(|m| m.as_str())
    {
        return message.to_string();
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(200).collect()
}

#[cfg(any(feature = "anthropic", feature = "openai", feature = "gemini"))]
pub(crate) use transport::{client, post_json};

#[cfg(any(feature = "anthropic", feature = "openai", feature = "gemini"))]
mod transport {
    use super::*;
    use serde::Serialize;

    /// Build an HTTP client with a per-request timeout.
    pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transient(format!("could not build HTTP client: {}", e)))
    }

    /// POST a JSON body and return the success body as text.
    pub(crate) async fn post_json<T: Serialize + ?Sized>(
        client: &reqwest::Client,
        provider: ProviderName,
        url: &str,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<String, ProviderError> {
        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Transient(format!("{} request timed out", provider))
            } else {
                ProviderError::Transient(format!("{} request failed: {}", provider, e.without_url()))
            }
        })?;

        let status = response.status();
        let retry_after = parse_retry_after(
            response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok()),
        );

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(format!("{} response was cut off: {}", provider, e)))?;

        if !status.is_success() {
            return Err(status_error(provider, status.as_u16(), retry_after, &text));
        }
        Ok(text)
    }
}
