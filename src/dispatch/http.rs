use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};

use crate::dispatch::registry::ApiFormat;
use crate::dispatch::{ProviderRequest, ProviderResult};
use crate::error::CouncilError;
use crate::parsers::gemini::GeminiParser;
use crate::parsers::openai::OpenAiParser;
use crate::parsers::ResponseParser;

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Marker Gemini puts in 4xx bodies when a quota is exhausted.
const QUOTA_MARKER: &str = "RESOURCE_EXHAUSTED";

pub struct HttpDispatch {
    client: Client,
}

impl Default for HttpDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDispatch {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }

    pub async fn query_model(
        &self,
        req: &ProviderRequest,
        provider: &str,
        base_url: &str,
        api_key: &str,
        api_format: &ApiFormat,
    ) -> Result<ProviderResult, CouncilError> {
        let start = Instant::now();

        // Check for expired deadline before making the request
        let timeout = req
            .deadline
            .checked_duration_since(Instant::now())
            .filter(|d| *d > Duration::from_millis(100))
            .ok_or(CouncilError::Timeout(0))?;

        let builder = match api_format {
            ApiFormat::Gemini => {
                let mut body = serde_json::json!({
                    "contents": [{"role": "user", "parts": [{"text": req.prompt}]}]
                });
                if req.structured {
                    body["generationConfig"] =
                        serde_json::json!({"responseMimeType": "application/json"});
                }
                let url = format!(
                    "{}/models/{}:generateContent",
                    base_url.trim_end_matches('/'),
                    req.model
                );
                self.client
                    .post(url)
                    .header("x-goog-api-key", api_key)
                    .json(&body)
            }
            ApiFormat::OpenAi => {
                let mut body = serde_json::json!({
                    "model": req.model,
                    "messages": [{"role": "user", "content": req.prompt}]
                });
                if req.structured {
                    body["response_format"] = serde_json::json!({"type": "json_object"});
                }
                self.client
                    .post(base_url)
                    .header("Authorization", format!("Bearer {api_key}"))
                    .json(&body)
            }
        };

        let response = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_send_error(provider, e, start))?;

        let status = response.status();

        if !status.is_success() {
            // A truncated error body must not hide the status.
            let error_bytes = response.bytes().await.unwrap_or_default();
            let capped = &error_bytes[..error_bytes.len().min(MAX_RESPONSE_BYTES)];
            let text = String::from_utf8_lossy(capped);
            return Err(classify_status(provider, status, &text));
        }

        let bytes = response.bytes().await.map_err(|e| CouncilError::Upstream {
            provider: provider.to_string(),
            message: format!("failed to read response body: {e}"),
            status: Some(status.as_u16()),
        })?;

        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(CouncilError::Upstream {
                provider: provider.to_string(),
                message: format!(
                    "response too large: {} bytes (max {})",
                    bytes.len(),
                    MAX_RESPONSE_BYTES
                ),
                status: None,
            });
        }

        let text = match api_format {
            ApiFormat::Gemini => GeminiParser.parse(&bytes)?,
            ApiFormat::OpenAi => OpenAiParser.parse(&bytes)?,
        };

        tracing::debug!(
            provider,
            model = %req.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "provider answered"
        );

        Ok(ProviderResult {
            text,
            model: req.model.clone(),
            provider: provider.to_string(),
        })
    }
}

/// Map a failed `send()` into the error taxonomy. Only transport failures
/// (connect, timeout, broken connection) stay transient.
fn classify_send_error(provider: &str, e: reqwest::Error, start: Instant) -> CouncilError {
    if e.is_timeout() {
        CouncilError::Timeout(start.elapsed().as_millis() as u64)
    } else if e.is_builder() || e.is_redirect() || e.is_status() {
        CouncilError::InvalidRequest {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    } else {
        CouncilError::Request(e)
    }
}

/// Map a non-success HTTP status into the error taxonomy.
///
/// This is the only place status codes and bodies are inspected; everything
/// downstream matches on the returned variant.
pub fn classify_status(provider: &str, status: StatusCode, body: &str) -> CouncilError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_client_error() && body.contains(QUOTA_MARKER))
    {
        return CouncilError::RateLimited {
            provider: provider.to_string(),
        };
    }

    if status.is_server_error() {
        return CouncilError::Unavailable {
            provider: provider.to_string(),
            status: status.as_u16(),
        };
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return CouncilError::AuthFailed {
            provider: provider.to_string(),
            message: format!("{status}"),
        };
    }

    CouncilError::Upstream {
        provider: provider.to_string(),
        message: format!("{status}: {body}"),
        status: Some(status.as_u16()),
    }
}
