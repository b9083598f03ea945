//! Dispatch against a local mock HTTP server: status mapping, wire formats,
//! and retries driven by real responses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use council::config::{Config, ModelRoles, PipelineConfig};
use council::dispatch::ProviderRequest;
use council::dispatch::http::MAX_RESPONSE_BYTES;
use council::dispatch::registry::{ApiFormat, ModelEntry, Registry};
use council::error::{CouncilError, FailureKind};
use council::retry::{GenerationRequest, ResilientCaller, RetryPolicy};

const GEMINI_OK: &str = r#"{"candidates":[{"content":{"parts":[{"text":"done"}],"role":"model"},"finishReason":"STOP"}]}"#;
const OPENAI_OK: &str = r#"{"choices":[{"message":{"role":"assistant","content":"done"}}]}"#;

/// Read one HTTP request (headers plus `Content-Length` body).
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|l| {
                    let lower = l.to_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Serve the scripted raw replies, one connection each.
async fn mock_raw(replies: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        for reply in replies {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut socket).await;
            log.lock().unwrap().push(request);
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}"), seen)
}

fn reply(status: u16, body: &str) -> String {
    format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serve the scripted `(status, body)` responses, one connection each.
async fn mock_server(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
    mock_raw(responses.into_iter().map(|(s, b)| reply(s, b)).collect()).await
}

fn entry(base_url: String, api_format: ApiFormat) -> ModelEntry {
    ModelEntry {
        model_id: "gemini-2.0-flash".to_string(),
        provider: "gemini".to_string(),
        base_url,
        api_key: "test-key".to_string(),
        api_format,
        description: "mock".to_string(),
    }
}

fn registry(entry: ModelEntry) -> Registry {
    let mut models = HashMap::new();
    models.insert("gemini-2.0-flash".to_string(), entry);
    Registry::from_config(&Config {
        models,
        roles: ModelRoles::uniform("gemini-2.0-flash"),
        retry: RetryPolicy::default(),
        pipeline: PipelineConfig::default(),
    })
}

fn request(structured: bool) -> ProviderRequest {
    ProviderRequest {
        prompt: "X\n\n---\n\nY".to_string(),
        model: "gemini-2.0-flash".to_string(),
        deadline: Instant::now() + Duration::from_secs(10),
        structured,
    }
}

async fn single(status: u16, body: &'static str) -> (Result<String, CouncilError>, Vec<String>) {
    let (url, seen) = mock_server(vec![(status, body)]).await;
    let result = registry(entry(url, ApiFormat::Gemini))
        .query(&request(false))
        .await
        .map(|r| r.text);
    let requests = seen.lock().unwrap().clone();
    (result, requests)
}

#[tokio::test]
async fn gemini_success_extracts_text() {
    let (result, requests) = single(200, GEMINI_OK).await;

    assert_eq!(result.unwrap(), "done");
    let req = requests[0].to_lowercase();
    assert!(req.starts_with("post /models/gemini-2.0-flash:generatecontent"), "{req}");
    assert!(req.contains("x-goog-api-key: test-key"));
    assert!(!req.contains("responsemimetype"));
}

#[tokio::test]
async fn gemini_structured_requests_json_mime_type() {
    let (url, seen) = mock_server(vec![(200, GEMINI_OK)]).await;
    registry(entry(url, ApiFormat::Gemini))
        .query(&request(true))
        .await
        .unwrap();

    let req = seen.lock().unwrap()[0].clone();
    assert!(req.contains(r#""responseMimeType":"application/json""#), "{req}");
}

#[tokio::test]
async fn openai_success_uses_bearer_auth() {
    let (url, seen) = mock_server(vec![(200, OPENAI_OK)]).await;
    let result = registry(entry(format!("{url}/v1/chat/completions"), ApiFormat::OpenAi))
        .query(&request(true))
        .await
        .unwrap();

    assert_eq!(result.text, "done");
    assert_eq!(result.provider, "gemini");
    let req = seen.lock().unwrap()[0].clone();
    assert!(req.to_lowercase().contains("authorization: bearer test-key"));
    assert!(req.contains(r#""response_format":{"type":"json_object"}"#), "{req}");
}

#[tokio::test]
async fn status_429_is_rate_limited() {
    let (result, _) = single(429, r#"{"error":"slow down"}"#).await;
    let err = result.unwrap_err();
    assert!(matches!(err, CouncilError::RateLimited { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn quota_body_is_rate_limited() {
    let (result, _) = single(403, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#).await;
    assert!(matches!(result.unwrap_err(), CouncilError::RateLimited { .. }));
}

#[tokio::test]
async fn status_403_is_auth_failure() {
    let (result, _) = single(403, r#"{"error":"denied"}"#).await;
    let err = result.unwrap_err();
    assert!(matches!(err, CouncilError::AuthFailed { .. }));
    assert_eq!(err.kind(), FailureKind::PermanentServiceError);
}

#[tokio::test]
async fn status_503_is_unavailable() {
    let (result, _) = single(503, "overloaded").await;
    assert!(matches!(
        result.unwrap_err(),
        CouncilError::Unavailable { status: 503, .. }
    ));
}

#[tokio::test]
async fn status_400_is_permanent_upstream() {
    let (result, _) = single(400, "bad request body").await;
    let err = result.unwrap_err();
    assert!(matches!(err, CouncilError::Upstream { status: Some(400), .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn blocked_prompt_is_a_permanent_refusal() {
    let (result, _) = single(200, r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).await;
    let err = result.unwrap_err();
    assert!(matches!(err, CouncilError::Refused { .. }));
    assert_eq!(err.kind(), FailureKind::PermanentServiceError);
}

#[tokio::test]
async fn truncated_rate_limit_body_is_still_rate_limited() {
    let cut_off = "HTTP/1.1 429 Too Many Requests\r\nContent-Length: 500\r\nConnection: close\r\n\r\n{\"error\":".to_string();
    let (url, _) = mock_raw(vec![cut_off]).await;

    let err = registry(entry(url, ApiFormat::Gemini))
        .query(&request(false))
        .await
        .unwrap_err();

    assert!(matches!(err, CouncilError::RateLimited { .. }), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn oversized_success_body_is_rejected() {
    let text = "x".repeat(MAX_RESPONSE_BYTES);
    let body = format!(r#"{{"candidates":[{{"content":{{"parts":[{{"text":"{text}"}}]}}}}]}}"#);
    let (url, _) = mock_raw(vec![reply(200, &body)]).await;

    let err = registry(entry(url, ApiFormat::Gemini))
        .query(&request(false))
        .await
        .unwrap_err();

    match err {
        CouncilError::Upstream { message, status, .. } => {
            assert!(message.contains("response too large"), "{message}");
            assert_eq!(status, None);
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_deadline_never_connects() {
    let reg = registry(entry("http://127.0.0.1:9".to_string(), ApiFormat::Gemini));
    let mut req = request(false);
    req.deadline = Instant::now();

    let err = reg.query(&req).await.unwrap_err();
    assert!(matches!(err, CouncilError::Timeout(0)));
}

#[tokio::test]
async fn unknown_model_suggests_close_names() {
    let reg = registry(entry("http://127.0.0.1:9".to_string(), ApiFormat::Gemini));
    let mut req = request(false);
    req.model = "gemini".to_string();

    match reg.query(&req).await.unwrap_err() {
        CouncilError::ModelNotFound { suggestions, .. } => {
            assert_eq!(suggestions, vec!["gemini-2.0-flash".to_string()]);
        }
        other => panic!("expected ModelNotFound, got {other:?}"),
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        backoff_step: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn caller_retries_through_rate_limits() {
    let (url, seen) = mock_server(vec![(429, "{}"), (429, "{}"), (200, GEMINI_OK)]).await;
    let caller = ResilientCaller::new(
        registry(entry(url, ApiFormat::Gemini)),
        fast_policy(),
        Duration::from_secs(10),
    );

    let result = caller
        .generate_text(&GenerationRequest {
            instruction: "X",
            content: "Y",
            model: "gemini-2.0-flash",
        })
        .await
        .unwrap();

    assert_eq!(result.text, "done");
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn malformed_api_key_is_not_retried() {
    let mut bad = entry("http://127.0.0.1:9".to_string(), ApiFormat::Gemini);
    bad.api_key = "bad\nkey".to_string();
    let caller = ResilientCaller::new(registry(bad), fast_policy(), Duration::from_secs(10));
    let start = Instant::now();

    let err = caller
        .generate_text(&GenerationRequest {
            instruction: "X",
            content: "Y",
            model: "gemini-2.0-flash",
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CouncilError::InvalidRequest { .. }), "{err:?}");
    assert_eq!(err.kind(), FailureKind::PermanentServiceError);
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[tokio::test]
async fn unparseable_base_url_is_not_retried() {
    let caller = ResilientCaller::new(
        registry(entry("not a url".to_string(), ApiFormat::OpenAi)),
        fast_policy(),
        Duration::from_secs(10),
    );

    let err = caller
        .generate_text(&GenerationRequest {
            instruction: "X",
            content: "Y",
            model: "gemini-2.0-flash",
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CouncilError::InvalidRequest { .. }), "{err:?}");
}

#[tokio::test]
async fn refused_connection_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = registry(entry(format!("http://{addr}"), ApiFormat::Gemini))
        .query(&request(false))
        .await
        .unwrap_err();

    assert!(matches!(err, CouncilError::Request(_)), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn caller_stops_on_forbidden() {
    let (url, seen) = mock_server(vec![(403, "{}"), (200, GEMINI_OK)]).await;
    let caller = ResilientCaller::new(
        registry(entry(url, ApiFormat::Gemini)),
        fast_policy(),
        Duration::from_secs(10),
    );

    let err = caller
        .generate_text(&GenerationRequest {
            instruction: "X",
            content: "Y",
            model: "gemini-2.0-flash",
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CouncilError::AuthFailed { .. }));
    assert_eq!(seen.lock().unwrap().len(), 1);
}
