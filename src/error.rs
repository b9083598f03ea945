use thiserror::Error;

/// How a failure should be treated by the resilient call and the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rate limit, quota, or temporary unavailability. Retried with backoff.
    TransientRateLimit,
    /// The service answered but the answer could not be decoded.
    ParseFailure,
    /// Bad credentials, bad request, local failures. Never retried.
    PermanentServiceError,
    /// Transient failures outlasted the attempt budget.
    RetriesExhausted,
}

#[derive(Debug, Error)]
pub enum CouncilError {
    #[error("model not found: {model}")]
    ModelNotFound {
        model: String,
        suggestions: Vec<String>,
    },

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("{provider} unavailable ({status})")]
    Unavailable { provider: String, status: u16 },

    #[error("upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("auth failed for {provider}: {message}")]
    AuthFailed { provider: String, message: String },

    /// The request could not be built (bad header value, bad URL). Retrying
    /// sends the same malformed request again.
    #[error("invalid request for {provider}: {message}")]
    InvalidRequest { provider: String, message: String },

    #[error("{provider} refused the prompt: {reason}")]
    Refused { provider: String, reason: String },

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<CouncilError>,
    },

    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no completed analysis in this session")]
    NoAnalysis,

    #[error("analysis already completed; reset the session first")]
    AnalysisComplete,

    #[error("{0}")]
    Other(String),
}

impl CouncilError {
    /// Extract provider name from structured error variants.
    /// Returns None for variants that don't carry provider context.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::RateLimited { provider }
            | Self::Unavailable { provider, .. }
            | Self::Upstream { provider, .. }
            | Self::AuthFailed { provider, .. }
            | Self::InvalidRequest { provider, .. }
            | Self::Refused { provider, .. } => Some(provider),
            Self::RetriesExhausted { last, .. } => last.provider(),
            _ => None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. }
            | Self::Unavailable { .. }
            | Self::Timeout(_)
            | Self::Request(_) => FailureKind::TransientRateLimit,
            Self::SchemaParse(_) => FailureKind::ParseFailure,
            Self::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
            _ => FailureKind::PermanentServiceError,
        }
    }

    /// Returns true for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::TransientRateLimit
    }

    /// Short machine-readable reason, used in logs and persisted reports.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unavailable { .. } => "unavailable",
            Self::AuthFailed { .. } => "auth_failed",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Refused { .. } => "refused",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::SchemaParse(_) => "parse_error",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::ToolNotFound(_) | Self::Extraction(_) => "extraction",
            _ => "error",
        }
    }

    /// Produce a sanitized error message safe for returning to MCP clients.
    /// Does not leak internal URLs, connection details, or API keys.
    pub fn user_message(&self) -> String {
        match self {
            Self::ModelNotFound { model, suggestions } => {
                if suggestions.is_empty() {
                    format!("model not found: {model}")
                } else {
                    format!(
                        "model not found: {model}. Did you mean: {}?",
                        suggestions.join(", ")
                    )
                }
            }
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::RateLimited { provider } => {
                format!("rate limited by {provider}, try again shortly")
            }
            Self::Unavailable { provider, status } => {
                format!("{provider} is temporarily unavailable (HTTP {status})")
            }
            Self::Upstream {
                provider, message, ..
            } => format!("upstream error from {provider}: {message}"),
            Self::AuthFailed { provider, message } => {
                format!("authentication failed for {provider}: {message}")
            }
            Self::InvalidRequest { provider, .. } => {
                format!("the request to {provider} is malformed; check the model configuration")
            }
            Self::Refused { provider, reason } => {
                format!("{provider} refused to review this content ({reason})")
            }
            Self::SchemaParse(_) => "failed to parse provider response".to_string(),
            Self::Request(_) => "request to provider failed".to_string(),
            Self::RetriesExhausted { attempts, last } => format!(
                "gave up after {attempts} attempts: {}",
                last.user_message()
            ),
            Self::ToolNotFound(tool) => format!("external tool not found: {tool}"),
            Self::Extraction(msg) => format!("could not read the document: {msg}"),
            Self::Io(_) => "could not read the document".to_string(),
            Self::NoAnalysis => {
                "no verdict yet: submit a tender document with `review` first".to_string()
            }
            Self::AnalysisComplete => {
                "a verdict already exists for this session: call `reset` before a new review"
                    .to_string()
            }
            Self::Other(msg) => msg.clone(),
        }
    }
}
