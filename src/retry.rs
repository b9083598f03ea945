//! Bounded retry around a [`Generate`] backend.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::dispatch::{Generate, ProviderRequest, ProviderResult};
use crate::error::{CouncilError, FailureKind};
use crate::structured::{self, Structured};

/// Separator between the instruction and the content of a composed prompt.
pub const PROMPT_SEPARATOR: &str = "\n\n---\n\n";

/// Retry configuration for generation calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first. Clamped to at least 1.
    pub max_attempts: u32,
    /// Backoff added per failed attempt.
    pub backoff_step: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step: Duration::from_secs(20),
            max_backoff: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Linear backoff after the given 1-based failed attempt, capped.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_step
            .saturating_mul(attempt.max(1))
            .min(self.max_backoff)
    }
}

/// Per-call retry bookkeeping. Never shared between calls.
#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    last_backoff: Duration,
}

/// One instruction/content pair addressed to a model.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub instruction: &'a str,
    pub content: &'a str,
    pub model: &'a str,
}

impl GenerationRequest<'_> {
    pub fn compose(&self) -> String {
        format!("{}{PROMPT_SEPARATOR}{}", self.instruction, self.content)
    }
}

/// Calls a backend, retrying transient failures with linear backoff.
pub struct ResilientCaller<G> {
    backend: G,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl<G: Generate> ResilientCaller<G> {
    pub fn new(backend: G, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            backend,
            policy,
            attempt_timeout,
        }
    }

    pub fn backend(&self) -> &G {
        &self.backend
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Free-text call. Returns the model's text unmodified.
    pub async fn generate_text(
        &self,
        req: &GenerationRequest<'_>,
    ) -> Result<ProviderResult, CouncilError> {
        self.call(req, false).await
    }

    /// Structured call. A reply that cannot be decoded is not retried: it is
    /// replaced by the fallback record and flagged as such.
    pub async fn generate_structured(
        &self,
        req: &GenerationRequest<'_>,
    ) -> Result<Structured, CouncilError> {
        match self.call(req, true).await {
            Ok(result) => Ok(structured::decode_or_fallback(&result.text)),
            Err(e) if e.kind() == FailureKind::ParseFailure => {
                warn!(model = req.model, reason = %e, "unreadable structured reply, using fallback");
                Ok(Structured {
                    record: structured::fallback_record(),
                    fallback_used: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn call(
        &self,
        req: &GenerationRequest<'_>,
        structured: bool,
    ) -> Result<ProviderResult, CouncilError> {
        let prompt = req.compose();
        let max_attempts = self.policy.attempts();
        let mut state = RetryState::default();

        loop {
            state.attempts += 1;
            let provider_req = ProviderRequest {
                prompt: prompt.clone(),
                model: req.model.to_string(),
                deadline: Instant::now() + self.attempt_timeout,
                structured,
            };
            debug!(model = req.model, attempt = state.attempts, "dispatching generation");

            let err = match self.backend.generate(&provider_req).await {
                Ok(result) => {
                    if state.attempts > 1 {
                        debug!(attempt = state.attempts, "generation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                warn!(
                    model = req.model,
                    attempt = state.attempts,
                    reason = err.reason(),
                    "generation failed, not retryable"
                );
                return Err(err);
            }

            if state.attempts >= max_attempts {
                warn!(
                    model = req.model,
                    attempts = state.attempts,
                    "all retry attempts exhausted"
                );
                return Err(CouncilError::RetriesExhausted {
                    attempts: state.attempts,
                    last: Box::new(err),
                });
            }

            let backoff = self
                .policy
                .backoff_for_attempt(state.attempts)
                .max(state.last_backoff);
            warn!(
                model = req.model,
                attempt = state.attempts,
                backoff_ms = backoff.as_millis() as u64,
                reason = err.reason(),
                "transient failure, backing off"
            );
            sleep(backoff).await;
            state.last_backoff = backoff;
        }
    }
}
