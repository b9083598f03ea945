use schemars::JsonSchema;
use serde::Deserialize;

/// Follow-up question about the last verdict.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AskRequest {
    /// The question for the arbiter. Requires a completed `review` in this session.
    pub question: String,
}
