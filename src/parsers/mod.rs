pub mod gemini;
pub mod openai;

use crate::error::CouncilError;

/// Trait for turning a provider's raw response body into the model's text.
/// Each wire format (Gemini, OpenAI-compatible) has its own envelope.
pub trait ResponseParser: Send + Sync {
    /// Parse raw body bytes into a text response string.
    fn parse(&self, body: &[u8]) -> Result<String, CouncilError>;
}
