use serde::Deserialize;

use crate::error::CouncilError;
use crate::parsers::ResponseParser;

/// Parses an OpenAI-compatible chat completion.
pub struct OpenAiParser;

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

impl ResponseParser for OpenAiParser {
    fn parse(&self, body: &[u8]) -> Result<String, CouncilError> {
        let completion: ChatCompletion = serde_json::from_slice(body)
            .map_err(|e| CouncilError::SchemaParse(format!("failed to parse response: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                CouncilError::SchemaParse("empty choices or null content".to_string())
            })
    }
}
