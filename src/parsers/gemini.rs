use serde::Deserialize;

use crate::error::CouncilError;
use crate::parsers::ResponseParser;

/// Finish reasons meaning the model declined to answer.
const REFUSAL_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

fn refused(reason: String) -> CouncilError {
    CouncilError::Refused {
        provider: "gemini".to_string(),
        reason,
    }
}

/// Parses a Gemini `generateContent` response.
/// Expected shape: `{"candidates": [{"content": {"parts": [{"text": "..."}]}}]}`
pub struct GeminiParser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl ResponseParser for GeminiParser {
    fn parse(&self, body: &[u8]) -> Result<String, CouncilError> {
        let response: GenerateContentResponse = serde_json::from_slice(body)
            .map_err(|e| CouncilError::SchemaParse(format!("gemini JSON parse failed: {e}")))?;

        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(refused(reason));
        }

        let Some(candidate) = response.candidates.into_iter().next() else {
            return Err(CouncilError::SchemaParse(
                "gemini response has no candidates".to_string(),
            ));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
            if REFUSAL_FINISH_REASONS.contains(&reason.as_str()) {
                return Err(refused(reason));
            }
            return Err(CouncilError::SchemaParse(format!(
                "gemini candidate has no text (finish reason: {reason})"
            )));
        }

        Ok(text)
    }
}
