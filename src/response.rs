use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Markdown,
}

/// Envelope every council tool answers with, serialized as the single text
/// content of the MCP result. Failures travel here, never as transport errors.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub status: Status,
    pub content: String,
    pub content_type: ContentType,
    pub metadata: ToolMetadata,
}

#[derive(Debug, Serialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    pub model_used: String,
    pub provider_used: String,
    #[serde(serialize_with = "serialize_seconds")]
    pub duration_seconds: f64,
}

// Millisecond precision; NaN and infinities become 0.
fn serialize_seconds<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    let secs = if v.is_finite() { (v * 1000.0).round() / 1000.0 } else { 0.0 };
    s.serialize_f64(secs)
}

impl ToolResponse {
    fn new(
        status: Status,
        content: String,
        content_type: ContentType,
        metadata: ToolMetadata,
    ) -> Self {
        Self {
            status,
            content,
            content_type,
            metadata,
        }
    }

    pub fn success(content: String, metadata: ToolMetadata) -> Self {
        Self::new(Status::Success, content, ContentType::Text, metadata)
    }

    pub fn markdown(content: String, metadata: ToolMetadata) -> Self {
        Self::new(Status::Success, content, ContentType::Markdown, metadata)
    }

    pub fn error(message: String, metadata: ToolMetadata) -> Self {
        Self::new(Status::Error, message, ContentType::Text, metadata)
    }

    pub fn into_call_tool_result(self) -> CallToolResult {
        let json = serde_json::to_string(&self).unwrap_or_else(|e| {
            serde_json::json!({
                "status": Status::Error,
                "content": format!("serialization failed: {e}"),
                "content_type": ContentType::Text,
                "metadata": {"tool_name": self.metadata.tool_name},
            })
            .to_string()
        });
        CallToolResult::success(vec![Content::text(json)])
    }
}

impl ToolMetadata {
    /// For tools answered from session state, without a model call.
    pub fn local(tool_name: &str, duration_seconds: f64) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            model_used: "none".to_string(),
            provider_used: "none".to_string(),
            duration_seconds,
        }
    }

    pub fn for_model(
        tool_name: &str,
        model: &str,
        provider: &str,
        duration_seconds: f64,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            model_used: model.to_string(),
            provider_used: provider.to_string(),
            duration_seconds,
        }
    }
}
