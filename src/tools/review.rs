use schemars::JsonSchema;
use serde::Deserialize;

/// Request to run the council review on a tender document.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReviewRequest {
    /// Absolute path to the tender PDF (DCE) to review.
    pub pdf_path: String,
}
