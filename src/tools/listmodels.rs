use serde::Serialize;

use crate::config::ModelRoles;
use crate::dispatch::registry::ModelEntry;

#[derive(Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub provider: String,
    pub api_format: String,
    pub description: String,
    /// Stages served by this model ("panel", "arbiter", "chat").
    pub roles: Vec<&'static str>,
}

impl ModelInfo {
    pub fn new(key: &str, entry: &ModelEntry, roles: &ModelRoles) -> Self {
        let mut served = Vec::new();
        if roles.panel == key {
            served.push("panel");
        }
        if roles.arbiter == key {
            served.push("arbiter");
        }
        if roles.chat == key {
            served.push("chat");
        }
        Self {
            name: key.to_string(),
            provider: entry.provider.clone(),
            api_format: entry.api_format.as_str().to_string(),
            description: entry.description.clone(),
            roles: served,
        }
    }
}

#[derive(Serialize)]
pub struct ListModelsResponse {
    pub models: Vec<ModelInfo>,
}

impl ListModelsResponse {
    pub fn to_markdown(&self) -> String {
        if self.models.is_empty() {
            return "No models configured. Set GEMINI_API_KEY (or XAI_API_KEY / OPENROUTER_API_KEY).\n"
                .to_string();
        }
        let mut out = String::from("| model | provider | format | stages | description |\n");
        out.push_str("|---|---|---|---|---|\n");
        for m in &self.models {
            let stages = if m.roles.is_empty() {
                "-".to_string()
            } else {
                m.roles.join(", ")
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                m.name, m.provider, m.api_format, stages, m.description
            ));
        }
        out
    }
}
