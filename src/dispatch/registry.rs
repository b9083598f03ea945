use std::collections::HashMap;

use crate::config::Config;
use crate::dispatch::http::HttpDispatch;
use crate::dispatch::{Generate, ProviderRequest, ProviderResult};
use crate::error::CouncilError;

/// Wire format spoken by an HTTP backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ApiFormat {
    /// Google Generative Language `generateContent`.
    #[default]
    Gemini,
    /// OpenAI-compatible chat completions.
    OpenAi,
}

impl ApiFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }
}

#[derive(Clone)]
pub struct ModelEntry {
    pub model_id: String,
    pub provider: String,
    pub base_url: String,
    pub api_key: String,
    pub api_format: ApiFormat,
    /// One-line description shown by `listmodels`.
    pub description: String,
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("model_id", &self.model_id)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_format", &self.api_format)
            .field("api_key", &"[REDACTED]")
            .field("description", &self.description)
            .finish()
    }
}

pub struct Registry {
    models: HashMap<String, ModelEntry>,
    http: HttpDispatch,
}

impl Registry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            models: config.models.clone(),
            http: HttpDispatch::new(),
        }
    }

    pub fn get(&self, model: &str) -> Option<&ModelEntry> {
        self.models.get(model)
    }

    pub fn list_models(&self) -> Vec<(&String, &ModelEntry)> {
        self.models.iter().collect()
    }

    /// Suggest similar model names for a failed lookup (substring match).
    /// Sorted alphabetically, capped at 5 to keep error messages readable.
    pub fn suggest_models(&self, query: &str) -> Vec<String> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return vec![];
        }
        let mut suggestions: Vec<String> = self
            .models
            .keys()
            .filter(|k| {
                let k_lower = k.to_lowercase();
                k_lower.contains(&q) || q.contains(&k_lower)
            })
            .cloned()
            .collect();
        suggestions.sort();
        suggestions.truncate(5);
        suggestions
    }

    pub async fn query(&self, req: &ProviderRequest) -> Result<ProviderResult, CouncilError> {
        let entry = self.models.get(&req.model).ok_or_else(|| {
            let suggestions = self.suggest_models(&req.model);
            CouncilError::ModelNotFound {
                model: req.model.clone(),
                suggestions,
            }
        })?;

        // Substitute the provider's model_id for the configured model name.
        let resolved = ProviderRequest {
            model: entry.model_id.clone(),
            ..req.clone()
        };

        self.http
            .query_model(
                &resolved,
                &entry.provider,
                &entry.base_url,
                &entry.api_key,
                &entry.api_format,
            )
            .await
    }
}

impl Generate for Registry {
    async fn generate(&self, req: &ProviderRequest) -> Result<ProviderResult, CouncilError> {
        self.query(req).await
    }
}
