use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::registry::{ApiFormat, ModelEntry};
use crate::pipeline::Stage;
use crate::retry::RetryPolicy;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_CONFIG_FILE: &str = "council.toml";

/// Limits and switches for a review run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Pages read from the PDF; later pages are ignored.
    pub max_pages: u32,
    /// Characters of anonymized document text sent to the panel.
    pub max_content_chars: usize,
    /// Deadline for one generation attempt.
    pub request_timeout: Duration,
    /// Deadline for one `pdfinfo`/`pdftotext` invocation.
    pub extract_timeout: Duration,
    pub persist_reports: bool,
    pub reports_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pages: crate::extract::DEFAULT_MAX_PAGES,
            max_content_chars: 60_000,
            request_timeout: Duration::from_secs(300),
            extract_timeout: Duration::from_secs(30),
            persist_reports: true,
            reports_dir: PathBuf::from(".council/reviews"),
        }
    }
}

/// Which configured model serves each stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoles {
    pub panel: String,
    pub arbiter: String,
    pub chat: String,
}

impl ModelRoles {
    pub fn uniform(model: &str) -> Self {
        Self {
            panel: model.to_string(),
            arbiter: model.to_string(),
            chat: model.to_string(),
        }
    }

    /// Model called by a review stage; `None` for the local stages.
    pub fn for_stage(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Panel => Some(&self.panel),
            Stage::Arbiter => Some(&self.arbiter),
            Stage::Intake | Stage::Anonymize | Stage::Synthesis => None,
        }
    }
}

pub struct Config {
    pub models: HashMap<String, ModelEntry>,
    pub roles: ModelRoles,
    pub retry: RetryPolicy,
    pub pipeline: PipelineConfig,
}

/// On-disk overrides (`council.toml`). Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub models: ModelsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub backoff_step_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    pub max_pages: Option<u32>,
    pub max_content_chars: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub extract_timeout_secs: Option<u64>,
    pub persist_reports: Option<bool>,
    pub reports_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsSection {
    pub panel: Option<String>,
    pub arbiter: Option<String>,
    pub chat: Option<String>,
}

impl Config {
    /// Environment first, then the TOML file named by `COUNCIL_CONFIG`
    /// (or `council.toml` in the working directory) on top.
    pub fn load() -> Self {
        let mut config = Self::from_env();
        let path = env::var("COUNCIL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        if let Some(file) = read_file_config(&path) {
            config.apply(file);
        }
        config
    }

    pub fn from_env() -> Self {
        let gemini_key = env::var("GEMINI_API_KEY").ok();
        let xai_key = env::var("XAI_API_KEY").ok();
        let openrouter_key = env::var("OPENROUTER_API_KEY").ok();

        let mut models = HashMap::new();

        if let Some(key) = gemini_key {
            let base_url = "https://generativelanguage.googleapis.com/v1beta".to_string();
            for (id, description) in [
                ("gemini-2.0-flash", "Fast general model, default for every stage"),
                ("gemini-2.5-pro", "Slower, deeper reading of long tenders"),
            ] {
                models.insert(
                    id.to_string(),
                    ModelEntry {
                        model_id: id.to_string(),
                        provider: "gemini".to_string(),
                        base_url: base_url.clone(),
                        api_key: key.clone(),
                        api_format: ApiFormat::Gemini,
                        description: description.to_string(),
                    },
                );
            }
        } else {
            tracing::warn!("GEMINI_API_KEY not set, gemini models unavailable");
        }

        if let Some(key) = xai_key {
            models.insert(
                "grok-4-1-fast-reasoning".to_string(),
                ModelEntry {
                    model_id: "grok-4-1-fast-reasoning".to_string(),
                    provider: "xai".to_string(),
                    base_url: "https://api.x.ai/v1/chat/completions".to_string(),
                    api_key: key,
                    api_format: ApiFormat::OpenAi,
                    description: "OpenAI-compatible alternative backend".to_string(),
                },
            );
        } else {
            tracing::debug!("XAI_API_KEY not set, grok models unavailable");
        }

        if let Some(key) = openrouter_key {
            models.insert(
                "moonshotai/kimi-k2.5".to_string(),
                ModelEntry {
                    model_id: "moonshotai/kimi-k2.5".to_string(),
                    provider: "openrouter".to_string(),
                    base_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
                    api_key: key,
                    api_format: ApiFormat::OpenAi,
                    description: "OpenAI-compatible alternative backend via OpenRouter"
                        .to_string(),
                },
            );
        } else {
            tracing::debug!("OPENROUTER_API_KEY not set, openrouter models unavailable");
        }

        if models.is_empty() {
            tracing::error!("no models configured: reviews will fail until an API key is set");
        }

        let default_model = env::var("COUNCIL_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| pick_default_model(&models));

        Config {
            models,
            roles: ModelRoles::uniform(&default_model),
            retry: RetryPolicy::default(),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Overlay file settings on top of the current values.
    pub fn apply(&mut self, file: FileConfig) {
        let FileConfig {
            retry,
            pipeline,
            models,
        } = file;

        if let Some(n) = retry.max_attempts {
            self.retry.max_attempts = n.max(1);
        }
        if let Some(s) = retry.backoff_step_secs {
            self.retry.backoff_step = Duration::from_secs(s);
        }
        if let Some(s) = retry.max_backoff_secs {
            self.retry.max_backoff = Duration::from_secs(s);
        }

        let p = &mut self.pipeline;
        if let Some(n) = pipeline.max_pages {
            p.max_pages = n.max(1);
        }
        if let Some(n) = pipeline.max_content_chars {
            p.max_content_chars = n;
        }
        if let Some(s) = pipeline.request_timeout_secs {
            p.request_timeout = Duration::from_secs(s);
        }
        if let Some(s) = pipeline.extract_timeout_secs {
            p.extract_timeout = Duration::from_secs(s);
        }
        if let Some(b) = pipeline.persist_reports {
            p.persist_reports = b;
        }
        if let Some(dir) = pipeline.reports_dir {
            p.reports_dir = dir;
        }

        if let Some(m) = models.panel {
            self.roles.panel = m;
        }
        if let Some(m) = models.arbiter {
            self.roles.arbiter = m;
        }
        if let Some(m) = models.chat {
            self.roles.chat = m;
        }
    }
}

/// Parse a config file. Missing file → None; malformed file → warning, None.
pub fn read_file_config(path: &Path) -> Option<FileConfig> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot read config file: {e}");
            return None;
        }
    };
    match toml::from_str(&text) {
        Ok(file) => {
            tracing::info!(path = %path.display(), "loaded config file");
            Some(file)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring malformed config file: {e}");
            None
        }
    }
}

/// The gemini default if present, otherwise the first configured name.
fn pick_default_model(models: &HashMap<String, ModelEntry>) -> String {
    if models.contains_key(DEFAULT_MODEL) || models.is_empty() {
        return DEFAULT_MODEL.to_string();
    }
    let mut names: Vec<&String> = models.keys().collect();
    names.sort();
    names
        .first()
        .map(|s| (*s).clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}
