use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use council::anonymize::{EMAIL_PLACEHOLDER, PHONE_PLACEHOLDER, anonymize};
use council::config::{Config, ModelRoles, PipelineConfig, read_file_config};
use council::dispatch::registry::{ApiFormat, ModelEntry};
use council::error::CouncilError;
use council::response::{ToolMetadata, ToolResponse};
use council::retry::RetryPolicy;
use council::server::CouncilServer;
use council::tools::listmodels::{ListModelsResponse, ModelInfo};
use rmcp::ServerHandler;

fn gemini_entry() -> ModelEntry {
    ModelEntry {
        model_id: "gemini-2.0-flash".to_string(),
        provider: "gemini".to_string(),
        base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        api_key: "super-secret-key".to_string(),
        api_format: ApiFormat::Gemini,
        description: "Fast general model".to_string(),
    }
}

fn config() -> Config {
    let mut models = HashMap::new();
    models.insert("gemini-2.0-flash".to_string(), gemini_entry());
    Config {
        models,
        roles: ModelRoles::uniform("gemini-2.0-flash"),
        retry: RetryPolicy::default(),
        pipeline: PipelineConfig::default(),
    }
}

#[test]
fn tool_response_success_serializes_correctly() {
    let response = ToolResponse::markdown(
        "## 🔴 Council verdict: critical".to_string(),
        ToolMetadata {
            tool_name: "review".to_string(),
            model_used: "gemini-2.0-flash".to_string(),
            provider_used: "gemini".to_string(),
            duration_seconds: 42.5,
        },
    );

    let parsed: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();

    assert_eq!(parsed["status"], "success");
    assert_eq!(parsed["content_type"], "markdown");
    assert_eq!(parsed["metadata"]["tool_name"], "review");
    assert_eq!(parsed["metadata"]["provider_used"], "gemini");
    assert!(parsed["metadata"]["duration_seconds"].is_f64());
}

#[test]
fn tool_response_error_clamps_non_finite_duration() {
    let response = ToolResponse::error(
        "no verdict yet".to_string(),
        ToolMetadata::local("ask", f64::NAN),
    );

    let parsed: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();

    assert_eq!(parsed["status"], "error");
    assert_eq!(parsed["metadata"]["model_used"], "none");
    assert_eq!(parsed["metadata"]["duration_seconds"], 0.0);
}

#[test]
fn model_entry_debug_redacts_api_key() {
    let debug = format!("{:?}", gemini_entry());
    assert!(!debug.contains("super-secret-key"));
    assert!(debug.contains("[REDACTED]"));
}

#[test]
fn listmodels_shows_served_stages() {
    let entry = gemini_entry();
    let roles = ModelRoles {
        panel: "gemini-2.0-flash".to_string(),
        arbiter: "gemini-2.5-pro".to_string(),
        chat: "gemini-2.0-flash".to_string(),
    };
    let info = ModelInfo::new("gemini-2.0-flash", &entry, &roles);
    assert_eq!(info.roles, vec!["panel", "chat"]);

    let markdown = ListModelsResponse { models: vec![info] }.to_markdown();
    assert!(markdown.contains("| gemini-2.0-flash | gemini | gemini | panel, chat |"));

    let empty = ListModelsResponse { models: vec![] }.to_markdown();
    assert!(empty.contains("GEMINI_API_KEY"));
}

#[test]
fn file_config_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[retry]
max_attempts = 3
backoff_step_secs = 5

[pipeline]
max_pages = 10
persist_reports = false

[models]
arbiter = "gemini-2.5-pro"
"#
    )
    .unwrap();

    let mut config = config();
    config.apply(read_file_config(file.path()).expect("config parses"));

    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.backoff_step, Duration::from_secs(5));
    assert_eq!(config.retry.max_backoff, Duration::from_secs(120));
    assert_eq!(config.pipeline.max_pages, 10);
    assert!(!config.pipeline.persist_reports);
    assert_eq!(config.pipeline.max_content_chars, 60_000);
    assert_eq!(config.roles.panel, "gemini-2.0-flash");
    assert_eq!(config.roles.arbiter, "gemini-2.5-pro");
}

#[test]
fn zero_attempts_in_file_clamps_to_one() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[retry]\nmax_attempts = 0").unwrap();

    let mut config = config();
    config.apply(read_file_config(file.path()).unwrap());
    assert_eq!(config.retry.max_attempts, 1);
}

#[test]
fn malformed_or_missing_config_is_ignored() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[retry]\nmax_atempts = 3").unwrap();
    assert!(read_file_config(file.path()).is_none());

    assert!(read_file_config(std::path::Path::new("/nonexistent/council.toml")).is_none());
}

#[test]
fn anonymize_hides_emails_and_french_phones() {
    let text = "Write to marie.curie@ville-exemple.fr or call 01 23 45 67 89, \
                +33 6 12 34 56 78, 04.56.78.90.12. Lot 3 costs 1250000 EUR.";
    let out = anonymize(text);

    assert_eq!(out.matches(EMAIL_PLACEHOLDER).count(), 1);
    assert_eq!(out.matches(PHONE_PLACEHOLDER).count(), 3);
    assert!(!out.contains("marie.curie"));
    assert!(out.contains("Lot 3 costs 1250000 EUR."));
}

#[test]
fn user_messages_do_not_leak_internals() {
    let err = CouncilError::RetriesExhausted {
        attempts: 5,
        last: Box::new(CouncilError::RateLimited {
            provider: "gemini".to_string(),
        }),
    };
    assert_eq!(err.provider(), Some("gemini"));
    assert_eq!(
        err.user_message(),
        "gave up after 5 attempts: rate limited by gemini, try again shortly"
    );
    assert!(CouncilError::NoAnalysis.user_message().contains("review"));
    assert!(CouncilError::AnalysisComplete.user_message().contains("reset"));
}

#[test]
fn server_identifies_itself() {
    let server = CouncilServer::new(config());
    let info = server.get_info();
    assert_eq!(info.server_info.name, "council");
    assert!(info.instructions.unwrap().contains("review"));
}
