use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use tokio::sync::Mutex;

use crate::config::{Config, ModelRoles, PipelineConfig};
use crate::dispatch::registry::Registry;
use crate::pipeline::{ReviewPipeline, StageFailure};
use crate::prompts;
use crate::response::{ToolMetadata, ToolResponse};
use crate::retry::{GenerationRequest, ResilientCaller};
use crate::session::{Role, Session};
use crate::tools::ask::AskRequest;
use crate::tools::listmodels::{ListModelsResponse, ModelInfo};
use crate::tools::review::ReviewRequest;

#[derive(Clone)]
pub struct CouncilServer {
    caller: Arc<ResilientCaller<Registry>>,
    roles: Arc<ModelRoles>,
    pipeline: Arc<PipelineConfig>,
    // Held for a whole review or chat turn: one logical thread of control.
    session: Arc<Mutex<Session>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CouncilServer {
    pub fn new(config: Config) -> Self {
        let registry = Registry::from_config(&config);
        let caller = ResilientCaller::new(
            registry,
            config.retry.clone(),
            config.pipeline.request_timeout,
        );
        Self {
            caller: Arc::new(caller),
            roles: Arc::new(config.roles),
            pipeline: Arc::new(config.pipeline),
            session: Arc::new(Mutex::new(Session::new())),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "review",
        description = "Run the council review on a construction tender PDF: extraction, anonymization, three-lens panel, synthesis, and a final arbiter verdict flagged critical/warning/ok."
    )]
    async fn review(
        &self,
        Parameters(req): Parameters<ReviewRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.pdf_path.trim().is_empty() {
            return Err(McpError::invalid_params("pdf_path must not be empty", None));
        }
        let path = PathBuf::from(req.pdf_path.trim());
        let start = Instant::now();

        let mut session = self.session.lock().await;
        if let Err(e) = session.ensure_open() {
            let response = ToolResponse::error(
                e.user_message(),
                ToolMetadata::local("review", start.elapsed().as_secs_f64()),
            );
            return Ok(response.into_call_tool_result());
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| req.pdf_path.clone());
        session.record_upload(&name);

        let pipeline = ReviewPipeline::new(self.caller.as_ref(), &self.roles, &self.pipeline);
        let response = match pipeline.run_file(&path).await {
            Ok(report) => {
                let content = report.to_markdown();
                let metadata = ToolMetadata::for_model(
                    "review",
                    &report.arbiter_model,
                    &self.provider_of(&self.roles.arbiter),
                    start.elapsed().as_secs_f64(),
                );
                session.record_review(report);
                ToolResponse::markdown(content, metadata)
            }
            Err(failure) => {
                tracing::warn!(stage = %failure.stage, "review failed: {}", failure.error);
                let message = failure.user_message();
                session.record_failure(&message);
                let metadata = self.failure_metadata(&failure, start.elapsed().as_secs_f64());
                ToolResponse::error(message, metadata)
            }
        };

        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "ask",
        description = "Ask the arbiter a follow-up question about the verdict of this session's review."
    )]
    async fn ask(
        &self,
        Parameters(req): Parameters<AskRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.question.trim().is_empty() {
            return Err(McpError::invalid_params("question must not be empty", None));
        }
        let start = Instant::now();
        let model = self.roles.chat.clone();

        let mut session = self.session.lock().await;
        let content = match session.chat_prompt(req.question.trim()) {
            Ok(content) => content,
            Err(e) => {
                let response = ToolResponse::error(
                    e.user_message(),
                    ToolMetadata::local("ask", start.elapsed().as_secs_f64()),
                );
                return Ok(response.into_call_tool_result());
            }
        };

        let result = self
            .caller
            .generate_text(&GenerationRequest {
                instruction: prompts::CHAT,
                content: &content,
                model: &model,
            })
            .await;

        let response = match result {
            Ok(reply) => {
                session.record_reply(&reply.text);
                let metadata = ToolMetadata::for_model(
                    "ask",
                    &reply.model,
                    &reply.provider,
                    start.elapsed().as_secs_f64(),
                );
                ToolResponse::success(reply.text, metadata)
            }
            Err(e) => {
                tracing::warn!("chat turn failed: {e}");
                let message = format!("The arbiter could not answer: {}", e.user_message());
                session.record_reply(&message);
                let provider = e
                    .provider()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.provider_of(&model));
                ToolResponse::error(
                    message,
                    ToolMetadata::for_model("ask", &model, &provider, start.elapsed().as_secs_f64()),
                )
            }
        };

        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "reset",
        description = "Clear the session: conversation, verdict, and chat context. Required before reviewing another document."
    )]
    async fn reset(&self) -> Result<CallToolResult, McpError> {
        self.session.lock().await.reset();
        tracing::info!("session reset");
        let response = ToolResponse::success(
            prompts::GREETING.to_string(),
            ToolMetadata::local("reset", 0.0),
        );
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "history",
        description = "Show the session transcript and whether a verdict exists.",
        annotations(read_only_hint = true)
    )]
    async fn history(&self) -> Result<CallToolResult, McpError> {
        let session = self.session.lock().await;
        let mut content = String::new();
        for msg in session.messages() {
            let marker = match msg.role {
                Role::User => "›",
                Role::Assistant => "‹",
            };
            content.push_str(&format!("{marker} **{}**: {}\n\n", msg.speaker, msg.content));
        }
        match session.last_report() {
            Some(report) => content.push_str(&format!(
                "Verdict: {} {} for `{}`\n",
                report.verdict_flag.emoji(),
                report.verdict_flag,
                report.document
            )),
            None => content.push_str("No verdict yet.\n"),
        }

        let response = ToolResponse::markdown(content, ToolMetadata::local("history", 0.0));
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "listmodels",
        description = "List configured models and which review stages use them.",
        annotations(read_only_hint = true)
    )]
    async fn listmodels(&self) -> Result<CallToolResult, McpError> {
        let mut models: Vec<ModelInfo> = self
            .caller
            .backend()
            .list_models()
            .into_iter()
            .map(|(key, entry)| ModelInfo::new(key, entry, &self.roles))
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));

        let list = ListModelsResponse { models };
        let response =
            ToolResponse::markdown(list.to_markdown(), ToolMetadata::local("listmodels", 0.0));
        Ok(response.into_call_tool_result())
    }
}

impl CouncilServer {
    /// Metadata naming the model of the stage that stopped the run.
    fn failure_metadata(&self, failure: &StageFailure, duration_seconds: f64) -> ToolMetadata {
        let Some(model) = self.roles.for_stage(failure.stage) else {
            return ToolMetadata::local("review", duration_seconds);
        };
        let provider = failure
            .error
            .provider()
            .map(str::to_string)
            .unwrap_or_else(|| self.provider_of(model));
        ToolMetadata::for_model("review", model, &provider, duration_seconds)
    }

    fn provider_of(&self, model: &str) -> String {
        self.caller
            .backend()
            .get(model)
            .map(|e| e.provider.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[tool_handler]
impl ServerHandler for CouncilServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "council".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Council: automated risk review of construction tender documents.\n\n\
                 Workflow:\n\
                 1. Call `review` with the absolute path of the tender PDF.\n\
                 2. Read the verdict (critical / warning / ok) and the panel findings.\n\
                 3. Call `ask` for follow-up questions about the verdict.\n\
                 4. Call `reset` before reviewing another document.\n\n\
                 Rate limits are retried with backoff; a review that still fails reports the stage that stopped it."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
