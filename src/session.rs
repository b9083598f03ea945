use serde::Serialize;

use crate::error::CouncilError;
use crate::pipeline::ReviewReport;
use crate::prompts;

pub const ARBITER_NAME: &str = "Arbiter";
pub const USER_NAME: &str = "User";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub speaker: String,
    pub content: String,
}

impl Message {
    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            speaker: ARBITER_NAME.to_string(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            speaker: USER_NAME.to_string(),
            content: content.into(),
        }
    }
}

/// State of one user session: conversation, completion flag, chat context.
///
/// Owned by the server and mutated only by a review run or a chat turn.
#[derive(Debug)]
pub struct Session {
    messages: Vec<Message>,
    analysis_complete: bool,
    chat_context: String,
    last_report: Option<ReviewReport>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            messages: vec![Message::assistant(prompts::GREETING)],
            analysis_complete: false,
            chat_context: String::new(),
            last_report: None,
        }
    }

    /// Back to the greeting state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_complete(&self) -> bool {
        self.analysis_complete
    }

    pub fn last_report(&self) -> Option<&ReviewReport> {
        self.last_report.as_ref()
    }

    /// Fails if a verdict already exists; a new review needs a reset first.
    pub fn ensure_open(&self) -> Result<(), CouncilError> {
        if self.analysis_complete {
            Err(CouncilError::AnalysisComplete)
        } else {
            Ok(())
        }
    }

    pub fn record_upload(&mut self, document_name: &str) {
        self.messages
            .push(Message::user(format!("Document submitted: {document_name}")));
    }

    pub fn record_review(&mut self, report: ReviewReport) {
        self.chat_context = format!(
            "ANALYSIS:\n{}\nVERDICT:\n{}",
            report.synthesis, report.verdict
        );
        self.analysis_complete = true;
        self.messages.push(Message::assistant(report.verdict.clone()));
        self.last_report = Some(report);
    }

    pub fn record_failure(&mut self, message: &str) {
        self.messages.push(Message::assistant(message));
    }

    /// Record the question and build the chat content for it.
    pub fn chat_prompt(&mut self, question: &str) -> Result<String, CouncilError> {
        if !self.analysis_complete {
            return Err(CouncilError::NoAnalysis);
        }
        self.messages.push(Message::user(question));
        Ok(format!(
            "CONTEXT:\n{}\nQUESTION: {question}",
            self.chat_context
        ))
    }

    pub fn record_reply(&mut self, reply: &str) {
        self.messages.push(Message::assistant(reply));
    }
}
