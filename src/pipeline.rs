use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

use crate::anonymize::{anonymize, truncate_chars};
use crate::config::{ModelRoles, PipelineConfig};
use crate::dispatch::Generate;
use crate::error::CouncilError;
use crate::extract::{ExtractedDocument, PdfExtractor};
use crate::prompts;
use crate::retry::{GenerationRequest, ResilientCaller};
use crate::structured::{Finding, Flag, PANEL_KEYS, StructuredRecord};
use crate::verdict;

static PERSIST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One sequential step of a review run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Anonymize,
    Panel,
    Synthesis,
    Arbiter,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Anonymize => "anonymize",
            Self::Panel => "panel",
            Self::Synthesis => "synthesis",
            Self::Arbiter => "arbiter",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run stopped at `stage`.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: CouncilError,
}

impl StageFailure {
    fn new(stage: Stage, error: CouncilError) -> Self {
        Self { stage, error }
    }

    /// Terminal message shown to the user for this run.
    pub fn user_message(&self) -> String {
        format!(
            "Review stopped at the {} stage: {}",
            self.stage,
            self.error.user_message()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: u64,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    pub document: String,
    pub sha256: String,
    pub total_pages: u32,
    pub pages_read: u32,
    /// Characters of anonymized text sent to the panel.
    pub content_chars: usize,
    pub content_truncated: bool,
    pub panel_model: String,
    pub panel: StructuredRecord,
    pub panel_fallback: bool,
    pub synthesis: String,
    pub arbiter_model: String,
    pub verdict: String,
    pub verdict_flag: Flag,
    pub timings: Vec<StageTiming>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl ReviewReport {
    pub fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {} Council verdict: {}\n\n",
            self.verdict_flag.emoji(),
            self.verdict_flag
        );
        out.push_str(&format!(
            "Document: `{}` ({} of {} pages read)\n\n",
            self.document, self.pages_read, self.total_pages
        ));

        out.push_str("### Panel\n\n");
        if self.panel_fallback {
            out.push_str("_The panel reply could not be decoded; placeholders are shown._\n\n");
        }
        for (lens, finding) in ordered_findings(&self.panel) {
            out.push_str(&format!(
                "- **{lens}** {} {}\n",
                finding.flag.emoji(),
                finding.analysis.replace('\n', " ")
            ));
        }

        out.push_str("\n### Decision\n\n");
        out.push_str(&self.verdict);
        out.push('\n');

        if let Some(ref file) = self.report_file {
            out.push_str(&format!("\nFull report: `{file}`\n"));
        }
        if let Some(ref err) = self.persist_error {
            out.push_str(&format!("\nReport not saved: {err}\n"));
        }
        out
    }
}

/// Panel lenses first in their fixed order, then any extra keys.
fn ordered_findings(record: &StructuredRecord) -> Vec<(&str, &Finding)> {
    let mut out: Vec<(&str, &Finding)> = PANEL_KEYS
        .iter()
        .filter_map(|k| record.get(k).map(|f| (*k, f)))
        .collect();
    out.extend(
        record
            .iter()
            .filter(|(k, _)| !PANEL_KEYS.contains(&k.as_str()))
            .map(|(k, f)| (k.as_str(), f)),
    );
    out
}

/// Compile the panel record into the arbiter's input.
pub fn synthesize(panel: &StructuredRecord) -> String {
    let data = serde_json::to_string(panel).unwrap_or_default();
    format!("{}\nTechnical data: {data}", prompts::SYNTHESIS_HEADING)
}

/// Runs the five stages strictly in order, each consuming the previous output.
pub struct ReviewPipeline<'a, G> {
    caller: &'a ResilientCaller<G>,
    roles: &'a ModelRoles,
    limits: &'a PipelineConfig,
}

impl<'a, G: Generate> ReviewPipeline<'a, G> {
    pub fn new(
        caller: &'a ResilientCaller<G>,
        roles: &'a ModelRoles,
        limits: &'a PipelineConfig,
    ) -> Self {
        Self {
            caller,
            roles,
            limits,
        }
    }

    /// Extract the PDF at `path`, then review it.
    pub async fn run_file(&self, path: &Path) -> Result<ReviewReport, StageFailure> {
        let start = Instant::now();
        tracing::info!(stage = %Stage::Intake, path = %path.display(), "stage started");
        let extractor = PdfExtractor::new(self.limits.max_pages, self.limits.extract_timeout);
        let doc = extractor
            .extract(path)
            .await
            .map_err(|e| StageFailure::new(Stage::Intake, e))?;
        let intake = StageTiming {
            stage: Stage::Intake,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            stage = %Stage::Intake,
            elapsed_ms = intake.elapsed_ms,
            pages = doc.pages.len(),
            "stage finished"
        );
        self.review(doc, start, vec![intake]).await
    }

    /// Review an already-extracted document.
    pub async fn run_document(&self, doc: ExtractedDocument) -> Result<ReviewReport, StageFailure> {
        self.review(doc, Instant::now(), Vec::new()).await
    }

    async fn review(
        &self,
        doc: ExtractedDocument,
        start: Instant,
        mut timings: Vec<StageTiming>,
    ) -> Result<ReviewReport, StageFailure> {
        // Anonymize
        let t = Instant::now();
        let cleaned = anonymize(&doc.pages_json());
        let content = truncate_chars(&cleaned, self.limits.max_content_chars);
        let content_truncated = content.len() < cleaned.len();
        if content_truncated {
            tracing::info!(
                max_chars = self.limits.max_content_chars,
                "document text truncated for the panel"
            );
        }
        timings.push(finish(Stage::Anonymize, t));

        // Panel
        let t = Instant::now();
        tracing::info!(stage = %Stage::Panel, model = %self.roles.panel, "stage started");
        let panel = self
            .caller
            .generate_structured(&GenerationRequest {
                instruction: prompts::PANEL,
                content,
                model: &self.roles.panel,
            })
            .await
            .map_err(|e| StageFailure::new(Stage::Panel, e))?;
        timings.push(finish(Stage::Panel, t));

        // Synthesis
        let t = Instant::now();
        let synthesis = synthesize(&panel.record);
        timings.push(finish(Stage::Synthesis, t));

        // Arbiter
        let t = Instant::now();
        tracing::info!(stage = %Stage::Arbiter, model = %self.roles.arbiter, "stage started");
        let arbiter = self
            .caller
            .generate_text(&GenerationRequest {
                instruction: prompts::ARBITER,
                content: &synthesis,
                model: &self.roles.arbiter,
            })
            .await
            .map_err(|e| StageFailure::new(Stage::Arbiter, e))?;
        timings.push(finish(Stage::Arbiter, t));

        let verdict_flag = verdict::resolve(&arbiter.text, &panel.record);

        let mut report = ReviewReport {
            document: doc.name,
            sha256: doc.sha256,
            total_pages: doc.total_pages,
            pages_read: doc.pages.len() as u32,
            content_chars: content.chars().count(),
            content_truncated,
            panel_model: self.roles.panel.clone(),
            panel: panel.record,
            panel_fallback: panel.fallback_used,
            synthesis,
            arbiter_model: arbiter.model,
            verdict: arbiter.text,
            verdict_flag,
            timings,
            elapsed_ms: start.elapsed().as_millis() as u64,
            report_file: None,
            persist_error: None,
        };

        // A persist failure leaves the in-memory report intact
        if self.limits.persist_reports {
            match persist_report(&report, &self.limits.reports_dir).await {
                Ok(path) => report.report_file = Some(path),
                Err(e) => {
                    tracing::warn!("failed to persist review report: {e}");
                    report.persist_error = Some(e.to_string());
                }
            }
        }

        tracing::info!(
            verdict = %report.verdict_flag,
            panel_fallback = report.panel_fallback,
            elapsed_ms = report.elapsed_ms,
            "review finished"
        );
        Ok(report)
    }
}

fn finish(stage: Stage, started: Instant) -> StageTiming {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(stage = %stage, elapsed_ms, "stage finished");
    StageTiming { stage, elapsed_ms }
}

/// Write the report to `{dir}/{timestamp}_{pid}_{seq}.json`.
/// Uses epoch millis + PID + atomic counter for filename uniqueness across
/// concurrent invocations and concurrent processes.
pub async fn persist_report(report: &ReviewReport, dir: &Path) -> Result<String, std::io::Error> {
    tokio::fs::create_dir_all(dir).await?;

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let pid = std::process::id();
    let seq = PERSIST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path: PathBuf = dir.join(format!("{ts}_{pid}_{seq}.json"));

    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;

    // Atomic write: temp file + rename prevents partial reads
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, json.as_bytes()).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    Ok(path.display().to_string())
}
