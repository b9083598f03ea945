//! Text extraction from tender PDFs using poppler's `pdfinfo` and `pdftotext`.

use std::path::Path;
use std::process::Output;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::process::Command;

use crate::error::CouncilError;

pub const DEFAULT_MAX_PAGES: u32 = 80;

static NEWLINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("valid newline regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDocument {
    pub name: String,
    pub sha256: String,
    pub total_pages: u32,
    pub pages: Vec<Page>,
}

impl ExtractedDocument {
    /// Build a document from already-extracted page texts.
    pub fn from_pages(name: impl Into<String>, bytes: &[u8], pages: Vec<String>) -> Self {
        let pages: Vec<Page> = pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page {
                number: i as u32 + 1,
                text: flatten_page(&text),
            })
            .collect();
        Self {
            name: name.into(),
            sha256: hex::encode(Sha256::digest(bytes)),
            total_pages: pages.len() as u32,
            pages,
        }
    }

    /// JSON array of `{number, text}` handed to the anonymizer.
    pub fn pages_json(&self) -> String {
        serde_json::to_string(&self.pages).unwrap_or_default()
    }

    pub fn is_truncated(&self) -> bool {
        (self.pages.len() as u32) < self.total_pages
    }
}

/// Collapse runs of line breaks into single spaces.
pub fn flatten_page(text: &str) -> String {
    NEWLINE_RUNS.replace_all(text, " ").trim().to_string()
}

pub struct PdfExtractor {
    max_pages: u32,
    timeout: Duration,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PdfExtractor {
    pub fn new(max_pages: u32, timeout: Duration) -> Self {
        Self {
            max_pages: max_pages.max(1),
            timeout,
        }
    }

    /// Extract up to `max_pages` pages of text from the PDF at `path`.
    pub async fn extract(&self, path: &Path) -> Result<ExtractedDocument, CouncilError> {
        let bytes = tokio::fs::read(path).await?;
        if !bytes.starts_with(b"%PDF-") {
            return Err(CouncilError::Extraction(format!(
                "{} is not a PDF file",
                display_name(path)
            )));
        }
        let sha256 = hex::encode(Sha256::digest(&bytes));

        let total_pages = self.page_count(path).await?;
        let wanted = total_pages.min(self.max_pages);
        if total_pages > self.max_pages {
            tracing::info!(
                total_pages,
                max_pages = self.max_pages,
                "document longer than page limit, truncating"
            );
        }

        let mut pages = Vec::with_capacity(wanted as usize);
        for number in 1..=wanted {
            let raw = self.page_text(path, number).await?;
            pages.push(Page {
                number,
                text: flatten_page(&raw),
            });
        }

        if pages.iter().all(|p| p.text.is_empty()) {
            return Err(CouncilError::Extraction(
                "no extractable text (scanned document?)".to_string(),
            ));
        }

        Ok(ExtractedDocument {
            name: display_name(path),
            sha256,
            total_pages,
            pages,
        })
    }

    async fn page_count(&self, path: &Path) -> Result<u32, CouncilError> {
        let mut cmd = Command::new("pdfinfo");
        cmd.arg(path);
        let stdout = self.run(cmd, "pdfinfo (install poppler-utils)").await?;
        parse_page_count(&stdout).ok_or_else(|| {
            CouncilError::Extraction("pdfinfo reported no page count".to_string())
        })
    }

    async fn page_text(&self, path: &Path, page: u32) -> Result<String, CouncilError> {
        let page_str = page.to_string();
        let mut cmd = Command::new("pdftotext");
        cmd.args(["-layout", "-enc", "UTF-8", "-f", &page_str, "-l", &page_str])
            .arg(path)
            .arg("-"); // Output to stdout
        self.run(cmd, "pdftotext (install poppler-utils)").await
    }

    /// Run a tool with the extraction timeout, returning stdout on success.
    async fn run(&self, mut cmd: Command, tool_name: &str) -> Result<String, CouncilError> {
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let result = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result,
            Err(_) => {
                return Err(CouncilError::Timeout(self.timeout.as_millis() as u64));
            }
        };
        handle_cmd_output(result, tool_name)
    }
}

/// Handle command output, extracting stdout on success or returning appropriate error.
fn handle_cmd_output(
    result: std::io::Result<Output>,
    tool_name: &str,
) -> Result<String, CouncilError> {
    match result {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CouncilError::Extraction(format!(
                "{tool_name} failed: {}",
                stderr.trim()
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CouncilError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(CouncilError::Io(e)),
    }
}

/// Read the `Pages:` line of `pdfinfo` output.
pub fn parse_page_count(pdfinfo_stdout: &str) -> Option<u32> {
    pdfinfo_stdout
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
