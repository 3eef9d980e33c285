//! Run logging for edit transparency.
//!
//! Each run appends one entry to a newline-delimited JSON file so users can
//! see what the model was asked and what happened to the target file:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"model":"gpt-4o","outcome":"applied",...}
//! {"schema_version":1,"ts":1707900060000,"model":"gpt-4o","outcome":"failed",...}
//! ```
use crate::util::{now_epoch_ms, preview};
use crate::workflow::lm_response::{CollectedDirectives, EditKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Current schema version for run log entries.
pub const RUN_LOG_SCHEMA_VERSION: u32 = 1;

const INSTRUCTIONS_PREVIEW_BYTES: usize = 500;

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// An edit was produced (and written unless dry-run).
    Applied,
    /// The model answered but returned nothing to apply.
    NoChange,
    /// The exchange with the model failed.
    Failed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::NoChange => write!(f, "no_change"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A single run log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub schema_version: u32,

    /// Unix timestamp in milliseconds when the entry was written.
    pub ts: u64,

    pub file: String,
    pub model: String,
    pub backend: String,
    pub duration_ms: u64,
    pub outcome: RunOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_kind: Option<EditKind>,

    #[serde(default)]
    pub replacements: usize,
    #[serde(default)]
    pub deletions: usize,
    #[serde(default)]
    pub appended: bool,

    #[serde(default)]
    pub dry_run: bool,

    /// Instruction preview (first ~500 bytes).
    pub instructions_preview: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Builder for run log entries with timing.
pub struct RunLogBuilder {
    start: Instant,
    file: String,
    model: String,
    backend: String,
    instructions_preview: String,
    dry_run: bool,
}

impl RunLogBuilder {
    pub fn new(file: &Path, model: &str, backend: &str, instructions: &str) -> Self {
        Self {
            start: Instant::now(),
            file: file.display().to_string(),
            model: model.to_string(),
            backend: backend.to_string(),
            instructions_preview: preview(instructions, INSTRUCTIONS_PREVIEW_BYTES),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Finish with the directives the model returned.
    pub fn finished(
        self,
        directives: &CollectedDirectives,
        edit_kind: Option<EditKind>,
    ) -> RunLogEntry {
        let outcome = if edit_kind.is_some() {
            RunOutcome::Applied
        } else {
            RunOutcome::NoChange
        };
        let mut entry = self.build(outcome, None);
        entry.edit_kind = edit_kind;
        entry.replacements = directives.replacements.len();
        entry.deletions = directives.deletions.len();
        entry.appended = edit_kind.is_some()
            && directives.replacements.is_empty()
            && directives.deletions.is_empty();
        entry
    }

    /// Finish with a failed exchange.
    pub fn failed(self, error: impl Into<String>) -> RunLogEntry {
        self.build(RunOutcome::Failed, Some(error.into()))
    }

    fn build(self, outcome: RunOutcome, error: Option<String>) -> RunLogEntry {
        RunLogEntry {
            schema_version: RUN_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            file: self.file,
            model: self.model,
            backend: self.backend,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            edit_kind: None,
            replacements: 0,
            deletions: 0,
            appended: false,
            dry_run: self.dry_run,
            instructions_preview: self.instructions_preview,
            error,
        }
    }
}

/// Append an entry to the run log.
pub fn append_run_log(path: &Path, entry: &RunLogEntry) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("create run log directory")?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open run log for append: {}", path.display()))?;

    let line = serde_json::to_string(entry).context("serialize run log entry")?;
    writeln!(file, "{line}").context("write run log entry")?;

    Ok(())
}
