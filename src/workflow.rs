//! The edit pass: read the file, ask the model, apply one edit, write back.
//!
//! Remote failures stop at `request_directives`: they are logged and the run
//! ends without touching the file. Local failures (unreadable target,
//! invalid config, write errors) propagate to the caller.
pub mod input;
pub mod lm_client;
pub mod lm_response;
pub mod write;

use crate::chat::{ChatMessage, Role};
use crate::cli::EditArgs;
use crate::config::{load_config_for, resolve_settings, Settings};
use crate::run_log::{append_run_log, RunLogBuilder, RunLogEntry};
use crate::transcript::Transcript;
use crate::util::language_for_path;
use anyhow::{Context, Result};
use input::resolve_instructions;
use lm_client::{backend_from_settings, invoke_lm_for_edit, ChatBackend};
use lm_response::{collect_directives, first_message, CollectedDirectives, EditKind};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use write::write_atomically;

/// What a run did to the target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    /// The edited text was written to `path`.
    Written { kind: EditKind, path: PathBuf },
    /// The edited text was printed instead of written.
    DryRun { kind: EditKind },
    /// The model answered without an applicable directive.
    NoChange,
    /// The exchange failed; nothing was written.
    Failed,
}

/// Messages and directives from one successful exchange.
struct Exchange {
    user_message: ChatMessage,
    assistant_message: ChatMessage,
    directives: CollectedDirectives,
}

/// Entry point for the CLI.
pub fn run_edit(args: &EditArgs) -> Result<RunResult> {
    let config = load_config_for(args.config.as_deref())?;
    let settings = resolve_settings(args, config, |key| std::env::var(key).ok())?;
    tracing::debug!(
        file = %settings.file.display(),
        model = %settings.model,
        backend = settings.backend.label(),
        "settings resolved"
    );
    let backend = backend_from_settings(&settings.backend)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_with_backend(
        &settings,
        backend.as_ref(),
        &mut stdin.lock(),
        &mut stdout.lock(),
    )
}

/// Run one edit pass against an already constructed backend.
///
/// `input` supplies the instruction when none is configured; `out` receives
/// the confirmation line, or the edited text in dry-run mode.
pub fn run_with_backend<R, W>(
    settings: &Settings,
    backend: &dyn ChatBackend,
    input: &mut R,
    out: &mut W,
) -> Result<RunResult>
where
    R: BufRead,
    W: Write,
{
    let original = fs::read_to_string(&settings.file)
        .with_context(|| format!("read {}", settings.file.display()))?;
    let instructions = resolve_instructions(
        settings.instructions.as_deref(),
        input,
        &mut io::stderr(),
    )?;
    let mut transcript = settings
        .transcript
        .as_deref()
        .map(Transcript::load)
        .transpose()?;

    let log_builder = RunLogBuilder::new(
        &settings.file,
        &settings.model,
        backend.label(),
        &instructions,
    )
    .with_dry_run(settings.dry_run);

    let history = transcript
        .as_ref()
        .map(Transcript::messages)
        .unwrap_or_default();
    let requested = request_directives(settings, backend, history, &instructions, &original);
    let exchange = match requested {
        Ok(exchange) => exchange,
        Err(err) => {
            let message = format!("{err:#}");
            tracing::error!(error = %message, "edit request failed; file left unchanged");
            record_run(settings, log_builder.failed(message));
            return Ok(RunResult::Failed);
        }
    };

    match finish_exchange(settings, &original, &exchange, transcript.as_mut(), out) {
        Ok((result, edit_kind)) => {
            record_run(settings, log_builder.finished(&exchange.directives, edit_kind));
            Ok(result)
        }
        Err(err) => {
            record_run(settings, log_builder.failed(format!("{err:#}")));
            Err(err)
        }
    }
}

/// Apply the chosen edit locally, then extend the transcript.
///
/// Every error here is local. Under dry run the transcript is left alone.
fn finish_exchange<W: Write>(
    settings: &Settings,
    original: &str,
    exchange: &Exchange,
    transcript: Option<&mut Transcript>,
    out: &mut W,
) -> Result<(RunResult, Option<EditKind>)> {
    let outcome = exchange.directives.apply(original);
    let result = match &outcome {
        Some(edit) if settings.dry_run => {
            out.write_all(edit.text.as_bytes()).context("write edited text")?;
            RunResult::DryRun { kind: edit.kind }
        }
        Some(edit) => {
            write_atomically(&settings.file, &edit.text)?;
            let shown = settings.file.display();
            let confirmation = match edit.kind {
                EditKind::Update => writeln!(out, "Code updated successfully. Saved to {shown}."),
                EditKind::Delete => writeln!(out, "Code deleted successfully. Saved to {shown}."),
            };
            confirmation.context("write confirmation")?;
            tracing::info!(kind = %edit.kind, tool = edit.tool, path = %shown, "edit applied");
            RunResult::Written {
                kind: edit.kind,
                path: settings.file.clone(),
            }
        }
        None => {
            tracing::info!("no edit to apply; file left unchanged");
            RunResult::NoChange
        }
    };

    match transcript {
        Some(_) if settings.dry_run => {
            tracing::debug!("dry run; transcript left unchanged");
        }
        Some(transcript) => {
            let tool_results: Vec<ChatMessage> = exchange
                .assistant_message
                .tool_calls
                .iter()
                .enumerate()
                .map(|(index, call)| {
                    let status = exchange.directives.status_for(index, &call.function.name);
                    ChatMessage::tool_result(call.id.clone(), status)
                })
                .collect();
            transcript.extend([
                exchange.user_message.clone(),
                exchange.assistant_message.clone(),
            ]);
            transcript.extend(tool_results);
            transcript.save()?;
        }
        None => {}
    }

    Ok((result, outcome.map(|edit| edit.kind)))
}

/// Send the request and decode the directives. Every error here is remote.
fn request_directives(
    settings: &Settings,
    backend: &dyn ChatBackend,
    history: &[ChatMessage],
    instructions: &str,
    original: &str,
) -> Result<Exchange> {
    let language = language_for_path(&settings.file);
    let invocation = invoke_lm_for_edit(
        backend,
        &settings.model,
        history,
        instructions,
        original,
        language,
    )?;
    tracing::debug!(
        elapsed_ms = invocation.duration.as_millis() as u64,
        "edit exchange complete"
    );

    let mut assistant_message = first_message(&invocation.response)?.clone();
    if assistant_message.role != Role::Assistant {
        tracing::debug!(role = %assistant_message.role, "treating first choice as assistant reply");
        assistant_message.role = Role::Assistant;
    }
    if let Some(content) = assistant_message
        .content
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    {
        tracing::info!(reply = content, "assistant reply");
    }

    let directives = if assistant_message.tool_calls.is_empty() {
        tracing::warn!("tool_calls is not found");
        CollectedDirectives::default()
    } else {
        let directives = collect_directives(&assistant_message.tool_calls)?;
        if directives.is_empty() {
            tracing::warn!(
                tool_calls = assistant_message.tool_calls.len(),
                "tool calls carried no applicable directives"
            );
        }
        directives
    };

    Ok(Exchange {
        user_message: invocation.user_message,
        assistant_message,
        directives,
    })
}

fn record_run(settings: &Settings, entry: RunLogEntry) {
    tracing::debug!(outcome = %entry.outcome, duration_ms = entry.duration_ms, "run finished");
    let Some(path) = settings.run_log.as_deref() else {
        return;
    };
    if let Err(err) = append_run_log(path, &entry) {
        tracing::warn!(
            error = %format!("{err:#}"),
            path = %path.display(),
            "failed to append run log"
        );
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
