//! LM client for edit requests.
//!
//! One chat-completions request is sent per run. The request carries the
//! instruction and the full file text as a JSON document in a single user
//! message, along with the three edit tools:
//!
//! ```text
//! {"instructions": "...", "original": "<file contents>"}
//! ```
//!
//! # Backends
//!
//! - **HTTP**: POST to `<base_url>/chat/completions` with a bearer key. Works
//!   with any OpenAI-compatible endpoint.
//! - **Command**: a user-configured command receives the request JSON on
//!   stdin and prints the chat-completions response JSON on stdout. Useful
//!   for local models, proxies that add caching, and canned replies in tests.
use crate::chat::{ChatMessage, ChatRequest, ChatResponse};
use crate::config::BackendSettings;
use crate::tools::edit_tool_declarations;
use crate::util::truncate_string;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const ERROR_BODY_PREVIEW_BYTES: usize = 500;

/// Transport that turns a chat request into a chat response.
pub trait ChatBackend {
    /// Short label for logs.
    fn label(&self) -> &'static str;

    /// Send the request and decode the response.
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Result of an LM exchange with metadata for logging.
#[derive(Debug)]
pub struct LmInvocationResult {
    pub response: ChatResponse,
    /// The user message appended for this run.
    pub user_message: ChatMessage,
    pub duration: Duration,
}

#[derive(Serialize)]
struct EditPrompt<'a> {
    instructions: &'a str,
    original: &'a str,
}

/// Build the user message carrying the instruction and the original text.
pub fn build_user_message(instructions: &str, original: &str) -> Result<ChatMessage> {
    let content = serde_json::to_string(&EditPrompt {
        instructions,
        original,
    })
    .context("serialize edit prompt")?;
    Ok(ChatMessage::user(content))
}

/// Assemble the request: prior transcript, then the new user message.
pub fn build_request(
    model: &str,
    history: &[ChatMessage],
    user_message: ChatMessage,
    language: &str,
) -> ChatRequest {
    let mut messages = history.to_vec();
    messages.push(user_message);
    ChatRequest {
        model: model.to_string(),
        messages,
        tools: edit_tool_declarations(language),
        tool_choice: "auto",
    }
}

/// Send one edit request through `backend`.
pub fn invoke_lm_for_edit(
    backend: &dyn ChatBackend,
    model: &str,
    history: &[ChatMessage],
    instructions: &str,
    original: &str,
    language: &str,
) -> Result<LmInvocationResult> {
    let user_message = build_user_message(instructions, original)?;
    let request = build_request(model, history, user_message.clone(), language);
    tracing::debug!(
        backend = backend.label(),
        model,
        messages = request.messages.len(),
        "sending edit request"
    );

    let start = Instant::now();
    let response = backend.complete(&request)?;
    let duration = start.elapsed();

    tracing::debug!(
        id = response.id.as_deref().unwrap_or("-"),
        model = response.model.as_deref().unwrap_or("-"),
        choices = response.choices.len(),
        "edit response"
    );
    if let Some(usage) = response.usage {
        tracing::info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "token usage"
        );
    }

    Ok(LmInvocationResult {
        response,
        user_message,
        duration,
    })
}

/// Construct the backend described by `settings`.
pub fn backend_from_settings(settings: &BackendSettings) -> Result<Box<dyn ChatBackend>> {
    match settings {
        BackendSettings::Http {
            base_url,
            api_key,
            timeout,
        } => Ok(Box::new(HttpBackend::new(base_url, api_key, *timeout))),
        BackendSettings::Command { command } => Ok(Box::new(CommandBackend::parse(command)?)),
    }
}

/// OpenAI-compatible chat-completions endpoint.
pub struct HttpBackend {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_key: &str, timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        }
    }
}

impl ChatBackend for HttpBackend {
    fn label(&self) -> &'static str {
        "http"
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let start = Instant::now();
        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(request)
            .with_context(|| format!("POST {}", self.endpoint))?;
        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .context("read LM response body")?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            status = status.as_u16(),
            response_bytes = body.len(),
            "lm request complete"
        );

        if !status.is_success() {
            return Err(anyhow!(
                "LM request failed with status {}: {}",
                status,
                truncate_string(body.trim(), ERROR_BODY_PREVIEW_BYTES)
            ));
        }
        parse_chat_response(&body)
    }
}

/// Local command speaking chat-completions JSON over stdin/stdout.
pub struct CommandBackend {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandBackend {
    /// Split `command` shell-style and resolve the program on `PATH`.
    pub fn parse(command: &str) -> Result<Self> {
        let argv =
            shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
        let Some((program, args)) = argv.split_first() else {
            return Err(anyhow!("LM command is empty"));
        };
        let program = which::which(program).with_context(|| format!("find LM command: {program}"))?;
        Ok(Self {
            program,
            args: args.to_vec(),
        })
    }
}

impl ChatBackend for CommandBackend {
    fn label(&self) -> &'static str {
        "command"
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let payload = serde_json::to_vec(request).context("serialize LM request")?;

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn LM command: {}", self.program.display()))?;

        if let Some(mut stdin) = child.stdin.take() {
            // Commands that answer without reading stdin close the pipe early.
            if let Err(err) = stdin.write_all(&payload) {
                if err.kind() != ErrorKind::BrokenPipe {
                    return Err(err).context("write request to LM stdin");
                }
                tracing::debug!("LM command closed stdin before reading the request");
            }
        }

        let output = child.wait_with_output().context("wait for LM command")?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            request_bytes = payload.len(),
            response_bytes = output.stdout.len(),
            "lm invoke complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "LM command failed with status {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let text = String::from_utf8(output.stdout).context("decode LM stdout as UTF-8")?;
        parse_chat_response(extract_json(&text))
    }
}

/// Decode a chat-completions response body.
pub fn parse_chat_response(text: &str) -> Result<ChatResponse> {
    tracing::debug!(response = text, "raw LM response");
    serde_json::from_str(text).with_context(|| {
        format!(
            "parse LM response as JSON: {}",
            truncate_string(text, ERROR_BODY_PREVIEW_BYTES)
        )
    })
}

/// Extract JSON from text that might have markdown code fences.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip language identifier if present
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}
