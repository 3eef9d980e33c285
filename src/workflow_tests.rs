use super::*;
use crate::chat::{ChatRequest, ChatResponse};
use crate::config::BackendSettings;
use crate::run_log::{RunLogEntry, RunOutcome};
use crate::workflow::lm_client::parse_chat_response;
use anyhow::anyhow;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::io::Cursor;
use std::path::Path;

/// Backend that records every request and replays one canned outcome.
struct ReplayBackend {
    reply: std::result::Result<String, String>,
    requests: RefCell<Vec<Value>>,
}

impl ReplayBackend {
    fn replying(body: Value) -> Self {
        Self {
            reply: Ok(body.to_string()),
            requests: RefCell::new(Vec::new()),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            requests: RefCell::new(Vec::new()),
        }
    }

    fn last_prompt(&self) -> Value {
        let requests = self.requests.borrow();
        let request = requests.last().expect("a request was sent");
        let messages = request["messages"].as_array().expect("messages array");
        let content = messages
            .last()
            .and_then(|message| message["content"].as_str())
            .expect("user content");
        serde_json::from_str(content).expect("prompt JSON")
    }
}

impl ChatBackend for ReplayBackend {
    fn label(&self) -> &'static str {
        "replay"
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests
            .borrow_mut()
            .push(serde_json::to_value(request).expect("encode request"));
        match &self.reply {
            Ok(body) => parse_chat_response(body),
            Err(message) => Err(anyhow!("{message}")),
        }
    }
}

fn tool_reply(calls: &[(&str, Value)]) -> Value {
    let tool_calls: Vec<Value> = calls
        .iter()
        .enumerate()
        .map(|(index, (name, arguments))| {
            json!({
                "id": format!("call_{index}"),
                "type": "function",
                "function": {"name": name, "arguments": arguments.to_string()}
            })
        })
        .collect();
    json!({
        "choices": [{
            "finish_reason": "tool_calls",
            "message": {"role": "assistant", "content": null, "tool_calls": tool_calls}
        }]
    })
}

fn settings_for(file: &Path, instructions: Option<&str>) -> Settings {
    Settings {
        file: file.to_path_buf(),
        instructions: instructions.map(str::to_string),
        model: "gpt-4o".to_string(),
        backend: BackendSettings::Command {
            command: "unused".to_string(),
        },
        transcript: None,
        run_log: None,
        dry_run: false,
    }
}

fn run(settings: &Settings, backend: &ReplayBackend, stdin: &str) -> (RunResult, String) {
    let mut input = Cursor::new(stdin.to_string());
    let mut out = Vec::new();
    let result = run_with_backend(settings, backend, &mut input, &mut out);
    (
        result.expect("run succeeds"),
        String::from_utf8(out).expect("utf-8 output"),
    )
}

const SOURCE: &str = "function load(appId) {\n  if (!appId) throw new Error('missing appId');\n}\n";

#[test]
fn replacements_rewrite_every_occurrence_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    fs::write(&file, SOURCE).unwrap();
    let backend = ReplayBackend::replying(tool_reply(&[(
        "generate_replacements",
        json!({"replacements": [{"original": "appId", "updated": "applicationId"}]}),
    )]));

    let (result, out) = run(&settings_for(&file, Some("rename appId")), &backend, "");

    assert_eq!(
        result,
        RunResult::Written {
            kind: EditKind::Update,
            path: file.clone()
        }
    );
    let updated = fs::read_to_string(&file).unwrap();
    assert!(!updated.contains("appId"));
    assert_eq!(updated.matches("applicationId").count(), 3);
    assert!(out.starts_with("Code updated successfully. Saved to "));
    assert_eq!(backend.last_prompt()["instructions"], "rename appId");
    assert_eq!(backend.last_prompt()["original"], SOURCE);
}

#[test]
fn deletions_report_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    fs::write(&file, "debugger;\nrun();\n").unwrap();
    let backend = ReplayBackend::replying(tool_reply(&[(
        "delete_code",
        json!({"deletions": ["debugger;\n"]}),
    )]));

    let (result, out) = run(&settings_for(&file, Some("remove debugger")), &backend, "");

    assert!(matches!(result, RunResult::Written { kind: EditKind::Delete, .. }));
    assert_eq!(fs::read_to_string(&file).unwrap(), "run();\n");
    assert!(out.starts_with("Code deleted successfully."));
}

#[test]
fn appended_code_follows_a_newline() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    fs::write(&file, "main();").unwrap();
    let backend = ReplayBackend::replying(tool_reply(&[(
        "create_or_add_code",
        json!({"new_code": "function helper() {}"}),
    )]));

    run(&settings_for(&file, Some("add helper")), &backend, "");

    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "main();\nfunction helper() {}"
    );
}

#[test]
fn empty_instruction_is_sent_and_no_directive_means_no_write() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    fs::write(&file, SOURCE).unwrap();
    let backend = ReplayBackend::replying(json!({
        "choices": [{"message": {"role": "assistant", "content": "What should I change?"}}]
    }));

    let (result, out) = run(&settings_for(&file, None), &backend, "\n");

    assert_eq!(result, RunResult::NoChange);
    assert_eq!(backend.requests.borrow().len(), 1);
    assert_eq!(backend.last_prompt()["instructions"], "");
    assert_eq!(fs::read_to_string(&file).unwrap(), SOURCE);
    assert!(out.is_empty());
}

#[test]
fn remote_failure_leaves_file_untouched_and_logs_run() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    let transcript = dir.path().join("chat.json");
    let run_log = dir.path().join("runs.jsonl");
    fs::write(&file, SOURCE).unwrap();
    let backend = ReplayBackend::failing("connection refused");

    let mut settings = settings_for(&file, Some("rename appId"));
    settings.transcript = Some(transcript.clone());
    settings.run_log = Some(run_log.clone());
    let (result, _) = run(&settings, &backend, "");

    assert_eq!(result, RunResult::Failed);
    assert_eq!(fs::read_to_string(&file).unwrap(), SOURCE);
    assert!(!transcript.exists());
    let entry: RunLogEntry =
        serde_json::from_str(fs::read_to_string(&run_log).unwrap().trim()).unwrap();
    assert_eq!(entry.outcome, RunOutcome::Failed);
    assert!(entry.error.unwrap().contains("connection refused"));
}

#[test]
fn missing_choices_is_a_failed_run() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    fs::write(&file, SOURCE).unwrap();
    let backend = ReplayBackend::replying(json!({"choices": []}));

    let (result, _) = run(&settings_for(&file, Some("x")), &backend, "");

    assert_eq!(result, RunResult::Failed);
    assert_eq!(fs::read_to_string(&file).unwrap(), SOURCE);
}

#[test]
fn malformed_tool_arguments_are_a_failed_run() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    fs::write(&file, SOURCE).unwrap();
    let backend = ReplayBackend::replying(json!({
        "choices": [{"message": {"role": "assistant", "tool_calls": [{
            "id": "call_0",
            "type": "function",
            "function": {"name": "delete_code", "arguments": "{\"deletions\": "}
        }]}}]
    }));

    let (result, _) = run(&settings_for(&file, Some("x")), &backend, "");

    assert_eq!(result, RunResult::Failed);
    assert_eq!(fs::read_to_string(&file).unwrap(), SOURCE);
}

#[test]
fn dry_run_prints_instead_of_writing() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    fs::write(&file, "a b a").unwrap();
    let backend = ReplayBackend::replying(tool_reply(&[(
        "generate_replacements",
        json!({"replacements": [{"original": "a", "updated": "z"}]}),
    )]));

    let mut settings = settings_for(&file, Some("swap"));
    settings.dry_run = true;
    let (result, out) = run(&settings, &backend, "");

    assert_eq!(result, RunResult::DryRun { kind: EditKind::Update });
    assert_eq!(out, "z b z");
    assert_eq!(fs::read_to_string(&file).unwrap(), "a b a");
}

#[test]
fn dry_run_leaves_transcript_unwritten() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    let transcript = dir.path().join("chat.json");
    let run_log = dir.path().join("runs.jsonl");
    fs::write(&file, "let a = 1;").unwrap();
    let backend = ReplayBackend::replying(tool_reply(&[(
        "generate_replacements",
        json!({"replacements": [{"original": "a", "updated": "b"}]}),
    )]));

    let mut settings = settings_for(&file, Some("rename a"));
    settings.dry_run = true;
    settings.transcript = Some(transcript.clone());
    settings.run_log = Some(run_log.clone());
    let (result, out) = run(&settings, &backend, "");

    assert_eq!(result, RunResult::DryRun { kind: EditKind::Update });
    assert_eq!(out, "let b = 1;");
    assert_eq!(fs::read_to_string(&file).unwrap(), "let a = 1;");
    assert!(!transcript.exists());
    let entry: RunLogEntry =
        serde_json::from_str(fs::read_to_string(&run_log).unwrap().trim()).unwrap();
    assert_eq!(entry.outcome, RunOutcome::Applied);
    assert!(entry.dry_run);
}

#[cfg(target_os = "linux")]
#[test]
fn write_failure_is_logged_and_returned() {
    // Readable, but its directory rejects new files even for root.
    let file = Path::new("/proc/version");
    let Ok(original) = fs::read_to_string(file) else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let transcript = dir.path().join("chat.json");
    let run_log = dir.path().join("runs.jsonl");
    let backend = ReplayBackend::replying(tool_reply(&[(
        "create_or_add_code",
        json!({"new_code": "more"}),
    )]));

    let mut settings = settings_for(file, Some("append"));
    settings.transcript = Some(transcript.clone());
    settings.run_log = Some(run_log.clone());
    let err = run_with_backend(
        &settings,
        &backend,
        &mut Cursor::new(String::new()),
        &mut Vec::new(),
    )
    .unwrap_err();

    assert!(format!("{err:#}").contains("create temp file"));
    assert_eq!(fs::read_to_string(file).unwrap(), original);
    assert!(!transcript.exists());
    let entry: RunLogEntry =
        serde_json::from_str(fs::read_to_string(&run_log).unwrap().trim()).unwrap();
    assert_eq!(entry.outcome, RunOutcome::Failed);
    assert!(entry.error.unwrap().contains("create temp file"));
}

#[test]
fn overwritten_append_is_reported_ignored_in_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    let transcript = dir.path().join("chat.json");
    fs::write(&file, "main();").unwrap();
    let backend = ReplayBackend::replying(tool_reply(&[
        ("create_or_add_code", json!({"new_code": "first();"})),
        ("create_or_add_code", json!({"new_code": "second();"})),
    ]));

    let mut settings = settings_for(&file, Some("add calls"));
    settings.transcript = Some(transcript.clone());
    run(&settings, &backend, "");

    assert_eq!(fs::read_to_string(&file).unwrap(), "main();\nsecond();");
    let saved: Vec<Value> =
        serde_json::from_str(&fs::read_to_string(&transcript).unwrap()).unwrap();
    assert_eq!(saved[2]["content"], "ignored");
    assert_eq!(saved[3]["content"], "applied");
}

#[test]
fn transcript_is_replayed_and_extended() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("originalCode.js");
    let transcript = dir.path().join("chat.json");
    fs::write(&file, "let a = 1;").unwrap();

    let mut settings = settings_for(&file, Some("rename a to b"));
    settings.transcript = Some(transcript.clone());
    let first = ReplayBackend::replying(tool_reply(&[
        (
            "generate_replacements",
            json!({"replacements": [{"original": "a =", "updated": "b ="}]}),
        ),
        ("delete_code", json!({"deletions": ["1"]})),
    ]));
    run(&settings, &first, "");

    let saved: Vec<Value> =
        serde_json::from_str(&fs::read_to_string(&transcript).unwrap()).unwrap();
    let roles: Vec<_> = saved.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool", "tool"]);
    assert_eq!(saved[2]["tool_call_id"], "call_0");
    assert_eq!(saved[2]["content"], "applied");
    assert_eq!(saved[3]["content"], "ignored");

    settings.instructions = Some("now make it const".to_string());
    let second = ReplayBackend::replying(tool_reply(&[(
        "generate_replacements",
        json!({"replacements": [{"original": "let", "updated": "const"}]}),
    )]));
    run(&settings, &second, "");

    let sent = second.requests.borrow()[0].clone();
    assert_eq!(sent["messages"].as_array().unwrap().len(), 5);
    assert_eq!(sent["messages"][1]["tool_calls"][0]["id"], "call_0");
    assert_eq!(fs::read_to_string(&file).unwrap(), "const b = 1;");

    let saved: Vec<Value> =
        serde_json::from_str(&fs::read_to_string(&transcript).unwrap()).unwrap();
    assert_eq!(saved.len(), 7);
}

#[test]
fn unreadable_target_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ReplayBackend::replying(json!({"choices": []}));
    let settings = settings_for(&dir.path().join("missing.js"), Some("x"));
    let err = run_with_backend(
        &settings,
        &backend,
        &mut Cursor::new(String::new()),
        &mut Vec::new(),
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("read "));
    assert!(backend.requests.borrow().is_empty());
}
