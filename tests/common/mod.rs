//! Shared test infrastructure for integration tests.

use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// True when the shell tools the canned LM command relies on are missing.
pub fn skip_without_shell() -> bool {
    let missing = find_in_path("sh").is_none() || find_in_path("cat").is_none();
    if missing {
        eprintln!("Skipping: sh or cat not available");
    }
    missing
}

/// Chat completion body carrying the given tool calls.
pub fn tool_reply(calls: &[(&str, Value)]) -> Value {
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
        "id": "chatcmpl-test",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "finish_reason": "tool_calls",
            "message": {"role": "assistant", "content": null, "tool_calls": tool_calls}
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

/// A scratch directory holding a target file and a canned LM reply.
///
/// The LM command saves the request it receives to `request.json` and
/// prints `response.json` back.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(source: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("originalCode.js"), source).expect("write target");
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn target(&self) -> PathBuf {
        self.path("originalCode.js")
    }

    pub fn read_target(&self) -> String {
        std::fs::read_to_string(self.target()).expect("read target")
    }

    /// Canned chat-completions body the LM command prints.
    pub fn set_reply(&self, body: &Value) {
        std::fs::write(self.path("response.json"), body.to_string()).expect("write response");
    }

    pub fn lm_command(&self) -> String {
        let request = self.path("request.json");
        let response = self.path("response.json");
        format!(
            "sh -c 'cat > \"$0\"; cat \"$1\"' {} {}",
            quoted(&request),
            quoted(&response)
        )
    }

    /// The last request the LM command received.
    pub fn sent_request(&self) -> Value {
        let text = std::fs::read_to_string(self.path("request.json")).expect("read request");
        serde_json::from_str(&text).expect("parse request")
    }

    /// The user prompt of the last request the LM command received.
    pub fn sent_prompt(&self) -> Value {
        let request = self.sent_request();
        let content = request["messages"]
            .as_array()
            .and_then(|messages| messages.last())
            .and_then(|message| message["content"].as_str())
            .expect("user content");
        serde_json::from_str(content).expect("parse prompt")
    }

    /// Run codemend with the canned LM command ahead of `args`.
    pub fn edit(&self, args: &[&str], stdin: &str) -> Output {
        let lm = self.lm_command();
        let mut full = vec!["--lm-command", lm.as_str()];
        full.extend_from_slice(args);
        self.run(&full, stdin)
    }

    /// Run codemend in this workspace with an isolated environment.
    pub fn run(&self, args: &[&str], stdin: &str) -> Output {
        let mut child = self
            .command()
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn codemend");
        child
            .stdin
            .take()
            .expect("stdin")
            .write_all(stdin.as_bytes())
            .expect("write stdin");
        child.wait_with_output().expect("wait for codemend")
    }

    fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_codemend"));
        command
            .current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.path("config-home"))
            .env_remove("CODEMEND_MODEL")
            .env_remove("CODEMEND_BASE_URL")
            .env_remove("CODEMEND_LM_COMMAND")
            .env_remove("OPENAI_API_KEY")
            .env_remove("RUST_LOG");
        command
    }
}

fn quoted(path: &Path) -> String {
    shell_words::quote(&path.display().to_string()).into_owned()
}
