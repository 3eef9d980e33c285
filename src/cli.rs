//! CLI argument parsing for a single edit pass.
//!
//! Every flag is optional: with no arguments the tool edits `originalCode.js`
//! in the current directory and asks for the instruction on the terminal.
use clap::Parser;
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "codemend",
    version,
    about = "Edit a source file from a natural-language instruction via an LM",
    after_help = "Examples:\n  codemend\n  codemend --file app.js --instructions \"rename appId to applicationId\"\n  codemend --transcript .codemend/chat.json --run-log .codemend/runs.jsonl\n  codemend --lm-command \"my-llm --json\" --dry-run"
)]
pub struct EditArgs {
    /// Source file to edit in place
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Instruction for the model; prompted on the terminal when omitted
    #[arg(long, short = 'i', value_name = "TEXT")]
    pub instructions: Option<String>,

    /// Conversation transcript (JSON) replayed before and extended after the request
    #[arg(long, value_name = "PATH")]
    pub transcript: Option<PathBuf>,

    /// Append a JSONL entry describing this run
    #[arg(long, value_name = "PATH")]
    pub run_log: Option<PathBuf>,

    /// Model name sent with the request
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Base URL of the chat-completions API
    #[arg(long, value_name = "URL", conflicts_with = "lm_command")]
    pub base_url: Option<String>,

    /// Local command that reads the request JSON on stdin and prints the response JSON
    #[arg(long, value_name = "CMD")]
    pub lm_command: Option<String>,

    /// Config file (defaults to <config dir>/codemend/config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the edited text instead of writing the file
    #[arg(long)]
    pub dry_run: bool,

    /// Emit debug logs, including the raw model response
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
