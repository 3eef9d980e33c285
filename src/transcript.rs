//! Conversation transcript persisted between runs.
//!
//! The transcript is a JSON array of chat messages. Earlier messages are
//! replayed ahead of each new request so follow-up instructions can refer to
//! previous edits.
use crate::chat::ChatMessage;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Transcript {
    path: PathBuf,
    messages: Vec<ChatMessage>,
}

impl Transcript {
    /// Load a transcript, starting empty when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let messages = if path.is_file() {
            let bytes =
                fs::read(path).with_context(|| format!("read transcript {}", path.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("parse transcript {}", path.display()))?
        } else {
            Vec::new()
        };
        tracing::debug!(path = %path.display(), messages = messages.len(), "transcript loaded");
        Ok(Self {
            path: path.to_path_buf(),
            messages,
        })
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    /// Rewrite the transcript file with every message.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&self.messages).context("serialize transcript")?;
        fs::write(&self.path, text.as_bytes())
            .with_context(|| format!("write transcript {}", self.path.display()))?;
        if let Some(last) = self.messages.last() {
            tracing::debug!(
                path = %self.path.display(),
                messages = self.messages.len(),
                last_role = %last.role,
                "transcript saved"
            );
        }
        Ok(())
    }
}
