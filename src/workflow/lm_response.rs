//! LM response handling for edit directives.
//!
//! This module defines the contract for the tool calls the model returns and
//! resolves them into exactly one text transform.
use crate::chat::{ChatMessage, ChatResponse, ToolCall};
use crate::edit::{append_code, apply_replacements, delete_segments, Replacement};
use crate::tools::{CREATE_OR_ADD_CODE, DELETE_CODE, GENERATE_REPLACEMENTS};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// One structured edit instruction returned by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Literal substitutions, applied in order.
    Replace(Vec<Replacement>),
    /// Segments to remove.
    Delete(Vec<String>),
    /// Code appended after the existing text.
    Append(String),
}

#[derive(Debug, Deserialize)]
struct ReplacementsArgs {
    replacements: Vec<Replacement>,
}

#[derive(Debug, Deserialize)]
struct NewCodeArgs {
    new_code: String,
}

#[derive(Debug, Deserialize)]
struct DeletionsArgs {
    deletions: Vec<String>,
}

/// Which confirmation a write reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Update,
    Delete,
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Directives gathered across every tool call in one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedDirectives {
    /// Replacement pairs from all `generate_replacements` calls, in order.
    pub replacements: Vec<Replacement>,
    /// Segments from all `delete_code` calls, in order.
    pub deletions: Vec<String>,
    /// Code from the last `create_or_add_code` call.
    pub new_code: Option<String>,
    /// Index of the tool call that supplied `new_code`.
    pub new_code_call: Option<usize>,
    /// Names of tool calls that matched no known tool.
    pub unknown_tools: Vec<String>,
}

/// The single edit chosen from a response, with the resulting text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub kind: EditKind,
    /// Tool whose directives produced the edit.
    pub tool: &'static str,
    pub text: String,
}

/// Return the first choice's message, the only one the workflow consults.
pub fn first_message(response: &ChatResponse) -> Result<&ChatMessage> {
    let choice = response
        .choices
        .first()
        .ok_or_else(|| anyhow!("choices[0] is not found"))?;
    if let Some(reason) = choice.finish_reason.as_deref() {
        tracing::debug!(finish_reason = reason, "first choice");
    }
    choice
        .message
        .as_ref()
        .ok_or_else(|| anyhow!("choices[0].message is not found"))
}

/// Decode one tool call. Unknown tool names yield `None`.
pub fn parse_tool_call(call: &ToolCall) -> Result<Option<Directive>> {
    let name = call.function.name.as_str();
    let arguments = call.function.arguments.as_str();
    let directive = match name {
        GENERATE_REPLACEMENTS => {
            let args: ReplacementsArgs = serde_json::from_str(arguments)
                .with_context(|| format!("parse {name} arguments"))?;
            Directive::Replace(args.replacements)
        }
        CREATE_OR_ADD_CODE => {
            let args: NewCodeArgs = serde_json::from_str(arguments)
                .with_context(|| format!("parse {name} arguments"))?;
            Directive::Append(args.new_code)
        }
        DELETE_CODE => {
            let args: DeletionsArgs = serde_json::from_str(arguments)
                .with_context(|| format!("parse {name} arguments"))?;
            Directive::Delete(args.deletions)
        }
        _ => return Ok(None),
    };
    Ok(Some(directive))
}

/// Gather directives from every tool call. Any malformed call fails the batch.
pub fn collect_directives(calls: &[ToolCall]) -> Result<CollectedDirectives> {
    let mut collected = CollectedDirectives::default();
    for (index, call) in calls.iter().enumerate() {
        tracing::debug!(
            index,
            name = %call.function.name,
            arguments = %call.function.arguments,
            "tool call"
        );
        match parse_tool_call(call).with_context(|| format!("tool_calls[{index}]"))? {
            Some(Directive::Replace(replacements)) => {
                tracing::debug!(index, count = replacements.len(), "replacements");
                collected.replacements.extend(replacements);
            }
            Some(Directive::Delete(deletions)) => {
                tracing::debug!(index, count = deletions.len(), "deletions");
                collected.deletions.extend(deletions);
            }
            Some(Directive::Append(new_code)) => {
                tracing::debug!(index, bytes = new_code.len(), "new code");
                collected.new_code = Some(new_code);
                collected.new_code_call = Some(index);
            }
            None => {
                tracing::warn!(index, name = %call.function.name, "ignoring unknown tool call");
                collected.unknown_tools.push(call.function.name.clone());
            }
        }
    }
    Ok(collected)
}

impl CollectedDirectives {
    /// True when no directive would change the text.
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty() && self.deletions.is_empty() && !self.has_new_code()
    }

    fn has_new_code(&self) -> bool {
        self.new_code.as_deref().is_some_and(|code| !code.is_empty())
    }

    /// Tool whose directives win: replacements, then deletions, then appended code.
    pub fn selected_tool(&self) -> Option<&'static str> {
        if !self.replacements.is_empty() {
            Some(GENERATE_REPLACEMENTS)
        } else if !self.deletions.is_empty() {
            Some(DELETE_CODE)
        } else if self.has_new_code() {
            Some(CREATE_OR_ADD_CODE)
        } else {
            None
        }
    }

    /// Apply the winning directive to `text`. Returns `None` when nothing applies.
    pub fn apply(&self, text: &str) -> Option<EditOutcome> {
        let tool = self.selected_tool()?;
        self.log_shadowed(tool);
        let (kind, text) = match tool {
            GENERATE_REPLACEMENTS => (
                EditKind::Update,
                apply_replacements(text, &self.replacements),
            ),
            DELETE_CODE => (EditKind::Delete, delete_segments(text, &self.deletions)),
            _ => (
                EditKind::Update,
                append_code(text, self.new_code.as_deref().unwrap_or_default()),
            ),
        };
        Some(EditOutcome { kind, tool, text })
    }

    /// Status reported back to the model for the tool call at `index`.
    pub fn status_for(&self, index: usize, name: &str) -> &'static str {
        match self.selected_tool() {
            // Only the last appended code is used; earlier calls were overwritten.
            Some(CREATE_OR_ADD_CODE) if name == CREATE_OR_ADD_CODE => {
                if self.new_code_call == Some(index) {
                    "applied"
                } else {
                    "ignored"
                }
            }
            Some(selected) if selected == name => "applied",
            _ if self.unknown_tools.iter().any(|unknown| unknown == name) => "unknown tool",
            _ => "ignored",
        }
    }

    fn log_shadowed(&self, selected: &str) {
        if selected != DELETE_CODE && !self.deletions.is_empty() {
            tracing::warn!(
                count = self.deletions.len(),
                "deletions ignored because replacements take precedence"
            );
        }
        if selected != CREATE_OR_ADD_CODE && self.has_new_code() {
            tracing::warn!("new code ignored because {selected} takes precedence");
        }
    }
}
