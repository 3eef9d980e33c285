//! Literal text transforms applied to the target file.
//!
//! Nothing here understands the target language: every operation is a plain
//! string substitution, so callers must supply enough surrounding context to
//! make a segment unique when only one occurrence should change.
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

/// One literal substitution returned by the LM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    /// Text to find (matched literally, every occurrence).
    pub original: String,
    /// Text inserted in place of each match.
    pub updated: String,
}

impl Replacement {
    #[cfg(test)]
    pub fn new(original: impl Into<String>, updated: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            updated: updated.into(),
        }
    }
}

/// Apply replacement pairs in order.
///
/// Each pair sees the output of every earlier pair, so substitutions can
/// cascade.
pub fn apply_replacements(text: &str, replacements: &[Replacement]) -> String {
    let mut updated = text.to_string();
    for replacement in replacements {
        updated = replace_literal(&updated, &replacement.original, &replacement.updated);
    }
    updated
}

/// Remove every occurrence of each segment, in order.
pub fn delete_segments(text: &str, segments: &[String]) -> String {
    let mut updated = text.to_string();
    for segment in segments {
        updated = replace_literal(&updated, segment, "");
    }
    updated
}

/// Append new code after the existing text, separated by a single newline.
pub fn append_code(text: &str, addition: &str) -> String {
    let mut updated = String::with_capacity(text.len() + addition.len() + 1);
    updated.push_str(text);
    updated.push('\n');
    updated.push_str(addition);
    updated
}

fn replace_literal(text: &str, needle: &str, with: &str) -> String {
    // An empty pattern matches between every character.
    if needle.is_empty() {
        tracing::warn!("skipping substitution with an empty search text");
        return text.to_string();
    }
    match Regex::new(&regex::escape(needle)) {
        Ok(pattern) => pattern.replace_all(text, NoExpand(with)).into_owned(),
        Err(err) => {
            // Escaped literals only fail on the compiled-size limit.
            tracing::debug!(
                error = %err,
                "literal pattern too large for regex; using str::replace"
            );
            text.replace(needle, with)
        }
    }
}
