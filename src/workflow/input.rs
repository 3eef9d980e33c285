use anyhow::{Context, Result};
use std::io::{BufRead, Write};

pub const INSTRUCTION_PROMPT: &str = "Enter update instructions: ";

/// Use the configured instruction, or ask for one line on the terminal.
///
/// A blank configured instruction counts as missing. The line read from
/// `input` is used as typed (minus its line ending), even when empty.
pub fn resolve_instructions<R, W>(
    configured: Option<&str>,
    input: &mut R,
    prompt: &mut W,
) -> Result<String>
where
    R: BufRead,
    W: Write,
{
    if let Some(text) = configured.filter(|text| !text.trim().is_empty()) {
        return Ok(text.to_string());
    }
    write!(prompt, "{INSTRUCTION_PROMPT}").context("write instruction prompt")?;
    prompt.flush().context("flush instruction prompt")?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("read instructions from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
