use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Replace `dest` with `text` via a temp file in the same directory.
///
/// Readers never observe a half-written file, and the original permissions
/// carry over to the new contents.
pub fn write_atomically(dest: &Path, text: &str) -> Result<()> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".codemend")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(text.as_bytes()).with_context(|| format!("write {}", tmp.path().display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync {}", tmp.path().display()))?;

    if let Ok(metadata) = fs::metadata(dest) {
        fs::set_permissions(tmp.path(), metadata.permissions())
            .with_context(|| format!("copy permissions of {}", dest.display()))?;
    }

    tmp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", dest.display()))?;
    Ok(())
}
