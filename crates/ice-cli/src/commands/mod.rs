pub mod forward;
pub mod invert;
pub mod sample;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};

/// Write a JSON run summary next to the archive outputs.
pub fn write_summary(path: &Path, summary: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, text).with_context(|| format!("writing summary {}", path.display()))
}
