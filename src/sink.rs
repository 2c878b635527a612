// =============================================================================
// sink.rs — meetings.json
// =============================================================================
//
// Pretty-printed, two-space indent, UTF-8 kept as-is ("Esperança", not
// "Esperan\u00e7a"). Written to a sibling temp file first and renamed into
// place, so the front-end never reads half a file.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::CanonicalMeeting;

pub async fn write_meetings(path: &Path, meetings: &[CanonicalMeeting]) -> Result<()> {
    let mut json = serde_json::to_string_pretty(meetings).context("serializing meetings")?;
    json.push('\n');

    let staging = staging_path(path);
    debug!(path = %staging.display(), bytes = json.len(), "Writing staging file");

    let written = match tokio::fs::write(&staging, json.as_bytes()).await {
        Ok(()) => tokio::fs::rename(&staging, path)
            .await
            .with_context(|| format!("moving {} into place at {}", staging.display(), path.display())),
        Err(e) => Err(e).with_context(|| format!("writing {}", staging.display())),
    };

    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            debug!(path = %staging.display(), error = %e, "Staging file not removed");
        }
    }
    written
}

/// `dir/meetings.json` -> `dir/.meetings.json.tmp`
fn staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "meetings.json".to_string());
    path.with_file_name(format!(".{file_name}.tmp"))
}
