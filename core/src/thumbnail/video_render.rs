//! Video thumbnail rendering: probe for duration, seek, single-frame extract
//! via `ffmpeg`.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use crate::error::{Error, Result};

pub async fn render(src: &Path, dest: &Path, width: u32, height: u32, timeout: Duration) -> Result<()> {
    let seek = seek_offset(src, timeout).await;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| Error::io(dest, e))?;
    }

    let filter = format!(
        "scale={width}:{height}:force_original_aspect_ratio=decrease,pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:white"
    );

    let child = Command::new("ffmpeg")
        .args(["-y", "-ss"])
        .arg(format!("{seek}"))
        .arg("-i")
        .arg(src)
        .args(["-vframes", "1", "-vf", &filter, "-q:v", "2"])
        .arg(dest)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| Error::ToolFailed { tool: "ffmpeg", detail: "timed out".to_string() })?
        .map_err(|e| Error::ToolSpawn { tool: "ffmpeg", source: e })?;

    if !output.status.success() {
        return Err(Error::ToolFailed {
            tool: "ffmpeg",
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

/// `max(1.0, 0.1 * duration)`, falling back to 5.0s when `ffprobe`'s output
/// can't be parsed for a duration (§4.5).
async fn seek_offset(src: &Path, timeout: Duration) -> f64 {
    let child = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(src)
        .output();

    let duration = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) if output.status.success() => serde_json::from_slice::<serde_json::Value>(&output.stdout)
            .ok()
            .and_then(|v| v.get("format")?.get("duration")?.as_str().map(str::to_string))
            .and_then(|s| s.parse::<f64>().ok()),
        Ok(Ok(output)) => {
            warn!(path = %src.display(), stderr = %String::from_utf8_lossy(&output.stderr), "ffprobe failed for thumbnail seek");
            None
        }
        Ok(Err(err)) => {
            warn!(path = %src.display(), error = %err, "failed to spawn ffprobe for thumbnail seek");
            None
        }
        Err(_) => {
            warn!(path = %src.display(), "ffprobe timed out for thumbnail seek");
            None
        }
    };

    match duration {
        Some(d) => f64::max(1.0, 0.1 * d),
        None => 5.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_offset_formula_matches_spec() {
        assert_eq!(f64::max(1.0, 0.1 * 3.0), 1.0);
        assert_eq!(f64::max(1.0, 0.1 * 100.0), 10.0);
    }
}
