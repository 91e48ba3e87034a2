//! Video metadata extraction via `ffprobe`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value as Json, json};
use tokio::process::Command;
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

/// Runs `ffprobe -v quiet -print_format json -show_format -show_streams` and
/// maps its output onto the indexed fields. A subprocess spawn failure is
/// transient (§7 category 1); a parse failure on its output is malformed
/// metadata (§7 category 3) - both leave fields simply absent rather than
/// failing the whole extraction.
pub async fn extract(path: &Path, timeout: Duration) -> Map<String, Json> {
    match probe(path, timeout).await {
        Ok(output) => fields_from(output),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ffprobe extraction failed");
            Map::new()
        }
    }
}

async fn probe(path: &Path, timeout: Duration) -> Result<ProbeOutput> {
    let child = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| Error::ToolFailed {
            tool: "ffprobe",
            detail: "timed out".to_string(),
        })?
        .map_err(|e| Error::ToolSpawn { tool: "ffprobe", source: e })?;

    if !output.status.success() {
        return Err(Error::ToolFailed {
            tool: "ffprobe",
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    serde_json::from_slice(&output.stdout).map_err(Error::Serde)
}

fn fields_from(output: ProbeOutput) -> Map<String, Json> {
    let mut fields = Map::new();

    if let Some(duration) = output.format.duration.as_deref().and_then(parse_seconds) {
        fields.insert("duration".into(), json!(duration));
    }
    if let Some(bit_rate) = output.format.bit_rate.as_deref().and_then(|s| s.parse::<i64>().ok()) {
        fields.insert("bit_rate".into(), json!(bit_rate));
    }

    if let Some(video) = output.streams.iter().find(|s| s.codec_type.as_deref() == Some("video")) {
        if let (Some(w), Some(h)) = (video.width, video.height) {
            fields.insert("width".into(), json!(w));
            fields.insert("height".into(), json!(h));
            fields.insert("resolution".into(), json!(format!("{w}x{h}")));
        }
        if let Some(codec) = &video.codec_name {
            fields.insert("video_codec".into(), json!(codec));
        }
        if let Some(rate) = video.avg_frame_rate.as_deref().and_then(parse_rational) {
            fields.insert("frame_rate".into(), json!(rate));
        }
    }

    if let Some(audio) = output.streams.iter().find(|s| s.codec_type.as_deref() == Some("audio"))
        && let Some(codec) = &audio.codec_name
    {
        fields.insert("audio_codec".into(), json!(codec));
    }

    fields
}

fn parse_seconds(raw: &str) -> Option<i64> {
    raw.parse::<f64>().ok().map(|s| s.round() as i64)
}

/// Parses ffprobe's `"num/den"` rational strings (e.g. frame rates).
fn parse_rational(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 { None } else { Some(num / den) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_rate_rational() {
        assert_eq!(parse_rational("30000/1001"), Some(30000.0 / 1001.0));
        assert_eq!(parse_rational("25/1"), Some(25.0));
        assert_eq!(parse_rational("0/0"), None);
    }

    #[test]
    fn parses_fractional_duration_by_rounding() {
        assert_eq!(parse_seconds("123.456"), Some(123));
        assert_eq!(parse_seconds("not a number"), None);
    }

    #[test]
    fn maps_first_video_and_audio_stream_fields() {
        let output = ProbeOutput {
            streams: vec![
                ProbeStream {
                    codec_type: Some("video".into()),
                    codec_name: Some("h264".into()),
                    width: Some(1920),
                    height: Some(1080),
                    avg_frame_rate: Some("30/1".into()),
                },
                ProbeStream {
                    codec_type: Some("audio".into()),
                    codec_name: Some("aac".into()),
                    width: None,
                    height: None,
                    avg_frame_rate: None,
                },
            ],
            format: ProbeFormat {
                duration: Some("60.2".into()),
                bit_rate: Some("500000".into()),
            },
        };
        let fields = fields_from(output);
        assert_eq!(fields["resolution"], json!("1920x1080"));
        assert_eq!(fields["video_codec"], json!("h264"));
        assert_eq!(fields["audio_codec"], json!("aac"));
        assert_eq!(fields["duration"], json!(60));
        assert_eq!(fields["bit_rate"], json!(500000));
    }
}
