//! FFprobe-based duration lookup for the fetched media prefix.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::path_to_string;
use super::runner::{ToolError, ToolInvocation, ToolRunner};
use crate::error::ThumbError;
use crate::uri::SourceFormat;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<serde_json::Value>,
    #[serde(default)]
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    /// Seconds. Zero when unknown or when probing was skipped.
    pub duration: f64,
    pub format_name: Option<String>,
}

impl MediaInfo {
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// ffprobe reports duration as a numeric string; accept plain numbers too.
fn parse_duration(value: &serde_json::Value) -> Option<f64> {
    let duration = match value {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (duration.is_finite() && duration >= 0.0).then_some(duration)
}

/// Parse ffprobe JSON output. Unparsable output or a missing duration yields zero.
pub fn parse_ffprobe_json(json: &str) -> MediaInfo {
    let output: FfprobeOutput = match serde_json::from_str(json) {
        Ok(output) => output,
        Err(e) => {
            log::warn!(
                target: "thumby::ffmpeg::ffprobe",
                "Failed to parse ffprobe JSON, assuming zero duration: {}",
                e
            );
            return MediaInfo::unknown();
        }
    };
    let format = output.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_ref())
        .and_then(parse_duration)
        .unwrap_or(0.0);
    if duration == 0.0 {
        log::debug!(
            target: "thumby::ffmpeg::ffprobe",
            "ffprobe reported no duration: {}",
            json.trim()
        );
    }
    MediaInfo {
        duration,
        format_name: format.and_then(|f| f.format_name.clone()),
    }
}

pub fn build_probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "quiet".into(),
        "-print_format".into(),
        "json".into(),
        "-show_format".into(),
        path_to_string(path),
    ]
}

/// Run ffprobe on the fetched file. Failing to run it is a probe error; a run that
/// succeeds without a usable duration is not.
pub async fn probe_media_info(
    runner: &dyn ToolRunner,
    ffprobe: &Path,
    path: &Path,
    deadline: Duration,
) -> Result<MediaInfo, ThumbError> {
    log::debug!(
        target: "thumby::ffmpeg::ffprobe",
        "probing {}",
        path.display()
    );
    let invocation = ToolInvocation::new(ffprobe, build_probe_args(path)).with_deadline(deadline);
    let output = runner.run(invocation).await.map_err(|e| {
        log::debug!(target: "thumby::ffmpeg::ffprobe", "ffprobe run failed: {}", e);
        ThumbError::Probe(run_failure_summary(&e))
    })?;
    if !output.success() {
        log::debug!(
            target: "thumby::ffmpeg::ffprobe",
            "ffprobe stderr: {}",
            output.stderr.trim()
        );
        return Err(ThumbError::Probe(match output.code {
            Some(code) => format!("ffprobe exited with code {}", code),
            None => "ffprobe was terminated by a signal".to_string(),
        }));
    }
    Ok(parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout)))
}

/// Client-facing text for a failed ffprobe run. Never includes the binary's location.
fn run_failure_summary(error: &ToolError) -> String {
    match error {
        ToolError::Spawn { .. } => "ffprobe not found or failed to start".to_string(),
        ToolError::TimedOut(limit) => {
            format!("ffprobe did not finish within {}s", limit.as_secs())
        }
        ToolError::Io(e) => format!("lost track of ffprobe: {}", e.kind()),
    }
}

/// Looks up the duration of fetched media, skipping formats without useful metadata.
#[derive(Clone)]
pub struct DurationProber {
    runner: Arc<dyn ToolRunner>,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl DurationProber {
    pub fn new(runner: Arc<dyn ToolRunner>, ffprobe: PathBuf, timeout: Duration) -> Self {
        Self {
            runner,
            ffprobe,
            timeout,
        }
    }

    pub async fn probe(&self, format: SourceFormat, path: &Path) -> Result<MediaInfo, ThumbError> {
        if !format.has_duration() {
            log::debug!(
                target: "thumby::ffmpeg::ffprobe",
                "skipping probe for {} input",
                format.as_str()
            );
            return Ok(MediaInfo::unknown());
        }
        probe_media_info(self.runner.as_ref(), &self.ffprobe, path, self.timeout).await
    }
}
