//! Frame extraction: run the converter under a hard deadline inside the workspace, then pick
//! the frame to serve.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::error::ThumbError;
use crate::ffmpeg::{
    FrameOptions, MediaInfo, ToolError, ToolInvocation, ToolRunner, build_extract_args,
    format_args_for_display, last_line_truncated, summarize_exit,
};
use crate::workspace::Workspace;

/// Never seek further than this; later data may not be in the fetched prefix.
pub const MAX_SEEK_OFFSET_SECS: f64 = 2.0;

/// Matches `out-0001.webp` style names produced by the image2 muxer.
static FRAME_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^out-\d{4,}\.([A-Za-z0-9]+)$").expect("frame file regex"));

/// The image served to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// File name inside the workspace, for logs.
    pub name: String,
}

/// Seek position: a tenth of the duration, capped at [`MAX_SEEK_OFFSET_SECS`].
/// Unknown, negative or non-finite durations seek to the start.
pub fn seek_offset(duration: f64) -> f64 {
    if !duration.is_finite() || duration <= 0.0 {
        return 0.0;
    }
    (duration / 10.0).min(MAX_SEEK_OFFSET_SECS)
}

/// Frame files in `dir` with the given extension, in ascending lexicographic order.
pub async fn list_frames(dir: &Path, extension: &str) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let matches = FRAME_FILE
            .captures(&name)
            .and_then(|c| c.get(1))
            .is_some_and(|ext| ext.as_str() == extension);
        if matches && entry.file_type().await?.is_file() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// The frame that sorts last. With zero-padded numbering this is the highest-numbered one.
pub async fn select_last_frame(dir: &Path, extension: &str) -> io::Result<Option<PathBuf>> {
    Ok(list_frames(dir, extension)
        .await?
        .pop()
        .map(|name| dir.join(name)))
}

#[derive(Clone)]
pub struct FrameExtractor {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: PathBuf,
    options: FrameOptions,
    timeout: Duration,
}

impl FrameExtractor {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        ffmpeg: PathBuf,
        options: FrameOptions,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            ffmpeg,
            options,
            timeout,
        }
    }

    pub async fn extract(
        &self,
        input: &Path,
        info: &MediaInfo,
        workspace: &Workspace,
    ) -> Result<Frame, ThumbError> {
        let offset = seek_offset(info.duration);
        log::info!(
            target: "thumby::extract",
            "Get thumbnail at time {:.6}",
            offset
        );

        let args = build_extract_args(input, offset, &self.options);
        log::debug!(
            target: "thumby::extract",
            "ffmpeg {}",
            format_args_for_display(&args)
        );
        let invocation = ToolInvocation::new(&self.ffmpeg, args)
            .in_dir(workspace.path())
            .with_deadline(self.timeout);

        let output = self.runner.run(invocation).await.map_err(|e| match e {
            ToolError::TimedOut(limit) => ThumbError::ExtractionTimeout(limit),
            ToolError::Spawn { .. } => ThumbError::Extraction {
                code: -1,
                summary: summarize_exit(Some(-1)),
            },
            ToolError::Io(e) => ThumbError::Extraction {
                code: -1,
                summary: format!("lost track of FFmpeg: {}", e.kind()),
            },
        })?;

        if !output.success() {
            log::warn!(
                target: "thumby::extract",
                "ffmpeg failed (code={:?}): {}",
                output.code,
                last_line_truncated(&output.stderr, 240)
            );
            return Err(ThumbError::Extraction {
                code: output.code.unwrap_or(-1),
                summary: summarize_exit(output.code),
            });
        }

        // A successful exit does not guarantee output: short or broken input can yield nothing.
        let extension = self.options.format.extension();
        let frame_path = select_last_frame(workspace.path(), extension)
            .await
            .map_err(ThumbError::Workspace)?
            .ok_or(ThumbError::NoFrame)?;
        let bytes = tokio::fs::read(&frame_path)
            .await
            .map_err(ThumbError::Workspace)?;
        let name = frame_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        log::debug!(
            target: "thumby::extract",
            "selected {} ({} bytes)",
            name,
            bytes.len()
        );

        Ok(Frame {
            bytes,
            content_type: self.options.format.content_type(),
            name,
        })
    }
}
