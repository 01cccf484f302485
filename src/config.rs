//! Command line configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::fetch::FetchLadder;
use crate::ffmpeg::{FrameOptions, OutputFormat};

#[derive(Debug, Clone, Parser)]
#[command(name = "thumby", version, about = "Serves still-frame thumbnails for remote videos")]
pub struct Config {
    /// The port to open the rest service on
    #[arg(short, long, env = "THUMBY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Maximum number of concurrent thumbnail pipelines
    #[arg(short, long, env = "THUMBY_CONCURRENT", default_value_t = 16,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrent: u32,

    /// Where to put temp folders; also searched first for ffmpeg and ffprobe
    #[arg(long, env = "THUMBY_PATH", default_value = "/tmp")]
    pub path: PathBuf,

    /// Explicit ffmpeg binary
    #[arg(long, env = "FFMPEG_PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Explicit ffprobe binary
    #[arg(long, env = "FFPROBE_PATH")]
    pub ffprobe: Option<PathBuf>,

    /// Domain (and its subdomains) media may be fetched from
    #[arg(long, env = "THUMBY_ALLOWED_DOMAIN", default_value = "pr0gramm.com")]
    pub allowed_domain: String,

    #[arg(long, env = "THUMBY_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "THUMBY_PROBE_TIMEOUT_SECS", default_value_t = 10)]
    pub probe_timeout_secs: u64,

    /// Hard limit for a single ffmpeg run; the process is killed afterwards
    #[arg(long, env = "THUMBY_EXTRACT_TIMEOUT_SECS", default_value_t = 10)]
    pub extract_timeout_secs: u64,

    /// Range sizes in KB tried for videos, smallest first
    #[arg(long, env = "THUMBY_VIDEO_LADDER_KB", value_delimiter = ',',
          default_values_t = [128u64, 256, 512, 1024])]
    pub video_ladder_kb: Vec<u64>,

    /// Range sizes in KB tried for GIFs, smallest first
    #[arg(long, env = "THUMBY_GIF_LADDER_KB", value_delimiter = ',',
          default_values_t = [256u64, 512, 1024])]
    pub gif_ladder_kb: Vec<u64>,

    /// Number of frames ffmpeg writes; the last one is served
    #[arg(long, env = "THUMBY_FRAME_COUNT", default_value_t = 1)]
    pub frame_count: u32,

    #[arg(long, env = "THUMBY_OUTPUT_FORMAT", value_enum,
          default_value_t = ImageFormat::Webp)]
    pub output_format: ImageFormat,

    /// Workspaces older than this are removed at startup
    #[arg(long, env = "THUMBY_STALE_WORKSPACE_HOURS", default_value_t = 24)]
    pub stale_workspace_hours: u64,

    /// Default log level when RUST_LOG is not set
    #[arg(long, env = "THUMBY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Command line spelling of [`OutputFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImageFormat {
    Webp,
    Jpeg,
}

impl From<ImageFormat> for OutputFormat {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Webp => OutputFormat::Webp,
            ImageFormat::Jpeg => OutputFormat::Jpeg,
        }
    }
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs.max(1))
    }

    pub fn stale_workspace_age(&self) -> Duration {
        Duration::from_secs(self.stale_workspace_hours.saturating_mul(60 * 60))
    }

    pub fn ladder(&self) -> FetchLadder {
        FetchLadder::from_kb(&self.video_ladder_kb, &self.gif_ladder_kb)
    }

    pub fn frame_options(&self) -> FrameOptions {
        FrameOptions {
            frame_count: self.frame_count.max(1),
            format: self.output_format.into(),
            ..FrameOptions::default()
        }
    }
}
