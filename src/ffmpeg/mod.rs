mod builder;
pub mod discovery;
mod error;
pub mod ffprobe;
pub mod runner;

pub use builder::{
    FrameOptions, OUTPUT_PREFIX, OutputFormat, build_extract_args, format_args_for_display,
};
pub use discovery::ToolPaths;
pub use error::{last_line_truncated, summarize_exit};
pub use ffprobe::{DurationProber, MediaInfo, probe_media_info};
pub use runner::{ProcessRunner, ToolError, ToolInvocation, ToolOutput, ToolRunner};

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}
