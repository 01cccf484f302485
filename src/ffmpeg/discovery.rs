use std::path::{Path, PathBuf};
use std::process::Command;

/// Resolved locations of the converter and the metadata inspector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl ToolPaths {
    /// Resolve both tools. Explicit paths win, then `tool_dir`, then `PATH`, then common
    /// install locations. When nothing is found the bare name is kept, so the failure shows
    /// up as a spawn error of the stage that needs the tool.
    pub fn discover(
        ffmpeg: Option<&Path>,
        ffprobe: Option<&Path>,
        tool_dir: Option<&Path>,
    ) -> Self {
        Self {
            ffmpeg: resolve_tool("ffmpeg", ffmpeg, tool_dir),
            ffprobe: resolve_tool("ffprobe", ffprobe, tool_dir),
        }
    }
}

#[cfg(target_os = "windows")]
fn find_in_path(name: &str) -> Option<PathBuf> {
    let output = Command::new("where").arg(name).output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

#[cfg(not(target_os = "windows"))]
fn find_in_path(name: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(name).output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

fn common_dirs() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin"),
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/opt/local/bin"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![PathBuf::from("/usr/bin"), PathBuf::from("/usr/local/bin")]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

fn executable_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Find a single tool binary by name.
pub fn resolve_tool(name: &str, explicit: Option<&Path>, tool_dir: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        if path.exists() {
            log::debug!(
                target: "thumby::ffmpeg::discovery",
                "{} from explicit path: {}",
                name,
                path.display()
            );
            return path.to_path_buf();
        }
        log::warn!(
            target: "thumby::ffmpeg::discovery",
            "configured {} path {} does not exist, searching",
            name,
            path.display()
        );
    }

    let file_name = executable_name(name);
    if let Some(dir) = tool_dir {
        let candidate = dir.join(&file_name);
        if candidate.is_file() {
            log::debug!(
                target: "thumby::ffmpeg::discovery",
                "{} found in tool dir: {}",
                name,
                candidate.display()
            );
            return candidate;
        }
    }

    if let Some(p) = find_in_path(name).filter(|p| p.exists()) {
        log::debug!(
            target: "thumby::ffmpeg::discovery",
            "{} found in PATH: {}",
            name,
            p.display()
        );
        return p;
    }

    for dir in common_dirs() {
        let candidate = dir.join(&file_name);
        if candidate.exists() {
            log::debug!(
                target: "thumby::ffmpeg::discovery",
                "{} found in common path: {}",
                name,
                candidate.display()
            );
            return candidate;
        }
    }

    log::error!(
        target: "thumby::ffmpeg::discovery",
        "{} not found in PATH or common locations; requests needing it will fail",
        name
    );
    PathBuf::from(file_name)
}
