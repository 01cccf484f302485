//! Map converter exit codes to short messages.
//!
//! Exit codes are from ffmpeg.c: 1 (general), 69 (rate exceeded),
//! 123 (hard exit), 255 (signal). Stderr often names workspace paths, so it only goes to
//! the log, never into a summary.

/// Short summary for an exit code. `None` means the process was ended by a signal.
pub fn summarize_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => known_exit_code_summary(code).unwrap_or_else(|| summary_for_unknown_code(code)),
        None => "FFmpeg was terminated by a signal.".into(),
    }
}

/// Source-verified exit codes from ffmpeg.c.
fn known_exit_code_summary(code: i32) -> Option<String> {
    match code {
        -1 => Some("FFmpeg not found or failed to start.".into()),
        1 => Some("FFmpeg failed.".into()),
        69 => Some("Encoding rate limit exceeded.".into()),
        123 | 255 => Some("Encoding was stopped.".into()),
        _ => None,
    }
}

fn summary_for_unknown_code(code: i32) -> String {
    format!("FFmpeg failed (exit code {}).", code)
}

const ELLIPSIS: &str = "…";

/// Last non-empty stderr line truncated to `max_len` bytes, for log lines.
pub fn last_line_truncated(stderr: &str, max_len: usize) -> String {
    let last = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim())
        .unwrap_or("");
    if last.len() <= max_len {
        return last.to_string();
    }
    let mut cut = max_len.saturating_sub(ELLIPSIS.len());
    while !last.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &last[..cut], ELLIPSIS)
}
