//! Error taxonomy for the thumbnail pipeline. Display texts are safe to send to clients:
//! no workspace paths, no raw converter stderr.

use std::time::Duration;

/// Why a single ranged read failed. The ladder moves on to the next budget on any of these.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("origin answered with status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("could not write fetched data: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbError {
    #[error("Could not decode uri string: {0}")]
    Decode(String),

    #[error("Uri not allowed: {0}")]
    Validation(String),

    #[error("Could not download media file after {attempts} attempts: {source}")]
    Fetch {
        attempts: usize,
        #[source]
        source: AttemptError,
    },

    #[error("Could not get video info: {0}")]
    Probe(String),

    #[error("FFmpeg did not finish within {}s", .0.as_secs_f64())]
    ExtractionTimeout(Duration),

    #[error("FFmpeg stopped with an error (code {code}): {summary}")]
    Extraction { code: i32, summary: String },

    #[error("No resulting images found")]
    NoFrame,

    #[error("Could not prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Service is shutting down")]
    Unavailable,
}

impl ThumbError {
    /// Short name of the pipeline stage that produced this error, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            ThumbError::Decode(_) => "decode",
            ThumbError::Validation(_) => "validate",
            ThumbError::Fetch { .. } => "fetch",
            ThumbError::Probe(_) => "probe",
            ThumbError::ExtractionTimeout(_)
            | ThumbError::Extraction { .. }
            | ThumbError::NoFrame => "extract",
            ThumbError::Workspace(_) => "workspace",
            ThumbError::Unavailable => "admission",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_mentions_last_cause() {
        let e = ThumbError::Fetch {
            attempts: 4,
            source: AttemptError::Status(416),
        };
        let text = e.to_string();
        assert!(text.contains("4 attempts"));
        assert!(text.contains("416"));
        assert_eq!(e.stage(), "fetch");
    }

    #[test]
    fn timeout_message_reports_seconds() {
        let e = ThumbError::ExtractionTimeout(Duration::from_secs(10));
        assert_eq!(e.to_string(), "FFmpeg did not finish within 10s");
        assert_eq!(e.stage(), "extract");
    }
}
