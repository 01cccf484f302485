//! Argument lists for the frame converter.

use std::path::Path;

use super::path_to_string;

/// Image container written by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Webp,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

/// How frames are rendered. Defaults cap the width at 1024px and blur lightly to hide
/// compression artifacts of the source.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOptions {
    pub max_width: u32,
    pub blur: Option<String>,
    /// `-q:v` value handed to the encoder.
    pub quality: u32,
    pub frame_count: u32,
    pub format: OutputFormat,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            max_width: 1024,
            blur: Some("boxblur=1:1".to_string()),
            quality: 20,
            frame_count: 1,
            format: OutputFormat::Webp,
        }
    }
}

/// Frame files are named `out-0001.<ext>`, `out-0002.<ext>`, ...
pub const OUTPUT_PREFIX: &str = "out-";

impl FrameOptions {
    /// printf-style pattern understood by the image2 muxer.
    pub fn output_pattern(&self) -> String {
        format!("{}%04d.{}", OUTPUT_PREFIX, self.format.extension())
    }

    pub fn filter_chain(&self) -> String {
        let scale = format!(
            "scale='if(gt(iw,{w}),{w},iw)':-1",
            w = self.max_width
        );
        match self.blur.as_deref().filter(|b| !b.is_empty()) {
            Some(blur) => format!("{},{}", scale, blur),
            None => scale,
        }
    }
}

/// Build the converter arguments. Output is relative, so the process must run inside the
/// workspace.
pub fn build_extract_args(input: &Path, offset_secs: f64, options: &FrameOptions) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        path_to_string(input),
        "-ss".to_string(),
        format!("{:.6}", offset_secs),
        "-vf".to_string(),
        options.filter_chain(),
        "-f".to_string(),
        "image2".to_string(),
        "-q:v".to_string(),
        options.quality.to_string(),
        "-vframes".to_string(),
        options.frame_count.max(1).to_string(),
        options.output_pattern(),
    ]
}

/// Join args for logging, quoting the ones with spaces or quotes.
pub fn format_args_for_display(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.contains(' ') || a.contains('\'') {
                format!("\"{}\"", a)
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_args_match_thumbnail_recipe() {
        let args = build_extract_args(Path::new("file.mp4"), 1.5, &FrameOptions::default());
        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "file.mp4",
                "-ss",
                "1.500000",
                "-vf",
                "scale='if(gt(iw,1024),1024,iw)':-1,boxblur=1:1",
                "-f",
                "image2",
                "-q:v",
                "20",
                "-vframes",
                "1",
                "out-%04d.webp",
            ]
        );
    }

    #[test]
    fn frame_count_is_at_least_one() {
        let options = FrameOptions {
            frame_count: 0,
            ..FrameOptions::default()
        };
        let args = build_extract_args(Path::new("file.gif"), 0.0, &options);
        let pos = args.iter().position(|a| a == "-vframes").unwrap();
        assert_eq!(args[pos + 1], "1");
    }

    #[test]
    fn jpeg_output_and_no_blur() {
        let options = FrameOptions {
            max_width: 640,
            blur: None,
            format: OutputFormat::Jpeg,
            ..FrameOptions::default()
        };
        assert_eq!(options.filter_chain(), "scale='if(gt(iw,640),640,iw)':-1");
        assert_eq!(options.output_pattern(), "out-%04d.jpg");
        assert_eq!(options.format.content_type(), "image/jpeg");
    }

    #[test]
    fn display_quotes_filter() {
        let shown = format_args_for_display(&["-vf".into(), "scale='a'".into()]);
        assert_eq!(shown, "-vf \"scale='a'\"");
    }
}
