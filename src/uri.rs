//! Decoding and validation of the client-supplied media URI.
//!
//! The path segment is URL-safe base64. After decoding, the URI is normalized for fetching
//! (plain `http`, legacy `.mpg` alias rewritten to the container the origin serves today)
//! and its host is checked against the allowed domain. No network access happens here.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use url::Url;

use crate::error::ThumbError;

/// Container extension the origin currently produces for videos.
pub const CANONICAL_VIDEO_EXTENSION: &str = "mp4";

/// Extensions still found in old links that now resolve to [`CANONICAL_VIDEO_EXTENSION`].
const LEGACY_VIDEO_ALIASES: &[&str] = &["mpg"];

/// Accepts both padded and unpadded input; clients disagree on this.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Mp4,
    Gif,
}

impl SourceFormat {
    pub fn detect(uri: &Url) -> Self {
        if uri.path().to_ascii_lowercase().ends_with(".gif") {
            SourceFormat::Gif
        } else {
            SourceFormat::Mp4
        }
    }

    /// File name the fetched prefix is stored under inside the workspace.
    pub fn target_file_name(self) -> &'static str {
        match self {
            SourceFormat::Mp4 => "file.mp4",
            SourceFormat::Gif => "file.gif",
        }
    }

    /// GIFs carry no useful duration metadata, so probing is skipped for them.
    pub fn has_duration(self) -> bool {
        matches!(self, SourceFormat::Mp4)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Mp4 => "mp4",
            SourceFormat::Gif => "gif",
        }
    }
}

/// A decoded and validated request. Only [`UriResolver::resolve`] constructs one.
#[derive(Debug, Clone)]
pub struct ThumbnailRequest {
    uri: Url,
    format: SourceFormat,
}

impl ThumbnailRequest {
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Last path segment, used in log lines.
    pub fn basename(&self) -> &str {
        self.uri
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.uri.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct UriResolver {
    allowed_domain: String,
}

impl UriResolver {
    pub fn new(allowed_domain: impl Into<String>) -> Self {
        Self {
            allowed_domain: allowed_domain
                .into()
                .trim()
                .trim_matches('.')
                .to_ascii_lowercase(),
        }
    }

    /// Decode, normalize and validate. Decoding problems and policy violations are
    /// reported as different error variants.
    pub fn resolve(&self, encoded: &str) -> Result<ThumbnailRequest, ThumbError> {
        let decoded = decode_uri(encoded)?;
        let uri = self.validate(&decoded)?;
        let format = SourceFormat::detect(&uri);
        Ok(ThumbnailRequest { uri, format })
    }

    /// Checks an already normalized URI against the allow-list.
    pub fn validate(&self, uri: &str) -> Result<Url, ThumbError> {
        let parsed =
            Url::parse(uri).map_err(|_| ThumbError::Validation("not an absolute uri".into()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ThumbError::Validation(format!(
                "scheme {} is not supported",
                parsed.scheme()
            )));
        }
        let host = parsed
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| ThumbError::Validation("uri has no host".into()))?;
        if !self.host_allowed(&host) {
            return Err(ThumbError::Validation(format!("host {} is not allowed", host)));
        }
        Ok(parsed)
    }

    fn host_allowed(&self, host: &str) -> bool {
        if self.allowed_domain.is_empty() {
            return false;
        }
        host == self.allowed_domain
            || host
                .strip_suffix(self.allowed_domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// Base64url-decode the path segment and normalize the result for fetching.
pub fn decode_uri(encoded: &str) -> Result<String, ThumbError> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(ThumbError::Decode("no encoded url found".into()));
    }
    let bytes = URL_SAFE_LENIENT
        .decode(encoded)
        .map_err(|e| ThumbError::Decode(e.to_string()))?;
    let text =
        String::from_utf8(bytes).map_err(|_| ThumbError::Decode("uri is not valid utf-8".into()))?;
    Ok(normalize_uri(&text))
}

/// Trim, downgrade `https` to `http` and rewrite legacy video extensions.
pub fn normalize_uri(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut uri = match trimmed.get(..8) {
        Some(prefix) if prefix.eq_ignore_ascii_case("https://") => {
            format!("http://{}", &trimmed[8..])
        }
        _ => trimmed.to_string(),
    };
    rewrite_legacy_extension(&mut uri);
    uri
}

fn rewrite_legacy_extension(uri: &mut String) {
    // Extension sits before any query or fragment.
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    for alias in LEGACY_VIDEO_ALIASES {
        let suffix = format!(".{}", alias);
        let Some(head) = uri.get(..end) else {
            return;
        };
        let matches = head
            .len()
            .checked_sub(suffix.len())
            .and_then(|start| head.get(start..))
            .is_some_and(|tail| tail.eq_ignore_ascii_case(&suffix));
        if matches {
            let start = end - alias.len();
            uri.replace_range(start..end, CANONICAL_VIDEO_EXTENSION);
            return;
        }
    }
}
