//! Adaptive prefix download.
//!
//! Most media puts what the converter needs near the start of the file, so only a prefix is
//! fetched. The ladder of byte budgets is the retry policy: each failed attempt moves to the
//! next larger budget, the first acceptable response wins, and running out of budgets is final.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{AttemptError, ThumbError};
use crate::uri::{SourceFormat, ThumbnailRequest};
use crate::workspace::Workspace;

const KB: u64 = 1024;

/// Byte budgets to try, smallest first, per source format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchLadder {
    video: Vec<u64>,
    gif: Vec<u64>,
}

impl Default for FetchLadder {
    fn default() -> Self {
        Self::from_kb(&[128, 256, 512, 1024], &[256, 512, 1024])
    }
}

impl FetchLadder {
    /// Budgets in kilobytes. Zero entries are dropped; the rest are sorted and deduplicated.
    pub fn from_kb(video_kb: &[u64], gif_kb: &[u64]) -> Self {
        Self {
            video: normalize_budgets(video_kb),
            gif: normalize_budgets(gif_kb),
        }
    }

    pub fn for_format(&self, format: SourceFormat) -> &[u64] {
        match format {
            SourceFormat::Mp4 => &self.video,
            SourceFormat::Gif => &self.gif,
        }
    }
}

fn normalize_budgets(kb: &[u64]) -> Vec<u64> {
    let mut budgets: Vec<u64> = kb
        .iter()
        .filter(|&&k| k > 0)
        .map(|&k| k.saturating_mul(KB))
        .collect();
    budgets.sort_unstable();
    budgets.dedup();
    budgets
}

/// One ranged read against the origin.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Read bytes `0..budget` of `uri` into `target`, replacing its contents.
    /// Returns the number of bytes written.
    async fn fetch_prefix(&self, uri: &Url, budget: u64, target: &Path)
    -> Result<u64, AttemptError>;
}

/// [`RangeSource`] over HTTP. The client is shared; its connection pool is safe to use from
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct HttpRangeSource {
    client: reqwest::Client,
}

impl HttpRangeSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn fetch_prefix(
        &self,
        uri: &Url,
        budget: u64,
        target: &Path,
    ) -> Result<u64, AttemptError> {
        let response = self
            .client
            .get(uri.as_str())
            .header(RANGE, format!("bytes=0-{}", budget.saturating_sub(1)))
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(AttemptError::Status(status.as_u16()));
        }

        let mut file = tokio::fs::File::create(target).await?;
        let mut body = response.bytes_stream();
        let mut written: u64 = 0;
        // Origins that ignore Range send the whole file; stop at the budget anyway.
        while written < budget {
            let Some(chunk) = body.next().await else {
                break;
            };
            let chunk = chunk.map_err(|e| AttemptError::Transport(e.without_url().to_string()))?;
            let room = usize::try_from(budget - written).unwrap_or(usize::MAX);
            let take = chunk.len().min(room);
            file.write_all(&chunk[..take]).await?;
            written += take as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub bytes: u64,
    /// Budget of the attempt that succeeded.
    pub budget: u64,
}

#[derive(Clone)]
pub struct AdaptiveFetcher {
    source: Arc<dyn RangeSource>,
    ladder: FetchLadder,
}

impl AdaptiveFetcher {
    pub fn new(source: Arc<dyn RangeSource>, ladder: FetchLadder) -> Self {
        Self { source, ladder }
    }

    /// Walk the ladder for the request's format until one attempt succeeds.
    pub async fn fetch(
        &self,
        request: &ThumbnailRequest,
        workspace: &Workspace,
    ) -> Result<FetchedMedia, ThumbError> {
        let target = workspace.file(request.format().target_file_name());
        let budgets = self.ladder.for_format(request.format());
        let mut last_error = None;

        for &budget in budgets {
            log::info!(
                target: "thumby::fetch",
                "Try to get thumbnail for {} with size {}kb",
                request.basename(),
                budget / KB
            );
            match self.source.fetch_prefix(request.uri(), budget, &target).await {
                Ok(bytes) => {
                    log::debug!(
                        target: "thumby::fetch",
                        "fetched {} bytes of {} (budget {}kb)",
                        bytes,
                        request.basename(),
                        budget / KB
                    );
                    return Ok(FetchedMedia {
                        path: target,
                        bytes,
                        budget,
                    });
                }
                Err(e) => {
                    log::debug!(
                        target: "thumby::fetch",
                        "attempt with {}kb failed for {}: {}",
                        budget / KB,
                        request.basename(),
                        e
                    );
                    discard_partial(&target).await;
                    last_error = Some(e);
                }
            }
        }

        Err(ThumbError::Fetch {
            attempts: budgets.len(),
            source: last_error.unwrap_or_else(|| {
                AttemptError::Transport("no fetch budgets configured".to_string())
            }),
        })
    }
}

async fn discard_partial(target: &Path) {
    if let Err(e) = tokio::fs::remove_file(target).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::debug!(
            target: "thumby::fetch",
            "could not remove partial download: {}",
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::UriResolver;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE;
    use parking_lot::Mutex;

    /// Origin that refuses ranges smaller than `min_ok` bytes.
    struct ThresholdSource {
        min_ok: Option<u64>,
        seen: Mutex<Vec<u64>>,
    }

    impl ThresholdSource {
        fn new(min_ok: Option<u64>) -> Arc<Self> {
            Arc::new(Self {
                min_ok,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RangeSource for ThresholdSource {
        async fn fetch_prefix(
            &self,
            _uri: &Url,
            budget: u64,
            target: &Path,
        ) -> Result<u64, AttemptError> {
            self.seen.lock().push(budget);
            match self.min_ok {
                Some(min) if budget >= min => {
                    tokio::fs::write(target, vec![7u8; 16]).await?;
                    Ok(16)
                }
                _ => {
                    tokio::fs::write(target, b"partial").await?;
                    Err(AttemptError::Status(416))
                }
            }
        }
    }

    fn request(uri: &str) -> ThumbnailRequest {
        UriResolver::new("pr0gramm.com")
            .resolve(&URL_SAFE.encode(uri))
            .expect("valid request")
    }

    #[test]
    fn ladder_is_sorted_deduplicated_and_in_bytes() {
        let ladder = FetchLadder::from_kb(&[512, 0, 128, 512], &[]);
        assert_eq!(ladder.for_format(SourceFormat::Mp4), &[128 * KB, 512 * KB]);
        assert!(ladder.for_format(SourceFormat::Gif).is_empty());
    }

    #[tokio::test]
    async fn stops_at_first_budget_that_satisfies_origin() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        let source = ThresholdSource::new(Some(300 * KB));
        let fetcher = AdaptiveFetcher::new(source.clone(), FetchLadder::default());

        let fetched = fetcher
            .fetch(&request("http://vid.pr0gramm.com/a.mp4"), &ws)
            .await
            .unwrap();

        assert_eq!(fetched.budget, 512 * KB);
        assert_eq!(fetched.path, ws.file("file.mp4"));
        assert_eq!(*source.seen.lock(), vec![128 * KB, 256 * KB, 512 * KB]);
    }

    #[tokio::test]
    async fn exact_ladder_value_is_used() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        let source = ThresholdSource::new(Some(256 * KB));
        let fetcher = AdaptiveFetcher::new(source.clone(), FetchLadder::default());

        let fetched = fetcher
            .fetch(&request("http://vid.pr0gramm.com/a.mp4"), &ws)
            .await
            .unwrap();
        assert_eq!(fetched.budget, 256 * KB);
        assert_eq!(source.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_ladder_reports_last_cause_and_leaves_no_file() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        let source = ThresholdSource::new(None);
        let fetcher = AdaptiveFetcher::new(source.clone(), FetchLadder::default());

        let err = fetcher
            .fetch(&request("http://vid.pr0gramm.com/a.mp4"), &ws)
            .await
            .unwrap_err();

        match err {
            ThumbError::Fetch { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(matches!(source, AttemptError::Status(416)));
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
        assert_eq!(source.seen.lock().len(), 4);
        assert!(!ws.file("file.mp4").exists());
    }

    #[tokio::test]
    async fn gif_uses_its_own_ladder_and_target() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        let source = ThresholdSource::new(Some(0));
        let fetcher = AdaptiveFetcher::new(source.clone(), FetchLadder::default());

        let fetched = fetcher
            .fetch(&request("http://img.pr0gramm.com/a.gif"), &ws)
            .await
            .unwrap();
        assert_eq!(fetched.path, ws.file("file.gif"));
        assert_eq!(*source.seen.lock(), vec![256 * KB]);
    }

    #[tokio::test]
    async fn empty_ladder_is_fetch_error() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        let source = ThresholdSource::new(Some(0));
        let fetcher = AdaptiveFetcher::new(source.clone(), FetchLadder::from_kb(&[], &[]));

        let err = fetcher
            .fetch(&request("http://vid.pr0gramm.com/a.mp4"), &ws)
            .await
            .unwrap_err();
        assert!(matches!(err, ThumbError::Fetch { attempts: 0, .. }));
        assert!(source.seen.lock().is_empty());
    }
}
