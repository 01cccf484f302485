//! The thumbnail pipeline: resolve → workspace → fetch → probe → extract.
//!
//! Stages run strictly in sequence and no stage retries another; the fetch ladder is the only
//! recovery mechanism. The workspace is removed on every exit path before the result is
//! returned.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ThumbError;
use crate::extract::{Frame, FrameExtractor};
use crate::fetch::AdaptiveFetcher;
use crate::ffmpeg::DurationProber;
use crate::uri::{ThumbnailRequest, UriResolver};
use crate::workspace::Workspace;

struct Stages {
    resolver: UriResolver,
    fetcher: AdaptiveFetcher,
    prober: DurationProber,
    extractor: FrameExtractor,
    workspace_root: PathBuf,
}

/// Cheap to clone; clones share the same stages.
#[derive(Clone)]
pub struct ThumbnailPipeline {
    stages: Arc<Stages>,
}

impl ThumbnailPipeline {
    pub fn new(
        resolver: UriResolver,
        fetcher: AdaptiveFetcher,
        prober: DurationProber,
        extractor: FrameExtractor,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stages: Arc::new(Stages {
                resolver,
                fetcher,
                prober,
                extractor,
                workspace_root: workspace_root.into(),
            }),
        }
    }

    /// Produce the frame for an encoded source URI.
    pub async fn run(&self, encoded: &str) -> Result<Frame, ThumbError> {
        let request = self.stages.resolver.resolve(encoded)?;
        let started = Instant::now();

        let workspace = Workspace::create(&self.stages.workspace_root)
            .await
            .map_err(ThumbError::Workspace)?;
        let result = self.run_in(&request, &workspace).await;
        // Removal errors are logged by close(); they do not change the outcome.
        let _ = workspace.close().await;

        match &result {
            Ok(frame) => log::info!(
                target: "thumby::pipeline",
                "thumbnail for {} ready in {}ms ({} bytes)",
                request.basename(),
                started.elapsed().as_millis(),
                frame.bytes.len()
            ),
            Err(e) => log::warn!(
                target: "thumby::pipeline",
                "thumbnail for {} failed at {}: {}",
                request.basename(),
                e.stage(),
                e
            ),
        }
        result
    }

    async fn run_in(
        &self,
        request: &ThumbnailRequest,
        workspace: &Workspace,
    ) -> Result<Frame, ThumbError> {
        let fetched = self.stages.fetcher.fetch(request, workspace).await?;
        let info = self
            .stages
            .prober
            .probe(request.format(), &fetched.path)
            .await?;
        self.stages
            .extractor
            .extract(&fetched.path, &info, workspace)
            .await
    }
}
