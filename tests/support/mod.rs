#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use parking_lot::Mutex;
use tempfile::TempDir;
use thumby_core::ThumbnailPipeline;
use thumby_core::error::AttemptError;
use thumby_core::extract::FrameExtractor;
use thumby_core::fetch::{AdaptiveFetcher, FetchLadder, RangeSource};
use thumby_core::ffmpeg::{
    DurationProber, FrameOptions, ToolError, ToolInvocation, ToolOutput, ToolRunner,
};
use thumby_core::uri::UriResolver;
use url::Url;

pub const KB: u64 = 1024;

pub fn encode(uri: &str) -> String {
    URL_SAFE.encode(uri)
}

/// Origin double: refuses ranges below `min_ok` bytes and records every budget asked for.
pub struct ScriptedSource {
    min_ok: Option<u64>,
    pub budgets: Mutex<Vec<u64>>,
    pub uris: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn accepting_from(min_ok: u64) -> Arc<Self> {
        Arc::new(Self {
            min_ok: Some(min_ok),
            budgets: Mutex::new(Vec::new()),
            uris: Mutex::new(Vec::new()),
        })
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            min_ok: None,
            budgets: Mutex::new(Vec::new()),
            uris: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.budgets.lock().len()
    }
}

#[async_trait]
impl RangeSource for ScriptedSource {
    async fn fetch_prefix(
        &self,
        uri: &Url,
        budget: u64,
        target: &Path,
    ) -> Result<u64, AttemptError> {
        self.budgets.lock().push(budget);
        self.uris.lock().push(uri.to_string());
        match self.min_ok {
            Some(min) if budget >= min => {
                std::fs::write(target, b"media prefix")?;
                Ok(12)
            }
            _ => Err(AttemptError::Status(416)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ConverterBehaviour {
    /// Write these frame files and exit 0.
    Frames(&'static [&'static str]),
    /// Exit with this code without writing anything.
    Fail(i32),
    /// Never finish before the deadline.
    Hang,
}

/// Stands in for both ffprobe and ffmpeg, told apart by program name.
pub struct ScriptedTools {
    pub probe_json: String,
    pub probe_code: i32,
    pub converter: ConverterBehaviour,
    /// Artificial work inside the converter.
    pub work: Duration,
    pub running: AtomicUsize,
    pub peak: AtomicUsize,
    pub probe_calls: AtomicUsize,
    pub convert_calls: AtomicUsize,
    pub workspaces: Mutex<Vec<PathBuf>>,
}

impl ScriptedTools {
    pub fn new(converter: ConverterBehaviour) -> Self {
        Self {
            probe_json: r#"{"format": {"duration": "30.0"}}"#.to_string(),
            probe_code: 0,
            converter,
            work: Duration::ZERO,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            convert_calls: AtomicUsize::new(0),
            workspaces: Mutex::new(Vec::new()),
        }
    }

    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    pub fn with_probe(mut self, code: i32, json: &str) -> Self {
        self.probe_code = code;
        self.probe_json = json.to_string();
        self
    }
}

#[async_trait]
impl ToolRunner for ScriptedTools {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let program = invocation.program.to_string_lossy().to_string();
        if program.ends_with("ffprobe") {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(ToolOutput {
                code: Some(self.probe_code),
                stdout: self.probe_json.as_bytes().to_vec(),
                stderr: String::new(),
            });
        }

        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        let cwd = invocation.cwd.clone().expect("converter runs in a workspace");
        self.workspaces.lock().push(cwd.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        match self.converter {
            ConverterBehaviour::Frames(names) => {
                for name in names {
                    std::fs::write(cwd.join(name), name.as_bytes())?;
                }
                Ok(ToolOutput {
                    code: Some(0),
                    ..ToolOutput::default()
                })
            }
            ConverterBehaviour::Fail(code) => Ok(ToolOutput {
                code: Some(code),
                stdout: Vec::new(),
                stderr: format!("{}/file.mp4: Invalid data found", cwd.display()),
            }),
            ConverterBehaviour::Hang => {
                let deadline = invocation.deadline.unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(deadline).await;
                Err(ToolError::TimedOut(deadline))
            }
        }
    }
}

/// A pipeline wired to doubles, with its own workspace root.
pub struct TestPipeline {
    pub root: TempDir,
    pub pipeline: ThumbnailPipeline,
    pub source: Arc<ScriptedSource>,
    pub tools: Arc<ScriptedTools>,
}

impl TestPipeline {
    pub fn new(source: Arc<ScriptedSource>, tools: ScriptedTools) -> Self {
        let root = tempfile::tempdir().expect("workspace root");
        let tools = Arc::new(tools);
        let runner: Arc<dyn ToolRunner> = tools.clone();
        let pipeline = ThumbnailPipeline::new(
            UriResolver::new("pr0gramm.com"),
            AdaptiveFetcher::new(source.clone(), FetchLadder::default()),
            DurationProber::new(
                Arc::clone(&runner),
                PathBuf::from("/opt/bin/ffprobe"),
                Duration::from_secs(5),
            ),
            FrameExtractor::new(
                runner,
                PathBuf::from("/opt/bin/ffmpeg"),
                FrameOptions::default(),
                Duration::from_millis(200),
            ),
            root.path(),
        );
        Self {
            root,
            pipeline,
            source,
            tools,
        }
    }

    /// Entries left under the workspace root.
    pub fn leftovers(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.root.path())
            .expect("read root")
            .map(|e| e.expect("entry").path())
            .collect()
    }
}
