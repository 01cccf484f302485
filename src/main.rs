use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use thumby_core::admission::AdmissionController;
use thumby_core::config::Config;
use thumby_core::extract::FrameExtractor;
use thumby_core::fetch::{AdaptiveFetcher, HttpRangeSource};
use thumby_core::ffmpeg::{DurationProber, ProcessRunner, ToolPaths, ToolRunner};
use thumby_core::server::{self, AppState};
use thumby_core::uri::UriResolver;
use thumby_core::{ThumbnailPipeline, logging, workspace};

async fn shutdown_signal(admission: AdmissionController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!(target: "thumby::main", "cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!(target: "thumby::main", "cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!(target: "thumby::main", "shutdown requested");
    admission.close();
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let config = Config::parse();
    logging::init(&config.log_level);

    workspace::cleanup_stale_workspaces(&config.path, config.stale_workspace_age());

    let tools = ToolPaths::discover(
        config.ffmpeg.as_deref(),
        config.ffprobe.as_deref(),
        Some(&config.path),
    );
    log::info!(
        target: "thumby::main",
        "using ffmpeg={} ffprobe={}",
        tools.ffmpeg.display(),
        tools.ffprobe.display()
    );

    let source = HttpRangeSource::new(config.fetch_timeout())
        .map_err(|e| io::Error::other(format!("build http client: {}", e)))?;
    let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner);
    let pipeline = ThumbnailPipeline::new(
        UriResolver::new(config.allowed_domain.clone()),
        AdaptiveFetcher::new(Arc::new(source), config.ladder()),
        DurationProber::new(Arc::clone(&runner), tools.ffprobe, config.probe_timeout()),
        FrameExtractor::new(
            runner,
            tools.ffmpeg,
            config.frame_options(),
            config.extract_timeout(),
        ),
        config.path.clone(),
    );
    let admission = AdmissionController::new(config.concurrent as usize);
    log::info!(
        target: "thumby::main",
        "admitting {} concurrent pipelines, workspaces under {}",
        admission.capacity(),
        config.path.display()
    );

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let state = AppState {
        pipeline,
        admission: admission.clone(),
    };
    server::serve(listener, state, shutdown_signal(admission)).await
}
