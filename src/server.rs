//! HTTP surface: `GET /{encoded}` plus request logging, CORS and panic recovery.

use std::time::Instant;

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

use crate::admission::AdmissionController;
use crate::error::ThumbError;
use crate::pipeline::ThumbnailPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ThumbnailPipeline,
    pub admission: AdmissionController,
}

/// Status code for a pipeline failure.
pub fn status_for(error: &ThumbError) -> StatusCode {
    match error {
        ThumbError::Decode(_) => StatusCode::BAD_REQUEST,
        ThumbError::Validation(_) => StatusCode::FORBIDDEN,
        ThumbError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ThumbError::Fetch { .. }
        | ThumbError::Probe(_)
        | ThumbError::ExtractionTimeout(_)
        | ThumbError::Extraction { .. }
        | ThumbError::NoFrame
        | ThumbError::Workspace(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ThumbError {
    fn into_response(self) -> Response {
        (
            status_for(&self),
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

async fn thumbnail(State(state): State<AppState>, Path(encoded): Path<String>) -> Response {
    let result = async {
        let _slot = state.admission.acquire().await?;
        state.pipeline.run(&encoded).await
    }
    .await;

    match result {
        Ok(frame) => ([(CONTENT_TYPE, frame.content_type)], frame.bytes).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    log::info!(
        target: "thumby::server",
        "{} {} -> {} in {}ms",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/{encoded}", get(thumbnail))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_requests))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!(target: "thumby::server", "listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
