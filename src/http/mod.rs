//! HTTP boundary: every request body is one event.
//!
//! Any method on any path is accepted. Responses:
//! - `200` when the processor succeeds;
//! - `400` when the body cannot be read (or exceeds the limit) or the `Json`
//!   adapter cannot decode it;
//! - `500` with the processor's error text for anything the processor returns,
//!   including its own decode failures.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DEFAULT_HTTP_BODY_LIMIT;
use crate::errors::{ProcessError, ReceiverError};
use crate::processor::Processor;

#[derive(Clone)]
pub struct HttpState {
    processor: Arc<dyn Processor>,
    body_limit: usize,
}

pub fn router(processor: Arc<dyn Processor>) -> Router {
    router_with_limit(processor, DEFAULT_HTTP_BODY_LIMIT)
}

pub fn router_with_limit(processor: Arc<dyn Processor>, body_limit: usize) -> Router {
    let state = HttpState {
        processor,
        body_limit,
    };
    Router::new()
        .route("/", any(receive_event))
        .fallback(receive_event)
        .with_state(state)
}

async fn receive_event(State(state): State<HttpState>, request: Request<Body>) -> Response {
    let payload = match body::to_bytes(request.into_body(), state.body_limit).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "request body unreadable");
            return (StatusCode::BAD_REQUEST, "request body unreadable").into_response();
        }
    };

    match state.processor.process(payload).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(ProcessError::InvalidJson(e)) => {
            warn!(error = %e, "event payload rejected");
            (StatusCode::BAD_REQUEST, "JSON decoding failed").into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Serve `router` on `addr` until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), ReceiverError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ReceiverError::Http(format!("bind {addr}: {e}")))?;
    info!(%addr, "http receiver listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ReceiverError::Http(e.to_string()))
}
