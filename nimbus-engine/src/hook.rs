//! Inbound webhook callback endpoint
//!
//! The cloud POSTs a completion notice here when a run finishes, as the
//! passive alternative to polling. Delivery is matched to a watch by
//! (project id, run id); notices for unknown or already-settled watches
//! are acknowledged and dropped, so duplicate and late deliveries are
//! harmless.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use nimbus_core::dto::notice::CompletionNotice;

use crate::config::HOOK_PATH;
use crate::scheduler::WatchRegistry;

/// Build the callback router over the runner's watch registry.
pub fn router(registry: Arc<WatchRegistry>) -> Router {
    Router::new()
        .route(HOOK_PATH, post(receive_notice))
        .with_state(registry)
        .layer(TraceLayer::new_for_http())
}

/// POST /api/cloud-webhook
///
/// Always answers 204: a late or duplicate notice for a watch that is
/// gone must look like success to the sender, or the cloud keeps
/// retrying it.
async fn receive_notice(
    State(registry): State<Arc<WatchRegistry>>,
    Json(notice): Json<CompletionNotice>,
) -> StatusCode {
    let handle = notice.handle();
    if registry.complete(handle).await {
        info!("completion notice delivered for run {}", handle);
    } else {
        debug!("ignoring notice for unknown or settled run {}", handle);
    }
    StatusCode::NO_CONTENT
}

/// Serve the callback endpoint until the task is dropped.
pub async fn serve(
    listener: tokio::net::TcpListener,
    registry: Arc<WatchRegistry>,
) -> anyhow::Result<()> {
    axum::serve(listener, router(registry)).await?;
    Ok(())
}
