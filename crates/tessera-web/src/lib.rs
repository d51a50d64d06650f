//! Tessera Web
//!
//! Admin HTTP API over a [`Runner`]: create and delete jobs, start runs,
//! inspect runs and their results, and register bridges.

mod error;
mod extract;
mod handlers;

use axum::Router;
use axum::routing::{get, post};
use tessera_runner::Runner;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use error::ApiError;
pub use extract::Id;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
  pub runner: Runner,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/v2/jobs", post(handlers::create_job).get(handlers::list_jobs))
    .route(
      "/v2/jobs/{id}",
      get(handlers::get_job).delete(handlers::delete_job),
    )
    .route("/v2/jobs/{id}/runs", post(handlers::create_run))
    .route("/v2/jobs/{id}/errors", get(handlers::list_job_errors))
    .route("/v2/runs/{id}", get(handlers::get_run))
    .route("/v2/runs/{id}/results", get(handlers::get_run_results))
    .route(
      "/v2/bridges",
      post(handlers::create_bridge).get(handlers::list_bridges),
    )
    .with_state(state)
}

/// Serve the API until `cancel` fires.
pub async fn serve(
  listener: TcpListener,
  state: AppState,
  cancel: CancellationToken,
) -> std::io::Result<()> {
  if let Ok(addr) = listener.local_addr() {
    info!(addr = %addr, "api_listening");
  }
  axum::serve(listener, router(state))
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
}
