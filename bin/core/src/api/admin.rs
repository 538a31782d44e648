use anyhow::Context;
use axum::{
  Json, Router, middleware,
  routing::{get, post},
};
use serde_json::json;

use crate::{auth::auth_request, state};

pub fn router() -> Router {
  Router::new()
    .route("/rotate", post(rotate))
    .route("/version", get(version))
    .layer(middleware::from_fn(auth_request))
}

/// Explicit trigger for migration-log rotation; there is no rotation
/// timer in the core.
async fn rotate() -> serror::Result<Json<serde_json::Value>> {
  tokio::task::spawn_blocking(|| {
    state::migration_log().rotate_old_logs()
  })
  .await
  .context("rotation task panicked")??;
  Ok(Json(json!({ "status": "rotated" })))
}

async fn version() -> Json<serde_json::Value> {
  Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}
