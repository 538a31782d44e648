#[macro_use]
extern crate tracing;

use std::{net::SocketAddr, str::FromStr};

use anyhow::Context;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::config::core_config;

mod api;
mod auth;
mod config;
mod dispatch;
mod executor;
mod helpers;
mod migration_log;
mod render;
mod session;
mod state;
mod validate;

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = core_config();
  logger::init(&config.logging)?;

  info!("Ferry Core version: v{}", env!("CARGO_PKG_VERSION"));
  info!("{config:?}");

  // Init state handles up front to crash on bad data dirs.
  state::migration_log();
  state::work_dir();

  let app = Router::new()
    .nest("/execute", api::execute::router())
    .nest("/semantic", api::semantic::router())
    .nest("/stream", api::stream::router())
    .nest("/read", api::read::router())
    .nest("/admin", api::admin::router())
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .into_make_service();

  let addr =
    format!("{}:{}", core_config().bind_ip, core_config().port);
  let socket_addr = SocketAddr::from_str(&addr)
    .context("failed to parse listen address")?;

  info!("Ferry Core starting on http://{socket_addr}");
  axum_server::bind(socket_addr)
    .serve(app)
    .await
    .context("failed to start http server")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let mut term_signal = tokio::signal::unix::signal(
    tokio::signal::unix::SignalKind::terminate(),
  )?;
  tokio::select! {
    res = tokio::spawn(app()) => res?,
    _ = term_signal.recv() => Ok(()),
  }
}
