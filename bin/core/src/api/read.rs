use anyhow::{Context, anyhow};
use axum::{
  Json, Router,
  extract::{Path, Query},
  http::StatusCode,
  middleware,
  routing::get,
};
use ferry_client::entities::session::{
  DailySummary, MigrationSession, Statistics,
};
use serror::AddStatusCode;

use crate::{auth::auth_request, state};

pub fn router() -> Router {
  Router::new()
    .route("/session/{session_id}", get(get_session))
    .route("/summary/{date}", get(get_summary))
    .route("/statistics", get(get_statistics))
    .route("/sessions/active", get(get_active_sessions))
    .layer(middleware::from_fn(auth_request))
}

async fn get_session(
  Path(session_id): Path<String>,
) -> serror::Result<Json<MigrationSession>> {
  let session = state::migration_log()
    .get_session(&session_id)
    .await?
    .ok_or_else(|| anyhow!("no session with id {session_id}"))
    .status_code(StatusCode::NOT_FOUND)?;
  Ok(Json(session))
}

async fn get_summary(
  Path(date): Path<String>,
) -> serror::Result<Json<DailySummary>> {
  // The date lands in a file name, so it must parse as a date.
  chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d")
    .context("date must be YYYY-MM-DD")
    .status_code(StatusCode::BAD_REQUEST)?;
  let summary =
    state::migration_log().get_daily_summary(&date).await?;
  Ok(Json(summary))
}

#[derive(serde::Deserialize)]
struct StatisticsQuery {
  from: String,
  to: String,
}

async fn get_statistics(
  Query(query): Query<StatisticsQuery>,
) -> serror::Result<Json<Statistics>> {
  let stats = state::migration_log()
    .get_statistics(&query.from, &query.to)
    .await
    .status_code(StatusCode::BAD_REQUEST)?;
  Ok(Json(stats))
}

async fn get_active_sessions() -> Json<Vec<MigrationSession>> {
  Json(state::migration_log().get_active_sessions())
}
