use anyhow::Context;
use axum::{
  Extension, Router,
  extract::{FromRequest, Multipart, Request},
  http::StatusCode,
  middleware,
  response::{IntoResponse, Response},
  routing::post,
};
use ferry_client::entities::{
  semantic::{
    COMPLETED_STATUS, FAILED_STATUS, SemanticAction,
  },
  status::TaskState,
  user::AuthContext,
};
use serror::AddStatusCode;

use crate::{
  auth::auth_request,
  config::{session_retention, task_timeout},
  dispatch::result_u64,
  executor::TaskOutcome,
  helpers::{UploadedFile, UploadedFiles},
  state, validate,
};

pub fn router() -> Router {
  Router::new()
    .route("/action", post(handler))
    .layer(middleware::from_fn(auth_request))
}

/// Executes one semantic action (or ItemList workflow) and echoes
/// it back with `actionStatus` and `result` populated. Unlike the
/// legacy endpoint this one blocks until the batch finishes.
async fn handler(
  Extension(user): Extension<AuthContext>,
  request: Request,
) -> serror::Result<Response> {
  let (action, files) = parse_body(request)
    .await
    .status_code(StatusCode::BAD_REQUEST)?;
  let request_json = serde_json::to_string(&action)
    .context("failed to serialize semantic action")?;

  let task = action
    .clone()
    .into_task()
    .map_err(anyhow::Error::from)
    .status_code(StatusCode::BAD_REQUEST)?;
  // Validation short-circuits before any session exists.
  validate::validate_task(&task)
    .map_err(anyhow::Error::from)
    .status_code(StatusCode::BAD_REQUEST)?;

  let tasks = vec![task];
  let session = state::session_manager().create(user.clone(), &tasks);
  state::migration_log()
    .start_session(&session.id, &user, &tasks, Some(request_json))
    .await
    .context("failed to persist migration session")?;

  let outcomes = crate::executor::execute_batch(
    state::session_manager(),
    state::migration_log(),
    state::graph_store().as_ref(),
    state::dispatcher(),
    &session.id,
    &tasks,
    &files,
    state::work_dir(),
    task_timeout(),
  )
  .await;
  state::session_manager()
    .spawn_gc(session.id.clone(), session_retention());

  let outcome = outcomes.into_iter().next().ok_or_else(|| {
    anyhow::anyhow!("executor returned no outcome")
  })?;
  Ok(echo_response(action, outcome))
}

fn echo_response(
  mut action: SemanticAction,
  outcome: TaskOutcome,
) -> Response {
  let status = match outcome.state {
    TaskState::Success => outcome
      .result
      .as_ref()
      .and_then(|result| result_u64(result, "statusCode"))
      .and_then(|code| StatusCode::from_u16(code as u16).ok())
      .unwrap_or(StatusCode::OK),
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  };
  let result = outcome
    .result
    .map(serde_json::Value::Object);
  if outcome.state == TaskState::Success {
    action.set_outcome(COMPLETED_STATUS, result, None);
  } else {
    action.set_outcome(FAILED_STATUS, result, Some(outcome.message));
  }
  (status, axum::Json(action)).into_response()
}

/// Semantic bodies arrive as raw JSON-LD or as multipart with the
/// action under `action` and files under conventional names
/// (`config`, `data`).
async fn parse_body(
  request: Request,
) -> anyhow::Result<(SemanticAction, UploadedFiles)> {
  let content_type = request
    .headers()
    .get("content-type")
    .and_then(|value| value.to_str().ok())
    .unwrap_or_default()
    .to_string();

  if content_type.starts_with("multipart/form-data") {
    let mut multipart = Multipart::from_request(request, &())
      .await
      .context("invalid multipart body")?;
    let mut action_json = String::new();
    let mut files = UploadedFiles::default();
    while let Some(field) = multipart
      .next_field()
      .await
      .context("failed to read multipart field")?
    {
      let name = field.name().unwrap_or_default().to_string();
      if name == "action" {
        action_json = field
          .text()
          .await
          .context("failed to read action field")?;
        continue;
      }
      let file_name = field
        .file_name()
        .map(String::from)
        .unwrap_or_else(|| name.clone());
      let file_content_type = field
        .content_type()
        .map(String::from)
        .unwrap_or_else(|| "application/octet-stream".into());
      let bytes = field
        .bytes()
        .await
        .with_context(|| format!("failed to read upload '{name}'"))?;
      let file = UploadedFile::stage(
        state::work_dir(),
        &file_name,
        &file_content_type,
        &bytes,
      )
      .await?;
      // Conventional names map onto the task-scoped upload keys of
      // the single dispatched task.
      let key = match name.as_str() {
        "config" => UploadedFiles::config_key(0),
        "data" => UploadedFiles::files_key(0),
        _ => name.clone(),
      };
      files.insert(&key, file);
    }
    let action = serde_json::from_str(&action_json)
      .context("invalid semantic action json")?;
    Ok((action, files))
  } else {
    let bytes =
      axum::body::to_bytes(request.into_body(), 64 * 1024 * 1024)
        .await
        .context("failed to read request body")?;
    let action = serde_json::from_slice(&bytes)
      .context("invalid semantic action json")?;
    Ok((action, UploadedFiles::default()))
  }
}
