use anyhow::Context;
use axum::{
  Extension, Router,
  extract::{FromRequest, Multipart, Request},
  middleware,
  routing::post,
};
use axum_extra::{TypedHeader, headers::ContentType};
use ferry_client::entities::{
  task::MigrationRequest, user::AuthContext,
};

use crate::{
  auth::auth_request,
  config::{session_retention, task_timeout},
  helpers::{UploadedFile, UploadedFiles},
  render, state,
};

pub fn router() -> Router {
  Router::new()
    .route("/", post(handler))
    .layer(middleware::from_fn(auth_request))
}

#[derive(serde::Deserialize)]
struct ExecuteForm {
  task_json: String,
}

/// Accepts the legacy batch as form field `task_json`, or as
/// multipart `request` plus per-task `task_<i>_config` /
/// `task_<i>_files` uploads. Validation failures return a 200 body
/// wrapping an error panel so an HTML swap displays the message.
async fn handler(
  Extension(user): Extension<AuthContext>,
  request: Request,
) -> serror::Result<(TypedHeader<ContentType>, String)> {
  let (request_json, files) = parse_body(request).await?;

  let parsed: MigrationRequest =
    match serde_json::from_str(&request_json) {
      Ok(parsed) => parsed,
      Err(e) => {
        return Ok(html(render::error_panel(&format!(
          "invalid request json: {e}"
        ))));
      }
    };
  let tasks = match parsed.normalize() {
    Ok(tasks) => tasks,
    Err(e) => return Ok(html(render::error_panel(&e.to_string()))),
  };

  let session = state::session_manager().create(user.clone(), &tasks);
  state::migration_log()
    .start_session(&session.id, &user, &tasks, Some(request_json))
    .await
    .context("failed to persist migration session")?;

  let body = render::initial_task_list(&session.id, &session.statuses());

  // Task execution continues after this response returns.
  let session_id = session.id.clone();
  tokio::spawn(async move {
    crate::executor::execute_batch(
      state::session_manager(),
      state::migration_log(),
      state::graph_store().as_ref(),
      state::dispatcher(),
      &session_id,
      &tasks,
      &files,
      state::work_dir(),
      task_timeout(),
    )
    .await;
    state::session_manager()
      .spawn_gc(session_id, session_retention());
  });

  Ok(html(body))
}

fn html(body: String) -> (TypedHeader<ContentType>, String) {
  (TypedHeader(ContentType::html()), body)
}

/// Pulls the request json and staged uploads out of either
/// supported body encoding.
async fn parse_body(
  request: Request,
) -> anyhow::Result<(String, UploadedFiles)> {
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
    let mut request_json = String::new();
    let mut files = UploadedFiles::default();
    while let Some(field) = multipart
      .next_field()
      .await
      .context("failed to read multipart field")?
    {
      let name = field.name().unwrap_or_default().to_string();
      if name == "request" || name == "task_json" {
        request_json = field
          .text()
          .await
          .context("failed to read request field")?;
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
      files.insert(
        &name,
        UploadedFile::stage(
          state::work_dir(),
          &file_name,
          &file_content_type,
          &bytes,
        )
        .await?,
      );
    }
    Ok((request_json, files))
  } else {
    let form = axum::Form::<ExecuteForm>::from_request(request, &())
      .await
      .context("invalid form body, expected field task_json")?;
    Ok((form.0.task_json, UploadedFiles::default()))
  }
}
