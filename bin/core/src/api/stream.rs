use std::convert::Infallible;

use anyhow::anyhow;
use axum::{
  Router,
  extract::Path,
  http::StatusCode,
  middleware,
  response::{
    IntoResponse, Response,
    sse::{Event, KeepAlive, Sse},
  },
  routing::get,
};
use serror::AddStatusCode;

use crate::{auth::auth_request, render, state};

pub fn router() -> Router {
  Router::new()
    .route("/{session_id}", get(handler))
    .layer(middleware::from_fn(auth_request))
}

/// Live task updates for one session. On connect the current
/// vector is replayed, then each broadcast arrives as one
/// `task-update` event. Disconnecting drops the subscription.
async fn handler(
  Path(session_id): Path<String>,
) -> serror::Result<Response> {
  let subscriber = state::session_manager()
    .subscribe(&session_id)
    .ok_or_else(|| anyhow!("no session with id {session_id}"))
    .status_code(StatusCode::NOT_FOUND)?;

  let stream = futures::stream::unfold(
    subscriber,
    |mut subscriber| async move {
      subscriber.receiver.recv().await.map(|status| {
        let event = Event::default()
          .event("task-update")
          .data(render::task_update(&status));
        (Ok::<_, Infallible>(event), subscriber)
      })
    },
  );

  Ok(
    (
      [
        ("cache-control", "no-cache"),
        ("connection", "keep-alive"),
        ("x-accel-buffering", "no"),
      ],
      Sse::new(stream).keep_alive(KeepAlive::default()),
    )
      .into_response(),
  )
}
