use ferry_client::entities::status::TaskStatus;

/// Initial task list panel returned by `POST /execute`. Carries the
/// session id so the client can attach to the stream.
pub fn initial_task_list(
  session_id: &str,
  statuses: &[TaskStatus],
) -> String {
  let mut out = format!(
    "<div id=\"task-list\" data-session-id=\"{session_id}\" \
     data-stream=\"/stream/{session_id}\">\n"
  );
  for status in statuses {
    out.push_str(&task_update(status));
    out.push('\n');
  }
  out.push_str("</div>");
  out
}

/// One task row, also used as the SSE `task-update` event payload.
pub fn task_update(status: &TaskStatus) -> String {
  let route = if status.source.is_empty() {
    escape_html(&status.target)
  } else {
    format!(
      "{} &rarr; {}",
      escape_html(&status.source),
      escape_html(&status.target)
    )
  };
  format!(
    "<div class=\"task task-{state}\" id=\"task-{index}\" data-index=\"{index}\"><span class=\"task-action\">{action}</span><span class=\"task-route\">{route}</span><span class=\"task-state\">{state}</span><span class=\"task-message\">{message}</span></div>",
    state = status.status,
    index = status.index,
    action = status.action,
    message = escape_html(&status.message),
  )
}

/// Validation failures come back as 200 with an error panel so an
/// HTML swap still displays the message.
pub fn error_panel(message: &str) -> String {
  format!(
    "<div class=\"error-panel\"><span class=\"error-message\">{}</span></div>",
    escape_html(message)
  )
}

fn escape_html(value: &str) -> String {
  value
    .replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
    .replace('"', "&quot;")
}
