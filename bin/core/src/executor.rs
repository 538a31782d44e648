use std::{path::Path, time::Duration};

use ferry_client::{
  entities::{
    status::{TaskState, TaskStatus},
    task::Task,
  },
  error::ErrorType,
  unix_timestamp_ms,
};
use store_client::GraphStore;

use crate::{
  dispatch::{
    Dispatcher, HandlerContext, TaskResult, result_i64,
    result_message, result_u64,
  },
  helpers::UploadedFiles,
  migration_log::MigrationLog,
  session::SessionManager,
  validate,
};

/// Terminal outcome of one task, fed back to the request layer
/// (the semantic endpoint echoes it).
pub struct TaskOutcome {
  pub index: usize,
  pub state: TaskState,
  pub message: String,
  pub result: Option<TaskResult>,
}

/// Runs a session's tasks in declared order. Each task gets the
/// per-task deadline; a breached deadline cancels the handler by
/// dropping its future, which also aborts in-flight adapter I/O.
/// The batch keeps going after individual failures.
#[allow(clippy::too_many_arguments)]
pub async fn execute_batch(
  manager: &SessionManager,
  log: &MigrationLog,
  store: &dyn GraphStore,
  dispatcher: &Dispatcher,
  session_id: &str,
  tasks: &[Task],
  files: &UploadedFiles,
  work_dir: &Path,
  task_timeout: Duration,
) -> Vec<TaskOutcome> {
  let mut outcomes = Vec::with_capacity(tasks.len());

  for (index, task) in tasks.iter().enumerate() {
    let outcome = execute_task(
      manager,
      log,
      store,
      dispatcher,
      session_id,
      task,
      index,
      files,
      work_dir,
      task_timeout,
    )
    .await;
    outcomes.push(outcome);
  }

  manager.mark_ended(session_id);

  let failed = outcomes
    .iter()
    .filter(|outcome| outcome.state != TaskState::Success)
    .count();
  let res = if failed == 0 {
    log.complete_session(session_id).await
  } else {
    log
      .fail_session(
        session_id,
        format!("{failed} of {} tasks failed", tasks.len()),
      )
      .await
  };
  if let Err(e) = res {
    error!("failed to finalize migration session {session_id} | {e:#}");
  }

  outcomes
}

#[allow(clippy::too_many_arguments)]
async fn execute_task(
  manager: &SessionManager,
  log: &MigrationLog,
  store: &dyn GraphStore,
  dispatcher: &Dispatcher,
  session_id: &str,
  task: &Task,
  index: usize,
  files: &UploadedFiles,
  work_dir: &Path,
  task_timeout: Duration,
) -> TaskOutcome {
  let mut status = TaskStatus::init(index, task);
  status.status = TaskState::InProgress;
  status.message = "running".into();
  status.started_at = Some(unix_timestamp_ms());
  manager.publish(session_id, status.clone());
  if let Err(e) = log.start_task(session_id, index).await {
    warn!("failed to persist task start | {e:#}");
  }
  attach_file_info(log, session_id, index, files).await;

  // Per-task field presence rules. A failing task records a
  // validation error and the batch continues.
  if let Err(e) = validate::validate_task(task) {
    let message = e.to_string();
    if let Err(e) = log
      .fail_task(session_id, index, ErrorType::ValidationError, &message)
      .await
    {
      warn!("failed to persist validation failure | {e:#}");
    }
    return finish(
      manager,
      session_id,
      status,
      TaskState::Error,
      message,
      None,
    );
  }

  let ctx = HandlerContext {
    store,
    files,
    index,
    work_dir,
    dispatcher,
  };
  match tokio::time::timeout(
    task_timeout,
    dispatcher.dispatch(task, &ctx),
  )
  .await
  {
    // Deadline breached. Dropping the dispatch future cancelled
    // the handler and its adapter calls.
    Err(_) => {
      let secs = task_timeout.as_secs();
      let message = format!("task did not finish within {secs}s");
      warn!(
        "task {index} ({}) timed out on session {session_id}",
        task.action
      );
      if let Err(e) = log.timeout_task(session_id, index, secs).await
      {
        warn!("failed to persist task timeout | {e:#}");
      }
      finish(
        manager,
        session_id,
        status,
        TaskState::Timeout,
        message,
        None,
      )
    }
    Ok(Ok(result)) => {
      let message = result_message(&result)
        .map(String::from)
        .unwrap_or_else(|| format!("{} completed", task.action));
      let data_size =
        result_u64(&result, "dataSizeBytes").unwrap_or(0);
      let triple_count = result_i64(&result, "tripleCount");
      if let Err(e) = log
        .complete_task(session_id, index, data_size, triple_count)
        .await
      {
        warn!("failed to persist task completion | {e:#}");
      }
      finish(
        manager,
        session_id,
        status,
        TaskState::Success,
        message,
        Some(result),
      )
    }
    Ok(Err(e)) => {
      let message = e.to_string();
      warn!(
        "task {index} ({}) failed on session {session_id} | {message}",
        task.action
      );
      if let Err(e) = log
        .fail_task(session_id, index, e.error_type(), &message)
        .await
      {
        warn!("failed to persist task failure | {e:#}");
      }
      finish(
        manager,
        session_id,
        status,
        TaskState::Error,
        message,
        None,
      )
    }
  }
}

/// Uploads addressed to this task index show up on the persisted
/// task record.
async fn attach_file_info(
  log: &MigrationLog,
  session_id: &str,
  index: usize,
  files: &UploadedFiles,
) {
  let upload = files
    .first(&UploadedFiles::config_key(index))
    .or_else(|| files.first(&UploadedFiles::files_key(index)));
  if let Some(upload) = upload
    && let Err(e) = log
      .set_task_file_info(session_id, index, upload.file_info())
      .await
  {
    warn!("failed to persist task file info | {e:#}");
  }
}

fn finish(
  manager: &SessionManager,
  session_id: &str,
  mut status: TaskStatus,
  state: TaskState,
  message: String,
  result: Option<TaskResult>,
) -> TaskOutcome {
  let now = unix_timestamp_ms();
  status.status = state;
  status.message = message.clone();
  status.ended_at = Some(now);
  status.duration_ms =
    status.started_at.map(|started| (now - started).max(0));
  let index = status.index;
  manager.publish(session_id, status);
  TaskOutcome {
    index,
    state,
    message,
    result,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    dispatch::mock::MockStore, migration_log::MigrationLog,
  };
  use ferry_client::entities::{
    session::SessionState, user::AuthContext,
  };

  fn tasks(value: serde_json::Value) -> Vec<Task> {
    let req: ferry_client::entities::task::MigrationRequest =
      serde_json::from_value(value).unwrap();
    req.normalize().unwrap()
  }

  struct Fixture {
    manager: SessionManager,
    log: MigrationLog,
    dispatcher: Dispatcher,
    _dir: tempfile::TempDir,
    work_dir: std::path::PathBuf,
  }

  impl Fixture {
    fn new() -> Fixture {
      let dir = tempfile::tempdir().unwrap();
      let work_dir = dir.path().join("work");
      std::fs::create_dir_all(&work_dir).unwrap();
      Fixture {
        manager: SessionManager::new(10),
        log: MigrationLog::new(dir.path().join("migrations"), 7, 28)
          .unwrap(),
        dispatcher: Dispatcher::default(),
        work_dir,
        _dir: dir,
      }
    }

    async fn run(
      &self,
      store: &MockStore,
      tasks: &[Task],
      timeout: Duration,
    ) -> (String, Vec<TaskOutcome>) {
      let session =
        self.manager.create(AuthContext::default(), tasks);
      self
        .log
        .start_session(&session.id, &session.user, tasks, None)
        .await
        .unwrap();
      let outcomes = execute_batch(
        &self.manager,
        &self.log,
        store,
        &self.dispatcher,
        &session.id,
        tasks,
        &UploadedFiles::default(),
        &self.work_dir,
        timeout,
      )
      .await;
      (session.id.clone(), outcomes)
    }
  }

  #[tokio::test]
  async fn migration_batch_completes_with_data_size() {
    let fixture = Fixture::new();
    let store = MockStore::default()
      .with_repo("http://s:7200", "r1")
      .with_data_size("r1", 240);
    let tasks = tasks(serde_json::json!({
      "version": "v0.0.1",
      "tasks": [{
        "action": "repo-migration",
        "src": { "url": "http://s:7200", "username": "a", "password": "p", "repo": "r1" },
        "tgt": { "url": "http://t:7200", "username": "a", "password": "p", "repo": "r1" },
      }],
    }));

    // A subscriber attached before execution sees the pending
    // snapshot and then both transitions.
    let session =
      fixture.manager.create(AuthContext::default(), &tasks);
    fixture
      .log
      .start_session(&session.id, &session.user, &tasks, None)
      .await
      .unwrap();
    let mut subscriber =
      fixture.manager.subscribe(&session.id).unwrap();

    let outcomes = execute_batch(
      &fixture.manager,
      &fixture.log,
      &store,
      &fixture.dispatcher,
      &session.id,
      &tasks,
      &UploadedFiles::default(),
      &fixture.work_dir,
      Duration::from_secs(600),
    )
    .await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].state, TaskState::Success);

    let states: Vec<TaskState> = [
      subscriber.receiver.recv().await.unwrap(),
      subscriber.receiver.recv().await.unwrap(),
      subscriber.receiver.recv().await.unwrap(),
    ]
    .iter()
    .map(|status| status.status)
    .collect();
    assert_eq!(
      states,
      [TaskState::Pending, TaskState::InProgress, TaskState::Success]
    );

    let persisted =
      fixture.log.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(persisted.status, SessionState::Completed);
    assert_eq!(persisted.completed_tasks, 1);
    assert_eq!(persisted.total_data_size_bytes, 240);
  }

  #[tokio::test]
  async fn invalid_task_fails_but_batch_continues() {
    let fixture = Fixture::new();
    let store = MockStore::default().with_repo("http://t:7200", "r1");
    let tasks = tasks(serde_json::json!({
      "version": "v0.0.1",
      "tasks": [
        { "action": "repo-delete", "tgt": { "url": "http://t:7200" } },
        { "action": "repo-delete", "tgt": { "url": "http://t:7200", "repo": "r1" } },
      ],
    }));

    let (session_id, outcomes) = fixture
      .run(&store, &tasks, Duration::from_secs(600))
      .await;

    assert_eq!(outcomes[0].state, TaskState::Error);
    assert!(outcomes[0].message.starts_with("Validation failed"));
    assert_eq!(outcomes[1].index, 1);
    assert_eq!(outcomes[1].state, TaskState::Success);

    let persisted =
      fixture.log.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(persisted.status, SessionState::Failed);
    assert_eq!(persisted.failed_tasks, 1);
    assert_eq!(persisted.completed_tasks, 1);
    assert_eq!(
      persisted.tasks[0].error_type.as_deref(),
      Some("validation_error")
    );
  }

  #[tokio::test(start_paused = true)]
  async fn deadline_breach_marks_timeout() {
    let fixture = Fixture::new();
    let store = MockStore::default()
      .with_repo("http://t:7200", "r1")
      .stalling("delete_repo", Duration::from_secs(3600));
    let tasks = tasks(serde_json::json!({
      "version": "v0.0.1",
      "tasks": [
        { "action": "repo-delete", "tgt": { "url": "http://t:7200", "repo": "r1" } },
      ],
    }));

    let (session_id, outcomes) = fixture
      .run(&store, &tasks, Duration::from_secs(600))
      .await;

    assert_eq!(outcomes[0].state, TaskState::Timeout);
    assert!(outcomes[0].message.contains("600"));

    let persisted =
      fixture.log.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(persisted.status, SessionState::Failed);
    assert_eq!(persisted.timeout_tasks, 1);
    assert_eq!(
      persisted.tasks[0].error_type.as_deref(),
      Some("timeout")
    );
  }

  #[tokio::test]
  async fn handler_error_without_message_uses_error_display() {
    let fixture = Fixture::new();
    // Listing succeeds but the repo is absent: NotFound carries no
    // result map, so the status message is the error display form.
    let store = MockStore::default();
    let tasks = tasks(serde_json::json!({
      "version": "v0.0.1",
      "tasks": [
        { "action": "repo-delete", "tgt": { "url": "http://t:7200", "repo": "ghost" } },
      ],
    }));

    let (_, outcomes) = fixture
      .run(&store, &tasks, Duration::from_secs(600))
      .await;
    assert_eq!(outcomes[0].state, TaskState::Error);
    assert_eq!(
      outcomes[0].message,
      "repository 'ghost' not found"
    );
  }
}
