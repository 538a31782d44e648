use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Mutex,
};

use anyhow::{Context, anyhow};
use chrono::DateTime;
use ferry_client::{
  entities::{
    session::{
      DailySummary, FileInfo, MigrationSession, PersistedTask,
      PersistedTaskState, SessionState, Statistics,
    },
    task::Task,
    user::AuthContext,
  },
  error::ErrorType,
  unix_timestamp_ms,
};
use indexmap::IndexMap;

mod rotate;

/// Durable store of migration sessions under
/// `<data_dir>/migrations/`:
///
/// ```text
/// migrations/
///   sessions/<uuid>.json                 live + finalized sessions
///   migration_YYYY-MM-DD.json            daily summary
///   archive/migration_YYYY-Www.tar.gz    rotated weekly
///   .migrations.lock                     cross-process advisory lock
/// ```
pub struct MigrationLog {
  root: PathBuf,
  sessions_dir: PathBuf,
  archive_dir: PathBuf,
  lock_path: PathBuf,
  daily_retention_days: u64,
  archive_retention_days: u64,
  live: Mutex<HashMap<String, MigrationSession>>,
}

impl MigrationLog {
  pub fn new(
    root: PathBuf,
    daily_retention_days: u64,
    archive_retention_days: u64,
  ) -> anyhow::Result<MigrationLog> {
    let sessions_dir = root.join("sessions");
    let archive_dir = root.join("archive");
    std::fs::create_dir_all(&sessions_dir).with_context(|| {
      format!("failed to create sessions dir at {sessions_dir:?}")
    })?;
    std::fs::create_dir_all(&archive_dir).with_context(|| {
      format!("failed to create archive dir at {archive_dir:?}")
    })?;
    Ok(MigrationLog {
      lock_path: root.join(".migrations.lock"),
      sessions_dir,
      archive_dir,
      daily_retention_days,
      archive_retention_days,
      root,
      live: Default::default(),
    })
  }

  fn session_path(&self, session_id: &str) -> PathBuf {
    self.sessions_dir.join(format!("{session_id}.json"))
  }

  fn daily_path(&self, date: &str) -> PathBuf {
    self.root.join(format!("migration_{date}.json"))
  }

  /// Allocate the durable record for a starting batch and persist
  /// it immediately.
  pub async fn start_session(
    &self,
    session_id: &str,
    user: &AuthContext,
    tasks: &[Task],
    request_json: Option<String>,
  ) -> anyhow::Result<()> {
    let persisted = tasks
      .iter()
      .enumerate()
      .map(|(index, task)| PersistedTask::init(index, task))
      .collect();
    let mut session =
      MigrationSession::new(session_id.to_string(), user, persisted);
    if let Some(request_json) =
      request_json.filter(|json| !json.is_empty())
    {
      session
        .metadata
        .insert("request_json".into(), request_json.into());
    }
    let snapshot = session.clone();
    self
      .live
      .lock()
      .unwrap()
      .insert(session_id.to_string(), session);
    self.persist_session(&snapshot).await
  }

  /// Run `mutate` on the live session and persist the result.
  async fn update_session(
    &self,
    session_id: &str,
    mutate: impl FnOnce(&mut MigrationSession),
  ) -> anyhow::Result<()> {
    let snapshot = {
      let mut live = self.live.lock().unwrap();
      let session = live.get_mut(session_id).ok_or_else(|| {
        anyhow!("no live migration session {session_id}")
      })?;
      mutate(session);
      session.clone()
    };
    self.persist_session(&snapshot).await
  }

  /// Generic task mutator. The specific transitions below all go
  /// through this.
  pub async fn update_task(
    &self,
    session_id: &str,
    index: usize,
    mutate: impl FnOnce(&mut PersistedTask),
  ) -> anyhow::Result<()> {
    self
      .update_session(session_id, |session| {
        if let Some(task) = session.tasks.get_mut(index) {
          mutate(task);
        }
      })
      .await
  }

  pub async fn start_task(
    &self,
    session_id: &str,
    index: usize,
  ) -> anyhow::Result<()> {
    self
      .update_task(session_id, index, |task| {
        task.status = PersistedTaskState::Running;
        task.started_at = unix_timestamp_ms();
      })
      .await
  }

  pub async fn set_task_file_info(
    &self,
    session_id: &str,
    index: usize,
    file_info: FileInfo,
  ) -> anyhow::Result<()> {
    self
      .update_task(session_id, index, |task| {
        task.file_info = Some(file_info);
      })
      .await
  }

  pub async fn complete_task(
    &self,
    session_id: &str,
    index: usize,
    data_size_bytes: u64,
    triple_count: Option<i64>,
  ) -> anyhow::Result<()> {
    self
      .update_session(session_id, |session| {
        if let Some(task) = session.tasks.get_mut(index) {
          task.finish(PersistedTaskState::Success);
          task.data_size_bytes = data_size_bytes;
          task.triple_count = triple_count;
        }
        session.completed_tasks += 1;
        session.total_data_size_bytes += data_size_bytes;
      })
      .await
  }

  pub async fn fail_task(
    &self,
    session_id: &str,
    index: usize,
    error_type: ErrorType,
    error_message: impl Into<String>,
  ) -> anyhow::Result<()> {
    let error_message = error_message.into();
    self
      .update_session(session_id, |session| {
        if let Some(task) = session.tasks.get_mut(index) {
          task.finish(PersistedTaskState::Error);
          task.error_type = Some(error_type.to_string());
          task.error_message = Some(error_message);
        }
        session.failed_tasks += 1;
      })
      .await
  }

  pub async fn timeout_task(
    &self,
    session_id: &str,
    index: usize,
    timeout_secs: u64,
  ) -> anyhow::Result<()> {
    self
      .update_session(session_id, |session| {
        if let Some(task) = session.tasks.get_mut(index) {
          task.finish(PersistedTaskState::Timeout);
          task.error_type = Some(ErrorType::Timeout.to_string());
          task.error_message = Some(format!(
            "task did not finish within {timeout_secs}s"
          ));
        }
        session.timeout_tasks += 1;
      })
      .await
  }

  pub async fn complete_session(
    &self,
    session_id: &str,
  ) -> anyhow::Result<()> {
    self
      .finalize_session(session_id, SessionState::Completed, None)
      .await
  }

  pub async fn fail_session(
    &self,
    session_id: &str,
    error_msg: impl Into<String>,
  ) -> anyhow::Result<()> {
    self
      .finalize_session(
        session_id,
        SessionState::Failed,
        Some(error_msg.into()),
      )
      .await
  }

  /// Stamp the session terminal, persist it, fold it into the
  /// daily summary under the cross-process lock, then evict it
  /// from memory.
  async fn finalize_session(
    &self,
    session_id: &str,
    status: SessionState,
    error_msg: Option<String>,
  ) -> anyhow::Result<()> {
    let snapshot = {
      let mut live = self.live.lock().unwrap();
      let session = live.get_mut(session_id).ok_or_else(|| {
        anyhow!("no live migration session {session_id}")
      })?;
      session.finalize(status, error_msg);
      session.clone()
    };
    self.persist_session(&snapshot).await?;

    let date = date_of_ms(snapshot.ended_at.unwrap_or_else(
      unix_timestamp_ms,
    ));
    let daily_path = self.daily_path(&date);
    let lock_path = self.lock_path.clone();
    let day_session = snapshot.clone();
    tokio::task::spawn_blocking(move || {
      with_file_lock(&lock_path, || {
        let mut summary = load_daily_blocking(&daily_path, &date)?;
        summary.append(day_session);
        write_json_atomic_blocking(&daily_path, &summary)
      })
    })
    .await
    .context("daily summary task panicked")??;

    self.live.lock().unwrap().remove(session_id);
    Ok(())
  }

  async fn persist_session(
    &self,
    session: &MigrationSession,
  ) -> anyhow::Result<()> {
    write_json_atomic(&self.session_path(&session.id), session).await
  }

  /// Live session if present, else the persisted file.
  pub async fn get_session(
    &self,
    session_id: &str,
  ) -> anyhow::Result<Option<MigrationSession>> {
    if let Some(session) =
      self.live.lock().unwrap().get(session_id).cloned()
    {
      return Ok(Some(session));
    }
    let path = self.session_path(session_id);
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).with_context(
        || format!("corrupt session file at {path:?}"),
      )?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e).context(format!(
        "failed to read session file at {path:?}"
      )),
    }
  }

  /// The summary for `date`; a missing file is an empty summary.
  pub async fn get_daily_summary(
    &self,
    date: &str,
  ) -> anyhow::Result<DailySummary> {
    let path = self.daily_path(date);
    match tokio::fs::read(&path).await {
      Ok(bytes) => serde_json::from_slice(&bytes)
        .with_context(|| format!("corrupt daily summary at {path:?}")),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Ok(DailySummary::empty(date))
      }
      Err(e) => Err(e).context(format!(
        "failed to read daily summary at {path:?}"
      )),
    }
  }

  /// Union of the daily summaries in the inclusive date range with
  /// derived rates and per-action / per-error / per-user counters.
  pub async fn get_statistics(
    &self,
    from: &str,
    to: &str,
  ) -> anyhow::Result<Statistics> {
    let from_date = parse_date(from)?;
    let to_date = parse_date(to)?;
    if from_date > to_date {
      return Err(anyhow!("invalid range: {from} is after {to}"));
    }

    let mut stats = Statistics {
      from: from.to_string(),
      to: to.to_string(),
      total_sessions: 0,
      completed_sessions: 0,
      failed_sessions: 0,
      running_sessions: 0,
      total_tasks: 0,
      completed_tasks: 0,
      failed_tasks: 0,
      timeout_tasks: 0,
      total_data_size_bytes: 0,
      avg_duration_ms: 0.0,
      success_rate: 0.0,
      per_action: IndexMap::new(),
      per_error: IndexMap::new(),
      per_user: IndexMap::new(),
    };

    let mut duration_total: i64 = 0;
    let mut date = from_date;
    while date <= to_date {
      let summary = self
        .get_daily_summary(&date.format("%Y-%m-%d").to_string())
        .await?;
      stats.total_sessions += summary.total_sessions;
      stats.completed_sessions += summary.completed_sessions;
      stats.failed_sessions += summary.failed_sessions;
      stats.running_sessions += summary.running_sessions;
      stats.total_tasks += summary.total_tasks;
      stats.completed_tasks += summary.completed_tasks;
      stats.failed_tasks += summary.failed_tasks;
      stats.timeout_tasks += summary.timeout_tasks;
      stats.total_data_size_bytes += summary.total_data_size_bytes;
      for session in &summary.sessions {
        duration_total += session.duration_ms;
        *stats
          .per_user
          .entry(session.username.clone())
          .or_default() += 1;
        for task in &session.tasks {
          *stats
            .per_action
            .entry(task.action.to_string())
            .or_default() += 1;
          if let Some(error_type) = &task.error_type {
            *stats
              .per_error
              .entry(error_type.clone())
              .or_default() += 1;
          }
        }
      }
      date = date
        .succ_opt()
        .context("date range overflowed the calendar")?;
    }

    if stats.total_sessions > 0 {
      stats.avg_duration_ms =
        duration_total as f64 / stats.total_sessions as f64;
      stats.success_rate = stats.completed_sessions as f64
        / stats.total_sessions as f64;
    }
    Ok(stats)
  }

  /// Currently running sessions, most recently started first.
  pub fn get_active_sessions(&self) -> Vec<MigrationSession> {
    let mut sessions: Vec<MigrationSession> = self
      .live
      .lock()
      .unwrap()
      .values()
      .filter(|session| session.status == SessionState::Running)
      .cloned()
      .collect();
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    sessions
  }
}

fn parse_date(date: &str) -> anyhow::Result<chrono::NaiveDate> {
  chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
    .with_context(|| format!("invalid date '{date}'"))
}

fn date_of_ms(ms: i64) -> String {
  DateTime::from_timestamp_millis(ms)
    .map(|dt| dt.format("%Y-%m-%d").to_string())
    .unwrap_or_else(|| ferry_client::utc_date_string())
}

/// write `<file>.tmp`, then rename. The temp is removed when the
/// rename fails.
async fn write_json_atomic<T: serde::Serialize>(
  path: &Path,
  value: &T,
) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value)
    .context("failed to serialize json document")?;
  let tmp = tmp_path(path);
  tokio::fs::write(&tmp, json)
    .await
    .with_context(|| format!("failed to write {tmp:?}"))?;
  if let Err(e) = tokio::fs::rename(&tmp, path).await {
    let _ = tokio::fs::remove_file(&tmp).await;
    return Err(e)
      .context(format!("failed to move {tmp:?} into place"));
  }
  Ok(())
}

fn write_json_atomic_blocking<T: serde::Serialize>(
  path: &Path,
  value: &T,
) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value)
    .context("failed to serialize json document")?;
  let tmp = tmp_path(path);
  std::fs::write(&tmp, json)
    .with_context(|| format!("failed to write {tmp:?}"))?;
  if let Err(e) = std::fs::rename(&tmp, path) {
    let _ = std::fs::remove_file(&tmp);
    return Err(e)
      .context(format!("failed to move {tmp:?} into place"));
  }
  Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
  let mut name = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();
  name.push_str(".tmp");
  path.with_file_name(name)
}

fn load_daily_blocking(
  path: &Path,
  date: &str,
) -> anyhow::Result<DailySummary> {
  match std::fs::read(path) {
    Ok(bytes) => serde_json::from_slice(&bytes)
      .with_context(|| format!("corrupt daily summary at {path:?}")),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      Ok(DailySummary::empty(date))
    }
    Err(e) => {
      Err(e).context(format!("failed to read {path:?}"))
    }
  }
}

/// Two concurrent finalizations (possibly from different processes)
/// must not clobber the daily summary.
fn with_file_lock<T>(
  lock_path: &Path,
  f: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
  use fs4::FileExt;
  let file = std::fs::OpenOptions::new()
    .create(true)
    .write(true)
    .open(lock_path)
    .with_context(|| {
      format!("failed to open lock file at {lock_path:?}")
    })?;
  file
    .lock_exclusive()
    .context("failed to acquire migrations lock")?;
  let res = f();
  if let Err(e) = file.unlock() {
    warn!("failed to release migrations lock | {e:?}");
  }
  res
}

#[cfg(test)]
mod tests {
  use super::*;

  fn user() -> AuthContext {
    AuthContext {
      user_id: "u-1".into(),
      username: "admin".into(),
      client_ip: "127.0.0.1".into(),
      client_user_agent: "test".into(),
      role: String::new(),
    }
  }

  fn tasks(n: usize) -> Vec<Task> {
    (0..n)
      .map(|i| {
        serde_json::from_value(serde_json::json!({
          "action": "repo-delete",
          "tgt": { "url": "http://t:7200", "repo": format!("r{i}") },
        }))
        .unwrap()
      })
      .collect()
  }

  fn log(dir: &Path) -> MigrationLog {
    MigrationLog::new(dir.join("migrations"), 7, 28).unwrap()
  }

  #[tokio::test]
  async fn session_lifecycle_persists_and_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let log = log(dir.path());
    let tasks = tasks(2);
    log
      .start_session("s-1", &user(), &tasks, Some("{}".into()))
      .await
      .unwrap();

    assert_eq!(log.get_active_sessions().len(), 1);

    log.start_task("s-1", 0).await.unwrap();
    log.complete_task("s-1", 0, 240, None).await.unwrap();
    log.start_task("s-1", 1).await.unwrap();
    log.complete_task("s-1", 1, 10, None).await.unwrap();
    log.complete_session("s-1").await.unwrap();

    // Evicted from memory, still loadable from disk.
    assert!(log.get_active_sessions().is_empty());
    let session = log.get_session("s-1").await.unwrap().unwrap();
    assert_eq!(session.status, SessionState::Completed);
    assert_eq!(session.completed_tasks, 2);
    assert_eq!(session.failed_tasks, 0);
    assert_eq!(session.timeout_tasks, 0);
    assert_eq!(session.total_data_size_bytes, 250);
    assert!(session.ended_at.is_some());
    assert_eq!(
      session.metadata.get("request_json").unwrap(),
      "{}"
    );

    // The day summary has exactly this session.
    let date = date_of_ms(session.ended_at.unwrap());
    let summary = log.get_daily_summary(&date).await.unwrap();
    assert_eq!(summary.total_sessions, 1);
    assert_eq!(summary.completed_sessions, 1);
    assert_eq!(summary.total_data_size_bytes, 250);
    assert_eq!(
      summary.completed_sessions
        + summary.failed_sessions
        + summary.running_sessions,
      summary.total_sessions
    );
  }

  #[tokio::test]
  async fn failed_tasks_fail_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let log = log(dir.path());
    let tasks = tasks(2);
    log.start_session("s-2", &user(), &tasks, None).await.unwrap();
    log.start_task("s-2", 0).await.unwrap();
    log
      .fail_task("s-2", 0, ErrorType::ExecutionError, "boom")
      .await
      .unwrap();
    log.start_task("s-2", 1).await.unwrap();
    log.timeout_task("s-2", 1, 600).await.unwrap();
    log.fail_session("s-2", "2 of 2 tasks failed").await.unwrap();

    let session = log.get_session("s-2").await.unwrap().unwrap();
    assert_eq!(session.status, SessionState::Failed);
    assert_eq!(session.failed_tasks, 1);
    assert_eq!(session.timeout_tasks, 1);
    assert_eq!(
      session.completed_tasks
        + session.failed_tasks
        + session.timeout_tasks,
      session.total_tasks
    );
    let task = &session.tasks[0];
    assert_eq!(task.error_type.as_deref(), Some("execution_error"));
    assert!(task.ended_at.unwrap() >= task.started_at);
    assert_eq!(
      session.tasks[1].error_type.as_deref(),
      Some("timeout")
    );
  }

  #[tokio::test]
  async fn unknown_sessions_load_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let log = log(dir.path());
    assert!(log.get_session("missing").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn missing_daily_summary_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let log = log(dir.path());
    let summary = log.get_daily_summary("2026-01-01").await.unwrap();
    assert_eq!(summary.date, "2026-01-01");
    assert_eq!(summary.total_sessions, 0);
  }

  #[tokio::test]
  async fn statistics_union_over_range() {
    let dir = tempfile::tempdir().unwrap();
    let log = log(dir.path());

    log.start_session("s-3", &user(), &tasks(1), None).await.unwrap();
    log.start_task("s-3", 0).await.unwrap();
    log.complete_task("s-3", 0, 100, None).await.unwrap();
    log.complete_session("s-3").await.unwrap();

    log.start_session("s-4", &user(), &tasks(1), None).await.unwrap();
    log.start_task("s-4", 0).await.unwrap();
    log
      .fail_task("s-4", 0, ErrorType::ExecutionError, "boom")
      .await
      .unwrap();
    log.fail_session("s-4", "1 of 1 tasks failed").await.unwrap();

    let today = ferry_client::utc_date_string();
    let stats = log.get_statistics(&today, &today).await.unwrap();
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.completed_sessions, 1);
    assert_eq!(stats.failed_sessions, 1);
    assert_eq!(stats.success_rate, 0.5);
    assert_eq!(stats.per_action.get("repo-delete"), Some(&2));
    assert_eq!(stats.per_error.get("execution_error"), Some(&1));
    assert_eq!(stats.per_user.get("admin"), Some(&2));
  }

  #[tokio::test]
  async fn atomic_write_leaves_no_tmp_behind() {
    let dir = tempfile::tempdir().unwrap();
    let log = log(dir.path());
    log.start_session("s-5", &user(), &tasks(1), None).await.unwrap();
    let leftovers: Vec<_> = std::fs::read_dir(
      dir.path().join("migrations/sessions"),
    )
    .unwrap()
    .map(|entry| entry.unwrap().file_name().into_string().unwrap())
    .filter(|name| name.ends_with(".tmp"))
    .collect();
    assert!(leftovers.is_empty());
  }
}
