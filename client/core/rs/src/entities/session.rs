use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
  entities::{
    JsonObject,
    task::{Task, TaskAction},
    user::AuthContext,
  },
  unix_timestamp_ms,
};

/// Durable session state as written to `sessions/<uuid>.json`.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
  #[default]
  Running,
  Completed,
  Failed,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PersistedTaskState {
  #[default]
  Pending,
  Running,
  Success,
  Error,
  Timeout,
}

/// Metadata of one uploaded file attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
  pub name: String,
  pub content_type: String,
  pub size: u64,
  pub md5: String,
}

/// The durable mirror of one task's execution, including
/// adapter-reported metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTask {
  pub index: usize,
  pub action: TaskAction,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub source_url: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub target_url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub repo_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub graph_id: Option<String>,
  pub started_at: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ended_at: Option<i64>,
  pub duration_ms: i64,
  pub status: PersistedTaskState,
  pub data_size_bytes: u64,
  /// Unavailable from the current adapter; omitted when unknown.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub triple_count: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  pub retry_count: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file_info: Option<FileInfo>,
}

impl PersistedTask {
  pub fn init(index: usize, task: &Task) -> PersistedTask {
    let tgt = task.tgt.as_ref();
    let repo = tgt
      .map(|t| {
        if !t.repo.is_empty() {
          t.repo.clone()
        } else {
          t.repo_old.clone()
        }
      })
      .filter(|repo| !repo.is_empty());
    let graph = tgt
      .map(|t| {
        if !t.graph.is_empty() {
          t.graph.clone()
        } else {
          t.graph_old.clone()
        }
      })
      .filter(|graph| !graph.is_empty());
    PersistedTask {
      index,
      action: task.action,
      source_url: task.src_display(),
      target_url: task.tgt_display(),
      repo_id: repo,
      graph_id: graph,
      started_at: 0,
      ended_at: None,
      duration_ms: 0,
      status: PersistedTaskState::Pending,
      data_size_bytes: 0,
      triple_count: None,
      error_type: None,
      error_message: None,
      retry_count: 0,
      file_info: None,
    }
  }

  pub fn finish(&mut self, status: PersistedTaskState) {
    let now = unix_timestamp_ms();
    self.status = status;
    self.ended_at = Some(now);
    self.duration_ms = (now - self.started_at).max(0);
  }
}

/// The durable record of one batch execution. The in-memory copy held
/// by the migration log is the single source of truth while the
/// session runs; everything else sees snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSession {
  pub id: String,
  pub user_id: String,
  pub username: String,
  pub client_ip: String,
  pub client_user_agent: String,
  pub started_at: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ended_at: Option<i64>,
  pub duration_ms: i64,
  pub status: SessionState,
  pub total_tasks: usize,
  pub completed_tasks: usize,
  pub failed_tasks: usize,
  pub timeout_tasks: usize,
  pub total_data_size_bytes: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_msg: Option<String>,
  pub tasks: Vec<PersistedTask>,
  #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
  pub metadata: JsonObject,
}

impl MigrationSession {
  pub fn new(
    id: String,
    user: &AuthContext,
    tasks: Vec<PersistedTask>,
  ) -> MigrationSession {
    MigrationSession {
      id,
      user_id: user.user_id.clone(),
      username: user.username.clone(),
      client_ip: user.client_ip.clone(),
      client_user_agent: user.client_user_agent.clone(),
      started_at: unix_timestamp_ms(),
      ended_at: None,
      duration_ms: 0,
      status: SessionState::Running,
      total_tasks: tasks.len(),
      completed_tasks: 0,
      failed_tasks: 0,
      timeout_tasks: 0,
      total_data_size_bytes: 0,
      error_msg: None,
      tasks,
      metadata: JsonObject::new(),
    }
  }

  pub fn finalize(
    &mut self,
    status: SessionState,
    error_msg: Option<String>,
  ) {
    let now = unix_timestamp_ms();
    self.ended_at = Some(now);
    self.duration_ms = (now - self.started_at).max(0);
    self.status = status;
    self.error_msg = error_msg;
  }
}

/// Aggregate of all sessions finalized on one UTC date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
  pub date: String,
  pub total_sessions: usize,
  pub completed_sessions: usize,
  pub failed_sessions: usize,
  pub running_sessions: usize,
  pub total_tasks: usize,
  pub completed_tasks: usize,
  pub failed_tasks: usize,
  pub timeout_tasks: usize,
  pub total_data_size_bytes: u64,
  pub avg_duration_ms: f64,
  pub sessions: Vec<MigrationSession>,
}

impl DailySummary {
  pub fn empty(date: impl Into<String>) -> DailySummary {
    DailySummary {
      date: date.into(),
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
      sessions: Vec::new(),
    }
  }

  /// Append a finalized session and recompute the aggregate
  /// counters from the embedded sessions.
  pub fn append(&mut self, session: MigrationSession) {
    self.sessions.push(session);
    self.total_sessions = self.sessions.len();
    self.completed_sessions = 0;
    self.failed_sessions = 0;
    self.running_sessions = 0;
    self.total_tasks = 0;
    self.completed_tasks = 0;
    self.failed_tasks = 0;
    self.timeout_tasks = 0;
    self.total_data_size_bytes = 0;
    let mut duration_total: i64 = 0;
    for session in &self.sessions {
      match session.status {
        SessionState::Completed => self.completed_sessions += 1,
        SessionState::Failed => self.failed_sessions += 1,
        SessionState::Running => self.running_sessions += 1,
      }
      self.total_tasks += session.total_tasks;
      self.completed_tasks += session.completed_tasks;
      self.failed_tasks += session.failed_tasks;
      self.timeout_tasks += session.timeout_tasks;
      self.total_data_size_bytes += session.total_data_size_bytes;
      duration_total += session.duration_ms;
    }
    self.avg_duration_ms = if self.sessions.is_empty() {
      0.0
    } else {
      duration_total as f64 / self.sessions.len() as f64
    };
  }
}

/// Derived rates and counters over a date range of daily summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
  pub from: String,
  pub to: String,
  pub total_sessions: usize,
  pub completed_sessions: usize,
  pub failed_sessions: usize,
  pub running_sessions: usize,
  pub total_tasks: usize,
  pub completed_tasks: usize,
  pub failed_tasks: usize,
  pub timeout_tasks: usize,
  pub total_data_size_bytes: u64,
  pub avg_duration_ms: f64,
  /// Fraction of sessions that completed, 0.0 when none ran.
  pub success_rate: f64,
  /// Task counts by action tag.
  pub per_action: IndexMap<String, u64>,
  /// Failed task counts by error type.
  pub per_error: IndexMap<String, u64>,
  /// Session counts by username.
  pub per_user: IndexMap<String, u64>,
}
