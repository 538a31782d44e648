use serde::{Deserialize, Serialize};
use strum::Display;

use crate::entities::task::{Task, TaskAction};

/// Live task state as observed by stream subscribers. Advances
/// pending → in-progress → terminal; terminal states are final.
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
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskState {
  #[default]
  Pending,
  InProgress,
  Success,
  Error,
  Timeout,
}

impl TaskState {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      TaskState::Success | TaskState::Error | TaskState::Timeout
    )
  }
}

/// One entry of a session's ordered status vector. Mutated only by
/// the executor; broadcast to every subscriber on change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
  pub index: usize,
  pub action: TaskAction,
  pub status: TaskState,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub started_at: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ended_at: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<i64>,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub source: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub target: String,
}

impl TaskStatus {
  /// Initial entry for a freshly created session.
  pub fn init(index: usize, task: &Task) -> TaskStatus {
    TaskStatus {
      index,
      action: task.action,
      status: TaskState::Pending,
      message: "waiting".into(),
      started_at: None,
      ended_at: None,
      duration_ms: None,
      source: task.src_display(),
      target: task.tgt_display(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn states_serialize_kebab_case() {
    assert_eq!(
      serde_json::to_value(TaskState::InProgress).unwrap(),
      serde_json::json!("in-progress")
    );
    assert_eq!(TaskState::Timeout.to_string(), "timeout");
  }

  #[test]
  fn only_terminal_states_are_terminal() {
    assert!(!TaskState::Pending.is_terminal());
    assert!(!TaskState::InProgress.is_terminal());
    assert!(TaskState::Success.is_terminal());
    assert!(TaskState::Error.is_terminal());
    assert!(TaskState::Timeout.is_terminal());
  }

  #[test]
  fn init_populates_display_fields() {
    let task: Task = serde_json::from_value(serde_json::json!({
      "action": "repo-migration",
      "src": { "url": "http://s:7200", "repo": "r1" },
      "tgt": { "url": "http://t:7200", "repo": "r1" },
    }))
    .unwrap();
    let status = TaskStatus::init(3, &task);
    assert_eq!(status.index, 3);
    assert_eq!(status.status, TaskState::Pending);
    assert_eq!(status.message, "waiting");
    assert_eq!(status.source, "http://s:7200/r1");
    assert_eq!(status.target, "http://t:7200/r1");
  }
}
