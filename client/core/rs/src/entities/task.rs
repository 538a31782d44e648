use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  entities::{Endpoint, trim_trailing_slashes},
  error::FerryError,
};

/// The administrative operations Ferry can run against a backend.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskAction {
  RepoMigration,
  GraphMigration,
  RepoDelete,
  GraphDelete,
  RepoCreate,
  GraphImport,
  RepoImport,
  RepoRename,
  GraphRename,
  /// An ItemList of sub-actions run sequentially or with bounded
  /// parallelism.
  Workflow,
}

/// A reference to a repository (and optionally a named graph) on a
/// remote endpoint. Which fields are required depends on the action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub url: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub username: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub password: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub repo: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub graph: String,
  #[serde(
    default,
    rename = "repoOld",
    skip_serializing_if = "String::is_empty"
  )]
  pub repo_old: String,
  #[serde(
    default,
    rename = "repoNew",
    skip_serializing_if = "String::is_empty"
  )]
  pub repo_new: String,
  #[serde(
    default,
    rename = "graphOld",
    skip_serializing_if = "String::is_empty"
  )]
  pub graph_old: String,
  #[serde(
    default,
    rename = "graphNew",
    skip_serializing_if = "String::is_empty"
  )]
  pub graph_new: String,
}

impl TaskRef {
  pub fn normalize(&mut self) {
    self.url = trim_trailing_slashes(std::mem::take(&mut self.url));
  }

  pub fn endpoint(&self) -> Endpoint {
    Endpoint {
      url: self.url.clone(),
      username: self.username.clone(),
      password: self.password.clone(),
    }
  }

  /// Human readable `url/repo` form for status displays.
  pub fn display(&self) -> String {
    let repo = if !self.repo.is_empty() {
      &self.repo
    } else if !self.repo_old.is_empty() {
      &self.repo_old
    } else {
      return self.url.clone();
    };
    if self.url.is_empty() {
      repo.clone()
    } else {
      format!("{}/{}", self.url, repo)
    }
  }
}

/// One administrative operation over one or two endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
  pub action: TaskAction,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub src: Option<TaskRef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tgt: Option<TaskRef>,
  /// Only present for [TaskAction::Workflow].
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workflow: Option<WorkflowSpec>,
}

impl Task {
  pub fn new(action: TaskAction) -> Task {
    Task {
      action,
      src: None,
      tgt: None,
      workflow: None,
    }
  }

  pub fn src_display(&self) -> String {
    self.src.as_ref().map(TaskRef::display).unwrap_or_default()
  }

  pub fn tgt_display(&self) -> String {
    self.tgt.as_ref().map(TaskRef::display).unwrap_or_default()
  }

  pub fn normalize(&mut self) {
    if let Some(src) = &mut self.src {
      src.normalize();
    }
    if let Some(tgt) = &mut self.tgt {
      tgt.normalize();
    }
    if let Some(workflow) = &mut self.workflow {
      for item in &mut workflow.items {
        item.normalize();
      }
    }
  }
}

/// Parsed ItemList container: ordered sub-tasks plus scheduling mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
  #[serde(default)]
  pub parallel: bool,
  #[serde(default = "default_concurrency")]
  pub concurrency: usize,
  pub items: Vec<Task>,
}

fn default_concurrency() -> usize {
  1
}

impl WorkflowSpec {
  /// Effective worker count, always at least one.
  pub fn concurrency(&self) -> usize {
    self.concurrency.max(1)
  }
}

/// The legacy flat surface grammar: `{version, tasks[]}` with string
/// action tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationRequest {
  #[serde(default)]
  pub version: String,
  #[serde(default)]
  pub tasks: Vec<RawTask>,
}

/// A task as it arrives on the wire. The action is an arbitrary
/// string until [MigrationRequest::normalize] maps it onto
/// [TaskAction].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTask {
  #[serde(default)]
  pub action: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub src: Option<TaskRef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tgt: Option<TaskRef>,
}

impl MigrationRequest {
  /// Map the wire form onto the internal task model. Rejects an
  /// empty version, an empty task list, and unknown action tags.
  pub fn normalize(self) -> Result<Vec<Task>, FerryError> {
    if self.version.trim().is_empty() {
      return Err(FerryError::validation(
        "version",
        "version must not be empty",
      ));
    }
    if self.tasks.is_empty() {
      return Err(FerryError::validation(
        "tasks",
        "at least one task is required",
      ));
    }
    self
      .tasks
      .into_iter()
      .map(|raw| {
        let action =
          TaskAction::from_str(&raw.action).map_err(|_| {
            FerryError::validation(
              "action",
              format!("unknown action '{}'", raw.action),
            )
          })?;
        let mut task = Task {
          action,
          src: raw.src,
          tgt: raw.tgt,
          workflow: None,
        };
        task.normalize();
        Ok(task)
      })
      .collect()
  }
}
