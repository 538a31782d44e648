use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use ferry_client::{
  entities::{
    Endpoint, JsonObject,
    task::{Task, TaskAction, TaskRef},
  },
  error::FerryError,
};
use store_client::GraphStore;

use crate::helpers::UploadedFiles;

mod graph;
mod rename;
mod repo;
mod workflow;

#[cfg(test)]
pub mod mock;

/// Free-form result map a handler returns on success. Well known
/// keys: `message`, `dataSizeBytes`, `tripleCount`.
pub type TaskResult = JsonObject;

pub fn result_message(result: &TaskResult) -> Option<&str> {
  result.get("message").and_then(|value| value.as_str())
}

pub fn result_u64(result: &TaskResult, key: &str) -> Option<u64> {
  result.get(key).and_then(|value| value.as_u64())
}

pub fn result_i64(result: &TaskResult, key: &str) -> Option<i64> {
  result.get(key).and_then(|value| value.as_i64())
}

/// Everything a handler invocation may touch besides the task
/// itself. The backend adapter is passed in explicitly; handlers
/// hold no global state.
pub struct HandlerContext<'a> {
  pub store: &'a dyn GraphStore,
  pub files: &'a UploadedFiles,
  pub index: usize,
  pub work_dir: &'a Path,
  pub dispatcher: &'a Dispatcher,
}

impl HandlerContext<'_> {
  /// Same context scoped to another task index (workflow items).
  fn for_index(&self, index: usize) -> HandlerContext<'_> {
    HandlerContext {
      store: self.store,
      files: self.files,
      index,
      work_dir: self.work_dir,
      dispatcher: self.dispatcher,
    }
  }
}

/// One task handler. Implementations must be safe to invoke
/// concurrently on distinct tasks and must clean up their temp
/// files on every exit path.
#[async_trait]
pub trait Handler: Send + Sync {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError>;
}

/// Maps action tags onto their handler. Handlers are registered
/// once at startup; the mapping never changes afterwards.
pub struct Dispatcher {
  handlers: HashMap<TaskAction, Box<dyn Handler>>,
}

impl Default for Dispatcher {
  fn default() -> Self {
    let mut handlers: HashMap<TaskAction, Box<dyn Handler>> =
      HashMap::new();
    handlers.insert(
      TaskAction::RepoMigration,
      Box::new(repo::RepoMigration),
    );
    handlers.insert(
      TaskAction::GraphMigration,
      Box::new(graph::GraphMigration),
    );
    handlers.insert(TaskAction::RepoDelete, Box::new(repo::RepoDelete));
    handlers
      .insert(TaskAction::GraphDelete, Box::new(graph::GraphDelete));
    handlers.insert(TaskAction::RepoCreate, Box::new(repo::RepoCreate));
    handlers
      .insert(TaskAction::GraphImport, Box::new(graph::GraphImport));
    handlers.insert(TaskAction::RepoImport, Box::new(repo::RepoImport));
    handlers
      .insert(TaskAction::RepoRename, Box::new(rename::RepoRename));
    handlers
      .insert(TaskAction::GraphRename, Box::new(rename::GraphRename));
    handlers
      .insert(TaskAction::Workflow, Box::new(workflow::Workflow));
    Dispatcher { handlers }
  }
}

impl Dispatcher {
  pub async fn dispatch(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    let handler = self.handlers.get(&task.action).ok_or_else(|| {
      FerryError::validation(
        "action",
        format!("no handler registered for '{}'", task.action),
      )
    })?;
    handler.handle(task, ctx).await
  }
}

/// List target repositories and report whether `repo` is present.
/// Adapter failures surface as operation errors of `operation`.
async fn repo_exists(
  store: &dyn GraphStore,
  endpoint: &Endpoint,
  repo: &str,
  operation: &str,
) -> Result<bool, FerryError> {
  let repos = store
    .list_repositories(endpoint)
    .await
    .map_err(|e| FerryError::operation_with(operation, e))?;
  Ok(repos.iter().any(|info| info.id == repo))
}

async fn graph_exists(
  store: &dyn GraphStore,
  endpoint: &Endpoint,
  repo: &str,
  graph: &str,
  operation: &str,
) -> Result<bool, FerryError> {
  let graphs = store
    .list_graphs(endpoint, repo)
    .await
    .map_err(|e| FerryError::operation_with(operation, e))?;
  Ok(graphs.iter().any(|uri| uri == graph))
}

/// Target ref of the task; handlers calling this have already been
/// validated, so absence is an internal error surfaced as one.
fn target<'a>(
  task: &'a Task,
  operation: &str,
) -> Result<&'a TaskRef, FerryError> {
  task.tgt.as_ref().ok_or_else(|| {
    FerryError::operation(operation, "task has no target")
  })
}

fn source<'a>(
  task: &'a Task,
  operation: &str,
) -> Result<&'a TaskRef, FerryError> {
  task.src.as_ref().ok_or_else(|| {
    FerryError::operation(operation, "task has no source")
  })
}
