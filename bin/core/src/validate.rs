use ferry_client::{
  entities::task::{Task, TaskAction, TaskRef},
  error::FerryError,
};

/// Per-action field presence rules, applied by the executor before
/// a task is dispatched. A failing task records a validation error
/// and the batch moves on.
pub fn validate_task(task: &Task) -> Result<(), FerryError> {
  match task.action {
    TaskAction::RepoMigration => {
      let src = require_ref(&task.src, "src")?;
      require(&src.url, "src.url")?;
      require(&src.repo, "src.repo")?;
      let tgt = require_ref(&task.tgt, "tgt")?;
      require(&tgt.url, "tgt.url")?;
      require(&tgt.repo, "tgt.repo")
    }
    TaskAction::GraphMigration => {
      let src = require_ref(&task.src, "src")?;
      require(&src.url, "src.url")?;
      require(&src.repo, "src.repo")?;
      require(&src.graph, "src.graph")?;
      let tgt = require_ref(&task.tgt, "tgt")?;
      require(&tgt.url, "tgt.url")?;
      require(&tgt.repo, "tgt.repo")
    }
    TaskAction::RepoDelete
    | TaskAction::RepoCreate
    | TaskAction::RepoImport => {
      let tgt = require_ref(&task.tgt, "tgt")?;
      require(&tgt.url, "tgt.url")?;
      require(&tgt.repo, "tgt.repo")
    }
    TaskAction::GraphDelete | TaskAction::GraphImport => {
      let tgt = require_ref(&task.tgt, "tgt")?;
      require(&tgt.url, "tgt.url")?;
      require(&tgt.repo, "tgt.repo")?;
      require(&tgt.graph, "tgt.graph")
    }
    TaskAction::RepoRename => {
      let tgt = require_ref(&task.tgt, "tgt")?;
      require(&tgt.url, "tgt.url")?;
      require(&tgt.repo_old, "tgt.repoOld")?;
      require(&tgt.repo_new, "tgt.repoNew")?;
      if tgt.repo_old == tgt.repo_new {
        return Err(FerryError::validation(
          "tgt.repoNew",
          "new repository name must differ from the old one",
        ));
      }
      Ok(())
    }
    TaskAction::GraphRename => {
      let tgt = require_ref(&task.tgt, "tgt")?;
      require(&tgt.url, "tgt.url")?;
      require(&tgt.repo, "tgt.repo")?;
      require(&tgt.graph_old, "tgt.graphOld")?;
      require(&tgt.graph_new, "tgt.graphNew")?;
      if tgt.graph_old == tgt.graph_new {
        return Err(FerryError::validation(
          "tgt.graphNew",
          "new graph name must differ from the old one",
        ));
      }
      Ok(())
    }
    TaskAction::Workflow => {
      let workflow = task.workflow.as_ref().ok_or_else(|| {
        FerryError::validation(
          "itemListElement",
          "workflow requires an item list",
        )
      })?;
      if workflow.items.is_empty() {
        return Err(FerryError::validation(
          "itemListElement",
          "workflow requires at least one item",
        ));
      }
      Ok(())
    }
  }
}

fn require(value: &str, field: &str) -> Result<(), FerryError> {
  if value.trim().is_empty() {
    Err(FerryError::validation(field, "must not be empty"))
  } else {
    Ok(())
  }
}

fn require_ref<'a>(
  task_ref: &'a Option<TaskRef>,
  field: &str,
) -> Result<&'a TaskRef, FerryError> {
  task_ref
    .as_ref()
    .ok_or_else(|| FerryError::validation(field, "is required"))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn task(value: serde_json::Value) -> Task {
    serde_json::from_value(value).unwrap()
  }

  fn failing_field(task: &Task) -> String {
    match validate_task(task).unwrap_err() {
      FerryError::Validation { field, .. } => field,
      other => panic!("expected validation error, got {other}"),
    }
  }

  #[test]
  fn migration_requires_both_refs() {
    let t = task(serde_json::json!({
      "action": "repo-migration",
      "src": { "url": "http://s:7200", "repo": "r1" },
    }));
    assert_eq!(failing_field(&t), "tgt");

    let t = task(serde_json::json!({
      "action": "repo-migration",
      "src": { "url": "http://s:7200", "repo": "r1" },
      "tgt": { "url": "http://t:7200", "repo": "r1" },
    }));
    assert!(validate_task(&t).is_ok());
  }

  #[test]
  fn graph_migration_requires_source_graph() {
    let t = task(serde_json::json!({
      "action": "graph-migration",
      "src": { "url": "http://s:7200", "repo": "r1" },
      "tgt": { "url": "http://t:7200", "repo": "r1" },
    }));
    assert_eq!(failing_field(&t), "src.graph");
  }

  #[test]
  fn graph_actions_require_graph_on_target() {
    for action in ["graph-delete", "graph-import"] {
      let t = task(serde_json::json!({
        "action": action,
        "tgt": { "url": "http://t:7200", "repo": "r1" },
      }));
      assert_eq!(failing_field(&t), "tgt.graph");
    }
  }

  #[test]
  fn renames_require_distinct_names() {
    let t = task(serde_json::json!({
      "action": "repo-rename",
      "tgt": { "url": "http://t:7200", "repoOld": "a", "repoNew": "a" },
    }));
    assert_eq!(failing_field(&t), "tgt.repoNew");

    let t = task(serde_json::json!({
      "action": "graph-rename",
      "tgt": {
        "url": "http://t:7200", "repo": "r1",
        "graphOld": "http://g/a", "graphNew": "http://g/a",
      },
    }));
    assert_eq!(failing_field(&t), "tgt.graphNew");
  }

  #[test]
  fn blank_strings_do_not_pass() {
    let t = task(serde_json::json!({
      "action": "repo-delete",
      "tgt": { "url": "   ", "repo": "r1" },
    }));
    assert_eq!(failing_field(&t), "tgt.url");
  }
}
