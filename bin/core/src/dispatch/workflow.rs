use std::sync::Arc;

use async_trait::async_trait;
use ferry_client::{entities::task::Task, error::FerryError};
use futures::future::join_all;
use serde_json::json;
use tokio::sync::Semaphore;

use crate::dispatch::{
  Handler, HandlerContext, TaskResult, result_u64,
};

/// Runs an ItemList of sub-tasks, sequentially or under a bounded
/// semaphore, and reports the outcomes aligned to input order.
pub struct Workflow;

#[async_trait]
impl Handler for Workflow {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "workflow";
    let workflow = task.workflow.as_ref().ok_or_else(|| {
      FerryError::validation(
        "itemListElement",
        "workflow requires an item list",
      )
    })?;
    let items = &workflow.items;

    let outcomes: Vec<Result<TaskResult, FerryError>> =
      if workflow.parallel {
        let semaphore =
          Arc::new(Semaphore::new(workflow.concurrency()));
        join_all(items.iter().enumerate().map(|(index, item)| {
          let semaphore = semaphore.clone();
          async move {
            let _permit = semaphore
              .acquire()
              .await
              .expect("workflow semaphore closed");
            run_item(item, index, ctx).await
          }
        }))
        .await
      } else {
        let mut outcomes = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
          outcomes.push(run_item(item, index, ctx).await);
        }
        outcomes
      };

    let mut results = Vec::with_capacity(items.len());
    let mut errors: Vec<String> = Vec::new();
    let mut successful = 0usize;
    let mut data_size = 0u64;
    for (index, outcome) in outcomes.into_iter().enumerate() {
      let action = items[index].action;
      match outcome {
        Ok(item_result) => {
          successful += 1;
          data_size +=
            result_u64(&item_result, "dataSizeBytes").unwrap_or(0);
          results.push(json!({
            "index": index,
            "action": action,
            "status": "success",
            "result": item_result,
          }));
        }
        Err(e) => {
          errors.push(format!("item {index} ({action}): {e}"));
          results.push(json!({
            "index": index,
            "action": action,
            "status": "error",
            "error": e.to_string(),
          }));
        }
      }
    }

    let failed = items.len() - successful;
    if successful == 0 && failed > 0 {
      return Err(FerryError::operation(
        OP,
        format!(
          "all {failed} items failed | {}",
          errors.join(" | ")
        ),
      ));
    }

    let status_code = if failed == 0 { 200 } else { 207 };
    let mut result = TaskResult::new();
    result.insert(
      "message".into(),
      json!(format!(
        "{successful}/{} workflow items succeeded",
        items.len()
      )),
    );
    result.insert("totalItems".into(), json!(items.len()));
    result.insert("successfulItems".into(), json!(successful));
    result.insert("failedItems".into(), json!(failed));
    result.insert("results".into(), json!(results));
    result.insert("errors".into(), json!(errors));
    result.insert("statusCode".into(), json!(status_code));
    result.insert("dataSizeBytes".into(), json!(data_size));
    Ok(result)
  }
}

/// Items go through the same validate → dispatch path as top level
/// tasks, scoped to their list position.
async fn run_item(
  item: &Task,
  index: usize,
  ctx: &HandlerContext<'_>,
) -> Result<TaskResult, FerryError> {
  crate::validate::validate_task(item)?;
  let item_ctx = ctx.for_index(index);
  ctx.dispatcher.dispatch(item, &item_ctx).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    dispatch::{Dispatcher, mock::MockStore},
    helpers::UploadedFiles,
  };
  use ferry_client::entities::task::{TaskAction, WorkflowSpec};

  fn delete_task(repo: &str) -> Task {
    serde_json::from_value(serde_json::json!({
      "action": "repo-delete",
      "tgt": { "url": "http://t:7200", "repo": repo },
    }))
    .unwrap()
  }

  fn workflow_task(parallel: bool, concurrency: usize, repos: &[&str]) -> Task {
    let mut task = Task::new(TaskAction::Workflow);
    task.workflow = Some(WorkflowSpec {
      parallel,
      concurrency,
      items: repos.iter().map(|repo| delete_task(repo)).collect(),
    });
    task
  }

  #[tokio::test]
  async fn parallel_workflow_reports_multi_status_in_input_order() {
    // r1 / r3 exist, r2 / r4 do not: two successes, two failures.
    let store = MockStore::default()
      .with_repo("http://t:7200", "r1")
      .with_repo("http://t:7200", "r3");
    let files = UploadedFiles::default();
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::default();
    let ctx = HandlerContext {
      store: &store,
      files: &files,
      index: 0,
      work_dir: dir.path(),
      dispatcher: &dispatcher,
    };
    let task = workflow_task(true, 2, &["r1", "r2", "r3", "r4"]);

    let result = Workflow.handle(&task, &ctx).await.unwrap();
    assert_eq!(result_u64(&result, "totalItems"), Some(4));
    assert_eq!(result_u64(&result, "successfulItems"), Some(2));
    assert_eq!(result_u64(&result, "failedItems"), Some(2));
    assert_eq!(result_u64(&result, "statusCode"), Some(207));

    let results = result.get("results").unwrap().as_array().unwrap();
    let statuses: Vec<&str> = results
      .iter()
      .map(|entry| entry.get("status").unwrap().as_str().unwrap())
      .collect();
    assert_eq!(statuses, ["success", "error", "success", "error"]);
    for (index, entry) in results.iter().enumerate() {
      assert_eq!(
        entry.get("index").unwrap().as_u64().unwrap() as usize,
        index
      );
    }
  }

  #[tokio::test]
  async fn sequential_and_concurrency_one_agree() {
    for (parallel, concurrency) in [(false, 1), (true, 1)] {
      let store = MockStore::default()
        .with_repo("http://t:7200", "a")
        .with_repo("http://t:7200", "b");
      let files = UploadedFiles::default();
      let dir = tempfile::tempdir().unwrap();
      let dispatcher = Dispatcher::default();
      let ctx = HandlerContext {
        store: &store,
        files: &files,
        index: 0,
        work_dir: dir.path(),
        dispatcher: &dispatcher,
      };
      let task = workflow_task(parallel, concurrency, &["a", "b"]);
      let result = Workflow.handle(&task, &ctx).await.unwrap();
      assert_eq!(result_u64(&result, "statusCode"), Some(200));
      assert_eq!(result_u64(&result, "successfulItems"), Some(2));
      // Both modes issue the deletes in declared order.
      let deletes: Vec<String> = store
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("delete_repo"))
        .collect();
      assert_eq!(
        deletes,
        [
          "delete_repo http://t:7200 a",
          "delete_repo http://t:7200 b"
        ]
      );
    }
  }

  #[tokio::test]
  async fn workflow_with_all_failures_errors() {
    let store = MockStore::default();
    let files = UploadedFiles::default();
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::default();
    let ctx = HandlerContext {
      store: &store,
      files: &files,
      index: 0,
      work_dir: dir.path(),
      dispatcher: &dispatcher,
    };
    let task = workflow_task(false, 1, &["gone-1", "gone-2"]);
    let err = Workflow.handle(&task, &ctx).await.unwrap_err();
    assert!(matches!(err, FerryError::Operation { .. }));
  }

  #[tokio::test]
  async fn invalid_items_fail_validation_not_dispatch() {
    let store = MockStore::default().with_repo("http://t:7200", "a");
    let files = UploadedFiles::default();
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::default();
    let ctx = HandlerContext {
      store: &store,
      files: &files,
      index: 0,
      work_dir: dir.path(),
      dispatcher: &dispatcher,
    };
    let mut task = Task::new(TaskAction::Workflow);
    task.workflow = Some(WorkflowSpec {
      parallel: false,
      concurrency: 1,
      items: vec![
        delete_task("a"),
        // Missing target repo: validation failure.
        serde_json::from_value(serde_json::json!({
          "action": "repo-delete",
          "tgt": { "url": "http://t:7200" },
        }))
        .unwrap(),
      ],
    });
    let result = Workflow.handle(&task, &ctx).await.unwrap();
    assert_eq!(result_u64(&result, "failedItems"), Some(1));
    let errors = result.get("errors").unwrap().as_array().unwrap();
    assert!(
      errors[0].as_str().unwrap().contains("Validation failed")
    );
  }
}
