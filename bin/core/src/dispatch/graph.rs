use async_trait::async_trait;
use ferry_client::{entities::task::Task, error::FerryError};
use serde_json::json;

use crate::{
  dispatch::{
    Handler, HandlerContext, TaskResult, graph_exists, repo_exists,
    source, target,
  },
  helpers::{
    TempFile, UploadedFiles, file_extension, file_size, md5_hex,
  },
};

pub struct GraphMigration;

#[async_trait]
impl Handler for GraphMigration {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "graph-migration";
    let op = |e: anyhow::Error| FerryError::operation_with(OP, e);

    let src = source(task, OP)?;
    let tgt = target(task, OP)?;
    let src_ep = src.endpoint();
    let tgt_ep = tgt.endpoint();

    if !repo_exists(ctx.store, &src_ep, &src.repo, OP).await? {
      return Err(FerryError::not_found("repository", &src.repo));
    }
    if !graph_exists(ctx.store, &src_ep, &src.repo, &src.graph, OP)
      .await?
    {
      return Err(FerryError::not_found("graph", &src.graph));
    }

    // Export file name derives from the graph uri.
    let export = TempFile::new(
      ctx.work_dir,
      &format!("{}.brf", md5_hex(src.graph.as_bytes())),
    );
    ctx
      .store
      .export_graph(&src_ep, &src.repo, &src.graph, export.path())
      .await
      .map_err(op)?;

    if !repo_exists(ctx.store, &tgt_ep, &tgt.repo, OP).await? {
      return Err(FerryError::not_found("repository", &tgt.repo));
    }
    let graph = if tgt.graph.is_empty() {
      &src.graph
    } else {
      &tgt.graph
    };
    if graph_exists(ctx.store, &tgt_ep, &tgt.repo, graph, OP).await? {
      ctx
        .store
        .delete_graph(&tgt_ep, &tgt.repo, graph)
        .await
        .map_err(op)?;
    }
    ctx
      .store
      .import_graph(&tgt_ep, &tgt.repo, graph, export.path())
      .await
      .map_err(op)?;

    let data_size = file_size(export.path()).await.map_err(op)?;
    let mut result = TaskResult::new();
    result.insert(
      "message".into(),
      json!(format!(
        "graph '{}' migrated into '{}'",
        src.graph, tgt.repo
      )),
    );
    result.insert("dataSizeBytes".into(), json!(data_size));
    Ok(result)
  }
}

pub struct GraphDelete;

#[async_trait]
impl Handler for GraphDelete {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "graph-delete";
    let tgt = target(task, OP)?;
    let endpoint = tgt.endpoint();
    if !graph_exists(ctx.store, &endpoint, &tgt.repo, &tgt.graph, OP)
      .await?
    {
      return Err(FerryError::not_found("graph", &tgt.graph));
    }
    ctx
      .store
      .delete_graph(&endpoint, &tgt.repo, &tgt.graph)
      .await
      .map_err(|e| FerryError::operation_with(OP, e))?;
    let mut result = TaskResult::new();
    result.insert(
      "message".into(),
      json!(format!(
        "graph '{}' deleted from '{}'",
        tgt.graph, tgt.repo
      )),
    );
    Ok(result)
  }
}

pub struct GraphImport;

#[async_trait]
impl Handler for GraphImport {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "graph-import";
    let op = |e: anyhow::Error| FerryError::operation_with(OP, e);

    let tgt = target(task, OP)?;
    let endpoint = tgt.endpoint();
    let key = UploadedFiles::files_key(ctx.index);
    let uploads = ctx.files.get(&key);
    if uploads.is_empty() {
      return Err(FerryError::validation(
        key.clone(),
        "at least one file upload is required",
      ));
    }

    // The repository listing is best effort here: some backends
    // hide system repositories from it.
    match repo_exists(ctx.store, &endpoint, &tgt.repo, OP).await {
      Ok(true) => {}
      Ok(false) => warn!(
        "target repository '{}' not in listing, proceeding with import",
        tgt.repo
      ),
      Err(e) => {
        warn!("repository listing failed, proceeding with import | {e:#}")
      }
    }

    // A pre-existing target graph is replaced silently.
    if let Ok(true) =
      graph_exists(ctx.store, &endpoint, &tgt.repo, &tgt.graph, OP)
        .await
      && let Err(e) = ctx
        .store
        .delete_graph(&endpoint, &tgt.repo, &tgt.graph)
        .await
    {
      warn!("failed to delete pre-existing graph '{}' | {e:#}", tgt.graph);
    }

    let mut file_results = TaskResult::new();
    let mut imported = 0usize;
    let mut data_size = 0u64;
    for upload in uploads {
      let temp = TempFile::unique(
        ctx.work_dir,
        &file_extension(&upload.name),
      );
      let res = async {
        tokio::fs::copy(upload.path(), temp.path())
          .await
          .map_err(|e| op(e.into()))?;
        ctx
          .store
          .import_graph(&endpoint, &tgt.repo, &tgt.graph, temp.path())
          .await
          .map_err(op)
      }
      .await;
      match res {
        Ok(()) => {
          imported += 1;
          data_size += upload.size;
          file_results.insert(
            upload.name.clone(),
            json!({ "status": "success", "sizeBytes": upload.size }),
          );
        }
        Err(e) => {
          file_results.insert(
            upload.name.clone(),
            json!({ "status": "error", "error": e.to_string() }),
          );
        }
      }
    }

    if imported == 0 {
      return Err(FerryError::operation(
        OP,
        format!(
          "no file could be imported into graph '{}'",
          tgt.graph
        ),
      ));
    }

    let mut result = TaskResult::new();
    result.insert(
      "message".into(),
      json!(format!(
        "{imported} file(s) imported into graph '{}'",
        tgt.graph
      )),
    );
    result.insert("importedFiles".into(), json!(imported));
    result.insert("dataSizeBytes".into(), json!(data_size));
    result.insert("fileResults".into(), json!(file_results));
    Ok(result)
  }
}
