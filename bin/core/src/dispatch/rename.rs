use async_trait::async_trait;
use ferry_client::{entities::task::Task, error::FerryError};
use serde_json::json;

use crate::{
  dispatch::{
    Handler, HandlerContext, TaskResult, graph_exists, target,
  },
  helpers::{TempFile, file_size},
};

pub struct RepoRename;

#[async_trait]
impl Handler for RepoRename {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "repo-rename";
    let op = |e: anyhow::Error| FerryError::operation_with(OP, e);

    let tgt = target(task, OP)?;
    let endpoint = tgt.endpoint();
    let old = &tgt.repo_old;
    let new = &tgt.repo_new;

    let repos = ctx
      .store
      .list_repositories(&endpoint)
      .await
      .map_err(op)?;
    if !repos.iter().any(|info| &info.id == old) {
      return Err(FerryError::not_found("repository", old));
    }
    if repos.iter().any(|info| &info.id == new) {
      return Err(FerryError::conflict("repository", new));
    }

    let graphs = ctx
      .store
      .list_graphs(&endpoint, old)
      .await
      .map_err(op)?;
    let config = TempFile::unique(ctx.work_dir, ".ttl");
    ctx
      .store
      .download_repo_config(&endpoint, old, config.path())
      .await
      .map_err(op)?;

    // Export every named graph; collect errors per graph instead of
    // aborting on the first one.
    let mut exported: Vec<(String, TempFile)> = Vec::new();
    let mut export_errors: Vec<String> = Vec::new();
    let total_graphs =
      graphs.iter().filter(|graph| !graph.is_empty()).count();
    for graph in graphs.iter().filter(|graph| !graph.is_empty()) {
      let temp = TempFile::unique(ctx.work_dir, ".brf");
      match ctx
        .store
        .export_graph(&endpoint, old, graph, temp.path())
        .await
      {
        Ok(()) => exported.push((graph.clone(), temp)),
        Err(e) => export_errors.push(format!("{graph}: {e:#}")),
      }
    }
    if exported.is_empty() && total_graphs > 0 {
      return Err(FerryError::operation(
        OP,
        format!(
          "failed to export any of {total_graphs} graphs from '{old}'"
        ),
      ));
    }

    rewrite::update_repository_name_in_config(
      config.path(),
      old,
      new,
    )
    .map_err(op)?;
    ctx
      .store
      .restore_repo_config(&endpoint, config.path())
      .await
      .map_err(op)?;

    let mut imported = 0usize;
    let mut import_errors: Vec<String> = Vec::new();
    for (graph, file) in &exported {
      match ctx
        .store
        .import_graph(&endpoint, new, graph, file.path())
        .await
      {
        Ok(()) => imported += 1,
        Err(e) => import_errors.push(format!("{graph}: {e:#}")),
      }
    }
    if imported == 0 && !exported.is_empty() {
      // Graphs existed but none made it over. Roll the new repo
      // back so the rename does not leave an empty duplicate.
      if let Err(e) = ctx.store.delete_repo(&endpoint, new).await {
        warn!(
          "rollback delete of repository '{new}' failed | {e:#}"
        );
      }
      return Err(FerryError::operation(
        OP,
        format!("failed to import any graph into '{new}'"),
      ));
    }

    let mut result = TaskResult::new();
    if let Err(e) = ctx.store.delete_repo(&endpoint, old).await {
      // Not fatal: the rename itself succeeded.
      warn!("failed to delete old repository '{old}' | {e:#}");
      result.insert(
        "warning".into(),
        json!(format!(
          "failed to delete old repository '{old}': {e:#}"
        )),
      );
    }

    result.insert(
      "message".into(),
      json!(format!("repository '{old}' renamed to '{new}'")),
    );
    result.insert("oldName".into(), json!(old));
    result.insert("newName".into(), json!(new));
    result.insert("totalGraphs".into(), json!(total_graphs));
    result.insert("exportedGraphs".into(), json!(exported.len()));
    result.insert("importedGraphs".into(), json!(imported));
    if !export_errors.is_empty() {
      result.insert("exportErrors".into(), json!(export_errors));
    }
    if !import_errors.is_empty() {
      result.insert("importErrors".into(), json!(import_errors));
    }
    Ok(result)
  }
}

pub struct GraphRename;

#[async_trait]
impl Handler for GraphRename {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "graph-rename";
    let op = |e: anyhow::Error| FerryError::operation_with(OP, e);

    let tgt = target(task, OP)?;
    let endpoint = tgt.endpoint();
    let old = &tgt.graph_old;
    let new = &tgt.graph_new;

    let graphs = ctx
      .store
      .list_graphs(&endpoint, &tgt.repo)
      .await
      .map_err(op)?;
    if !graphs.iter().any(|uri| uri == old) {
      return Err(FerryError::not_found("graph", old));
    }
    if graphs.iter().any(|uri| uri == new) {
      return Err(FerryError::conflict("graph", new));
    }

    let export = TempFile::unique(ctx.work_dir, ".brf");
    ctx
      .store
      .export_graph(&endpoint, &tgt.repo, old, export.path())
      .await
      .map_err(op)?;
    let size = file_size(export.path()).await.map_err(op)?;
    if size == 0 {
      return Err(FerryError::operation(
        OP,
        format!(
          "exported graph file is empty - graph '{old}' may be empty"
        ),
      ));
    }

    ctx
      .store
      .import_graph(&endpoint, &tgt.repo, new, export.path())
      .await
      .map_err(op)?;
    if !graph_exists(ctx.store, &endpoint, &tgt.repo, new, OP)
      .await?
    {
      return Err(FerryError::operation(
        OP,
        format!("graph '{new}' not listed after import"),
      ));
    }

    let mut result = TaskResult::new();
    if let Err(e) =
      ctx.store.delete_graph(&endpoint, &tgt.repo, old).await
    {
      warn!("failed to delete old graph '{old}' | {e:#}");
      result.insert(
        "warning".into(),
        json!(format!("failed to delete old graph '{old}': {e:#}")),
      );
    }
    result.insert(
      "message".into(),
      json!(format!("graph '{old}' renamed to '{new}'")),
    );
    result.insert("fileSizeBytes".into(), json!(size));
    Ok(result)
  }
}
