use async_trait::async_trait;
use ferry_client::{entities::task::Task, error::FerryError};
use serde_json::json;

use crate::{
  dispatch::{
    Handler, HandlerContext, TaskResult, repo_exists, source, target,
  },
  helpers::{TempFile, UploadedFiles, file_extension, file_size},
};

pub struct RepoMigration;

#[async_trait]
impl Handler for RepoMigration {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "repo-migration";
    let op = |e: anyhow::Error| FerryError::operation_with(OP, e);

    let src = source(task, OP)?;
    let tgt = target(task, OP)?;
    let src_ep = src.endpoint();
    let tgt_ep = tgt.endpoint();

    if !repo_exists(ctx.store, &src_ep, &src.repo, OP).await? {
      return Err(FerryError::not_found("repository", &src.repo));
    }

    let config = TempFile::unique(ctx.work_dir, ".ttl");
    let data = TempFile::unique(ctx.work_dir, ".brf");
    ctx
      .store
      .download_repo_config(&src_ep, &src.repo, config.path())
      .await
      .map_err(op)?;
    ctx
      .store
      .download_repo_data(&src_ep, &src.repo, data.path())
      .await
      .map_err(op)?;

    // A target repository with the source name gets replaced.
    if repo_exists(ctx.store, &tgt_ep, &src.repo, OP).await? {
      ctx
        .store
        .delete_repo(&tgt_ep, &src.repo)
        .await
        .map_err(op)?;
    }

    ctx
      .store
      .restore_repo_config(&tgt_ep, config.path())
      .await
      .map_err(op)?;
    ctx
      .store
      .restore_repo_data(&tgt_ep, data.path())
      .await
      .map_err(op)?;

    let data_size = file_size(data.path()).await.map_err(op)?;
    let mut result = TaskResult::new();
    result.insert(
      "message".into(),
      json!(format!(
        "repository '{}' migrated to {}",
        src.repo, tgt.url
      )),
    );
    result.insert("dataSizeBytes".into(), json!(data_size));
    Ok(result)
  }
}

pub struct RepoDelete;

#[async_trait]
impl Handler for RepoDelete {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "repo-delete";
    let tgt = target(task, OP)?;
    let endpoint = tgt.endpoint();
    if !repo_exists(ctx.store, &endpoint, &tgt.repo, OP).await? {
      return Err(FerryError::not_found("repository", &tgt.repo));
    }
    ctx
      .store
      .delete_repo(&endpoint, &tgt.repo)
      .await
      .map_err(|e| FerryError::operation_with(OP, e))?;
    let mut result = TaskResult::new();
    result.insert(
      "message".into(),
      json!(format!("repository '{}' deleted", tgt.repo)),
    );
    Ok(result)
  }
}

pub struct RepoCreate;

#[async_trait]
impl Handler for RepoCreate {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "repo-create";
    let op = |e: anyhow::Error| FerryError::operation_with(OP, e);

    let tgt = target(task, OP)?;
    let endpoint = tgt.endpoint();
    // Creating over an existing repository is forbidden.
    if repo_exists(ctx.store, &endpoint, &tgt.repo, OP).await? {
      return Err(FerryError::conflict("repository", &tgt.repo));
    }

    let key = UploadedFiles::config_key(ctx.index);
    let upload = ctx.files.first(&key).ok_or_else(|| {
      FerryError::validation(key.clone(), "config file upload is required")
    })?;

    let config = TempFile::unique(ctx.work_dir, ".ttl");
    tokio::fs::copy(upload.path(), config.path())
      .await
      .map_err(|e| op(e.into()))?;
    // Best effort: a config without the token passes through as is.
    rewrite::apply_placeholder_in_file(config.path(), &tgt.repo)
      .map_err(op)?;

    ctx
      .store
      .restore_repo_config(&endpoint, config.path())
      .await
      .map_err(op)?;

    if !repo_exists(ctx.store, &endpoint, &tgt.repo, OP).await? {
      return Err(FerryError::operation(
        OP,
        format!(
          "repository '{}' not listed after config restore",
          tgt.repo
        ),
      ));
    }

    let mut result = TaskResult::new();
    result.insert(
      "message".into(),
      json!(format!("repository '{}' created", tgt.repo)),
    );
    result.insert("configFile".into(), json!(upload.name));
    Ok(result)
  }
}

pub struct RepoImport;

#[async_trait]
impl Handler for RepoImport {
  async fn handle(
    &self,
    task: &Task,
    ctx: &HandlerContext<'_>,
  ) -> Result<TaskResult, FerryError> {
    const OP: &str = "repo-import";
    let op = |e: anyhow::Error| FerryError::operation_with(OP, e);

    let tgt = target(task, OP)?;
    let tgt_ep = tgt.endpoint();
    let mut result = TaskResult::new();

    // Source repo present: pull its data file. Otherwise the data
    // comes from an upload.
    let data_size = match
      task.src.as_ref().filter(|src| !src.repo.is_empty())
    {
      Some(src) => {
        let data = TempFile::unique(ctx.work_dir, ".brf");
        ctx
          .store
          .download_repo_data(&src.endpoint(), &src.repo, data.path())
          .await
          .map_err(op)?;
        ctx
          .store
          .restore_repo_data(&tgt_ep, data.path())
          .await
          .map_err(op)?;
        file_size(data.path()).await.map_err(op)?
      }
      None => {
        let key = UploadedFiles::files_key(ctx.index);
        let upload = ctx.files.first(&key).ok_or_else(|| {
          FerryError::validation(
            key.clone(),
            "one data file upload is required",
          )
        })?;
        let data = TempFile::unique(
          ctx.work_dir,
          &file_extension(&upload.name),
        );
        tokio::fs::copy(upload.path(), data.path())
          .await
          .map_err(|e| op(e.into()))?;
        ctx
          .store
          .restore_repo_data(&tgt_ep, data.path())
          .await
          .map_err(op)?;
        result.insert("fileName".into(), json!(upload.name));
        upload.size
      }
    };

    result.insert(
      "message".into(),
      json!(format!("data imported into '{}'", tgt.repo)),
    );
    result.insert("dataSizeBytes".into(), json!(data_size));
    Ok(result)
  }
}
