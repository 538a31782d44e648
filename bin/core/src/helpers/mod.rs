use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use anyhow::Context;
use ferry_client::entities::session::FileInfo;
use uuid::Uuid;

pub fn md5_hex(bytes: &[u8]) -> String {
  format!("{:x}", md5::compute(bytes))
}

/// Unique file name carrying the given extension (leading dot
/// included, may be empty).
pub fn unique_file_name(ext: &str) -> String {
  format!("{}{ext}", Uuid::new_v4())
}

/// Extension of `name` including the leading dot, or empty.
pub fn file_extension(name: &str) -> String {
  Path::new(name)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| format!(".{ext}"))
    .unwrap_or_default()
}

pub async fn file_size(path: &Path) -> anyhow::Result<u64> {
  let meta = tokio::fs::metadata(path)
    .await
    .with_context(|| format!("failed to stat {path:?}"))?;
  Ok(meta.len())
}

/// A file removed on drop. Every temp file a handler creates is
/// owned by one of these, so all exit paths (including a dropped
/// future on deadline) clean up.
#[derive(Debug)]
pub struct TempFile {
  path: PathBuf,
}

impl TempFile {
  pub fn new(dir: &Path, file_name: &str) -> TempFile {
    TempFile {
      path: dir.join(file_name),
    }
  }

  /// Fresh uuid-named temp file in `dir`.
  pub fn unique(dir: &Path, ext: &str) -> TempFile {
    TempFile::new(dir, &unique_file_name(ext))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for TempFile {
  fn drop(&mut self) {
    if let Err(e) = std::fs::remove_file(&self.path)
      && e.kind() != std::io::ErrorKind::NotFound
    {
      warn!("failed to remove temp file {:?} | {e:?}", self.path);
    }
  }
}

/// One staged multipart upload. The staged copy lives until the
/// owning [UploadedFiles] map is dropped at the end of the batch.
#[derive(Debug)]
pub struct UploadedFile {
  pub name: String,
  pub content_type: String,
  pub size: u64,
  pub md5: String,
  staged: TempFile,
}

impl UploadedFile {
  pub async fn stage(
    dir: &Path,
    name: &str,
    content_type: &str,
    bytes: &[u8],
  ) -> anyhow::Result<UploadedFile> {
    let staged = TempFile::unique(dir, &file_extension(name));
    tokio::fs::write(staged.path(), bytes).await.with_context(
      || format!("failed to stage upload at {:?}", staged.path()),
    )?;
    Ok(UploadedFile {
      name: name.to_string(),
      content_type: content_type.to_string(),
      size: bytes.len() as u64,
      md5: md5_hex(bytes),
      staged,
    })
  }

  pub fn path(&self) -> &Path {
    self.staged.path()
  }

  pub fn file_info(&self) -> FileInfo {
    FileInfo {
      name: self.name.clone(),
      content_type: self.content_type.clone(),
      size: self.size,
      md5: self.md5.clone(),
    }
  }
}

/// Uploads keyed by their multipart field name
/// (`task_<i>_config`, `task_<i>_files`, `config`, `data`).
#[derive(Debug, Default)]
pub struct UploadedFiles {
  files: HashMap<String, Vec<UploadedFile>>,
}

impl UploadedFiles {
  pub fn insert(&mut self, field: &str, file: UploadedFile) {
    self.files.entry(field.to_string()).or_default().push(file);
  }

  pub fn get(&self, field: &str) -> &[UploadedFile] {
    self
      .files
      .get(field)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  pub fn first(&self, field: &str) -> Option<&UploadedFile> {
    self.get(field).first()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  /// Field key for the config upload of task `index`.
  pub fn config_key(index: usize) -> String {
    format!("task_{index}_config")
  }

  /// Field key for the data uploads of task `index`.
  pub fn files_key(index: usize) -> String {
    format!("task_{index}_files")
  }
}
