use std::{
  path::{Path, PathBuf},
  time::SystemTime,
};

use anyhow::Context;
use chrono::{DateTime, Datelike, Utc};
use flate2::{Compression, write::GzEncoder};
use indexmap::IndexMap;

use super::MigrationLog;

impl MigrationLog {
  /// Tiered rotation, invoked explicitly:
  ///
  /// 1. Daily summaries older than the daily retention (by mtime)
  ///    but within the archive retention are grouped by ISO week.
  /// 2. Each group is packed into
  ///    `archive/migration_YYYY-Www.tar.gz` (base names only).
  /// 3. Successfully archived dailies are removed.
  /// 4. Archives older than the archive retention are deleted.
  ///
  /// Failures are warnings; the rotation never aborts halfway.
  pub fn rotate_old_logs(&self) -> anyhow::Result<()> {
    let now = SystemTime::now();

    let mut buckets: IndexMap<String, Vec<PathBuf>> =
      IndexMap::new();
    for entry in
      std::fs::read_dir(&self.root).with_context(|| {
        format!("failed to list data dir {:?}", self.root)
      })?
    {
      let entry = entry.context("failed to read dir entry")?;
      let path = entry.path();
      let Some(name) = path.file_name().and_then(|n| n.to_str())
      else {
        continue;
      };
      if !name.starts_with("migration_") || !name.ends_with(".json")
      {
        continue;
      }
      let Ok(mtime) = entry.metadata().and_then(|m| m.modified())
      else {
        warn!("could not stat {path:?}, skipping");
        continue;
      };
      let age = age_days(now, mtime);
      if age > self.daily_retention_days
        && age <= self.archive_retention_days
      {
        buckets
          .entry(archive_name_for(mtime))
          .or_default()
          .push(path);
      }
    }

    for (archive_name, files) in buckets {
      let archive_path = self.archive_dir.join(&archive_name);
      match build_archive(&archive_path, &files) {
        Ok(()) => {
          info!(
            "rotated {} daily summaries into {archive_name}",
            files.len()
          );
          for file in files {
            if let Err(e) = std::fs::remove_file(&file) {
              warn!("failed to remove archived daily {file:?} | {e:?}");
            }
          }
        }
        Err(e) => {
          warn!("failed to build archive {archive_name} | {e:#}");
        }
      }
    }

    for entry in
      std::fs::read_dir(&self.archive_dir).with_context(|| {
        format!("failed to list archive dir {:?}", self.archive_dir)
      })?
    {
      let entry = entry.context("failed to read archive entry")?;
      let path = entry.path();
      let Some(name) = path.file_name().and_then(|n| n.to_str())
      else {
        continue;
      };
      if !name.ends_with(".tar.gz") {
        continue;
      }
      let Ok(mtime) = entry.metadata().and_then(|m| m.modified())
      else {
        continue;
      };
      if age_days(now, mtime) > self.archive_retention_days {
        match std::fs::remove_file(&path) {
          Ok(()) => info!("deleted expired archive {name}"),
          Err(e) => {
            warn!("failed to delete expired archive {path:?} | {e:?}")
          }
        }
      }
    }

    Ok(())
  }
}

/// Weekly archive name keyed by the ISO year-week of `mtime`.
pub fn archive_name_for(mtime: SystemTime) -> String {
  let dt: DateTime<Utc> = mtime.into();
  let week = dt.iso_week();
  format!("migration_{:04}-W{:02}.tar.gz", week.year(), week.week())
}

fn age_days(now: SystemTime, mtime: SystemTime) -> u64 {
  now
    .duration_since(mtime)
    .map(|age| age.as_secs() / 86_400)
    .unwrap_or(0)
}

fn build_archive(
  archive_path: &Path,
  files: &[PathBuf],
) -> anyhow::Result<()> {
  let file =
    std::fs::File::create(archive_path).with_context(|| {
      format!("failed to create archive at {archive_path:?}")
    })?;
  let encoder = GzEncoder::new(file, Compression::default());
  let mut builder = tar::Builder::new(encoder);
  for path in files {
    let name = path
      .file_name()
      .context("archived file has no file name")?;
    builder
      .append_path_with_name(path, name)
      .with_context(|| format!("failed to append {path:?}"))?;
  }
  builder
    .into_inner()
    .context("failed to finish tar stream")?
    .finish()
    .context("failed to finish gzip stream")?;
  Ok(())
}
