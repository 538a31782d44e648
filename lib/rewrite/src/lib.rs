//! Literal token rewriting of triplestore repository configs.
//! The config is never parsed as Turtle; only the known naming
//! patterns are substituted.

use std::path::Path;

use anyhow::Context;

/// Token substituted with the requested repository name when
/// restoring an uploaded config template. Absence is tolerated.
pub const PLACEHOLDER_TOKEN: &str = "PLACEHOLDER";

/// Replace every naming pattern carrying the old repository name:
///
/// - `rep:repositoryID "old"`
/// - `<http://www.openrdf.org/config/repository#old>`
/// - `repo:old`
/// - `@base <…#old>` (arbitrary URI prefix, matched per line)
pub fn rewrite_config(content: &str, old: &str, new: &str) -> String {
  let rewritten = content
    .replace(
      &format!("rep:repositoryID \"{old}\""),
      &format!("rep:repositoryID \"{new}\""),
    )
    .replace(
      &format!("<http://www.openrdf.org/config/repository#{old}>"),
      &format!("<http://www.openrdf.org/config/repository#{new}>"),
    )
    .replace(&format!("repo:{old}"), &format!("repo:{new}"));

  // The @base prefix is repository specific, so the pattern is
  // anchored to the directive line instead of the full URI.
  let mut out = rewritten
    .lines()
    .map(|line| {
      if line.trim_start().starts_with("@base") {
        line.replace(&format!("#{old}>"), &format!("#{new}>"))
      } else {
        line.to_string()
      }
    })
    .collect::<Vec<_>>()
    .join("\n");
  if rewritten.ends_with('\n') {
    out.push('\n');
  }
  out
}

/// Rewrite the repository name inside the config file at `path`.
pub fn update_repository_name_in_config(
  path: &Path,
  old: &str,
  new: &str,
) -> anyhow::Result<()> {
  let content = std::fs::read_to_string(path).with_context(|| {
    format!("failed to read config at {path:?}")
  })?;
  let rewritten = rewrite_config(&content, old, new);
  std::fs::write(path, rewritten).with_context(|| {
    format!("failed to write rewritten config to {path:?}")
  })
}

/// Substitute the `PLACEHOLDER` token with the repository name.
/// Best effort: a config without the token passes through unchanged.
pub fn apply_placeholder(content: &str, name: &str) -> String {
  content.replace(PLACEHOLDER_TOKEN, name)
}

/// [apply_placeholder] over the file at `path`.
pub fn apply_placeholder_in_file(
  path: &Path,
  name: &str,
) -> anyhow::Result<()> {
  let content = std::fs::read_to_string(path).with_context(|| {
    format!("failed to read config at {path:?}")
  })?;
  let replaced = apply_placeholder(&content, name);
  if replaced != content {
    std::fs::write(path, replaced).with_context(|| {
      format!("failed to write config to {path:?}")
    })?;
  }
  Ok(())
}
