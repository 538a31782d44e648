use serde::{Deserialize, Serialize};

/// [CoreConfig][config::CoreConfig] and its environment overrides.
pub mod config;
/// Subtypes of [LogConfig][logger::LogConfig].
pub mod logger;
/// Semantic (JSON-LD) surface grammar.
pub mod semantic;
/// Persisted [MigrationSession][session::MigrationSession] records.
pub mod session;
/// Live [TaskStatus][status::TaskStatus] stream payloads.
pub mod status;
/// The internal [Task][task::Task] model and the legacy grammar.
pub mod task;
/// [AuthContext][user::AuthContext] supplied by the auth middleware.
pub mod user;

pub type JsonValue = serde_json::Value;
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Remote triplestore endpoint coordinates. Supplied per-task,
/// never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
  pub url: String,
  pub username: String,
  pub password: String,
}

impl Endpoint {
  pub fn new(
    url: impl Into<String>,
    username: impl Into<String>,
    password: impl Into<String>,
  ) -> Endpoint {
    Endpoint {
      url: trim_trailing_slashes(url.into()),
      username: username.into(),
      password: password.into(),
    }
  }
}

/// Endpoint URLs are normalized by trimming trailing slashes.
pub fn trim_trailing_slashes(mut url: String) -> String {
  while url.ends_with('/') {
    url.pop();
  }
  url
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trims_any_number_of_trailing_slashes() {
    assert_eq!(
      trim_trailing_slashes("http://s:7200///".into()),
      "http://s:7200"
    );
    assert_eq!(
      trim_trailing_slashes("http://s:7200".into()),
      "http://s:7200"
    );
  }
}
