use serde::{Deserialize, Serialize};

/// Task-level error kinds, distinct and observable through both the
/// live stream and the persisted migration log.
#[derive(Debug, thiserror::Error)]
pub enum FerryError {
  /// Input rejected before dispatch. Never retried.
  #[error("Validation failed: field '{field}': {message}")]
  Validation { field: String, message: String },

  /// A repository or graph referenced by the task does not exist
  /// on the named endpoint.
  #[error("{kind} '{identifier}' not found")]
  NotFound { kind: String, identifier: String },

  /// Create / rename into a name that already exists.
  #[error("{kind} '{identifier}' already exists")]
  Conflict { kind: String, identifier: String },

  /// Wraps a backend adapter failure, carrying the underlying error.
  #[error("{operation} failed: {message}")]
  Operation {
    operation: String,
    message: String,
    cause: Option<anyhow::Error>,
  },
}

impl FerryError {
  pub fn validation(
    field: impl Into<String>,
    message: impl Into<String>,
  ) -> FerryError {
    FerryError::Validation {
      field: field.into(),
      message: message.into(),
    }
  }

  pub fn not_found(
    kind: impl Into<String>,
    identifier: impl Into<String>,
  ) -> FerryError {
    FerryError::NotFound {
      kind: kind.into(),
      identifier: identifier.into(),
    }
  }

  pub fn conflict(
    kind: impl Into<String>,
    identifier: impl Into<String>,
  ) -> FerryError {
    FerryError::Conflict {
      kind: kind.into(),
      identifier: identifier.into(),
    }
  }

  pub fn operation(
    operation: impl Into<String>,
    message: impl Into<String>,
  ) -> FerryError {
    FerryError::Operation {
      operation: operation.into(),
      message: message.into(),
      cause: None,
    }
  }

  pub fn operation_with(
    operation: impl Into<String>,
    cause: anyhow::Error,
  ) -> FerryError {
    FerryError::Operation {
      operation: operation.into(),
      message: format!("{cause:#}"),
      cause: Some(cause),
    }
  }

  /// The `errorType` recorded on the matching PersistedTask.
  pub fn error_type(&self) -> ErrorType {
    match self {
      FerryError::Validation { .. } => ErrorType::ValidationError,
      _ => ErrorType::ExecutionError,
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorType {
  ValidationError,
  ExecutionError,
  Timeout,
}
