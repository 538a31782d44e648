use serde::{Deserialize, Serialize};

use crate::entities::logger::{LogConfig, LogLevel, StdioLogMode};

/// Ferry Core configuration, fully overridable from the
/// environment. See [Env] for the matching variable names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
  /// Port the server binds. Env: FERRY_PORT. Default: 8080
  #[serde(default = "default_port")]
  pub port: u16,

  /// IP the server binds. Env: FERRY_BIND_IP. Default: 0.0.0.0
  #[serde(default = "default_bind_ip")]
  pub bind_ip: String,

  /// Root of all durable state (migration log, upload staging).
  /// Env: FERRY_DATA_DIR. Default: ./data
  #[serde(default = "default_data_dir")]
  pub data_dir: String,

  /// Per-task execution deadline in seconds.
  /// Env: FERRY_TASK_TIMEOUT_SECS. Default: 600
  #[serde(default = "default_task_timeout_secs")]
  pub task_timeout_secs: u64,

  /// Capacity of each stream subscriber queue.
  /// Env: FERRY_SUBSCRIBER_QUEUE_SIZE. Default: 10
  #[serde(default = "default_subscriber_queue_size")]
  pub subscriber_queue_size: usize,

  /// How long a finished session stays subscribable before GC.
  /// Env: FERRY_SESSION_RETENTION_SECS. Default: 3600
  #[serde(default = "default_session_retention_secs")]
  pub session_retention_secs: u64,

  /// Days a daily summary stays unarchived.
  /// Env: FERRY_DAILY_RETENTION_DAYS. Default: 7
  #[serde(default = "default_daily_retention_days")]
  pub daily_retention_days: u64,

  /// Days a weekly archive is kept before deletion.
  /// Env: FERRY_ARCHIVE_RETENTION_DAYS. Default: 28
  #[serde(default = "default_archive_retention_days")]
  pub archive_retention_days: u64,

  /// Logging configuration. Env: FERRY_LOGGING_*
  #[serde(default)]
  pub logging: LogConfig,
}

fn default_port() -> u16 {
  8080
}

fn default_bind_ip() -> String {
  String::from("0.0.0.0")
}

fn default_data_dir() -> String {
  String::from("./data")
}

fn default_task_timeout_secs() -> u64 {
  600
}

fn default_subscriber_queue_size() -> usize {
  10
}

fn default_session_retention_secs() -> u64 {
  3600
}

fn default_daily_retention_days() -> u64 {
  7
}

fn default_archive_retention_days() -> u64 {
  28
}

impl Default for CoreConfig {
  fn default() -> Self {
    Self {
      port: default_port(),
      bind_ip: default_bind_ip(),
      data_dir: default_data_dir(),
      task_timeout_secs: default_task_timeout_secs(),
      subscriber_queue_size: default_subscriber_queue_size(),
      session_retention_secs: default_session_retention_secs(),
      daily_retention_days: default_daily_retention_days(),
      archive_retention_days: default_archive_retention_days(),
      logging: Default::default(),
    }
  }
}

/// Environment overrides, parsed with envy. Field names map onto
/// the upper-cased variable names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Env {
  pub ferry_port: Option<u16>,
  pub ferry_bind_ip: Option<String>,
  pub ferry_data_dir: Option<String>,
  pub ferry_task_timeout_secs: Option<u64>,
  pub ferry_subscriber_queue_size: Option<usize>,
  pub ferry_session_retention_secs: Option<u64>,
  pub ferry_daily_retention_days: Option<u64>,
  pub ferry_archive_retention_days: Option<u64>,

  pub ferry_logging_level: Option<LogLevel>,
  pub ferry_logging_stdio: Option<StdioLogMode>,
  pub ferry_logging_pretty: Option<bool>,
  pub ferry_logging_otlp_endpoint: Option<String>,
  pub ferry_logging_opentelemetry_service_name: Option<String>,
}
