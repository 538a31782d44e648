use std::{path::PathBuf, sync::OnceLock, time::Duration};

use anyhow::Context;
use ferry_client::entities::{
  config::{CoreConfig, Env},
  logger::LogConfig,
};

pub fn core_config() -> &'static CoreConfig {
  static CORE_CONFIG: OnceLock<CoreConfig> = OnceLock::new();
  CORE_CONFIG.get_or_init(|| {
    let env: Env = match envy::from_env()
      .context("Failed to parse Ferry Core environment")
    {
      Ok(env) => env,
      Err(e) => {
        panic!("{e:?}");
      }
    };
    let config = CoreConfig::default();

    // Recreating CoreConfig here makes sure all env overrides are applied.
    CoreConfig {
      port: env.ferry_port.unwrap_or(config.port),
      bind_ip: env.ferry_bind_ip.unwrap_or(config.bind_ip),
      data_dir: env.ferry_data_dir.unwrap_or(config.data_dir),
      task_timeout_secs: env
        .ferry_task_timeout_secs
        .unwrap_or(config.task_timeout_secs),
      subscriber_queue_size: env
        .ferry_subscriber_queue_size
        .unwrap_or(config.subscriber_queue_size),
      session_retention_secs: env
        .ferry_session_retention_secs
        .unwrap_or(config.session_retention_secs),
      daily_retention_days: env
        .ferry_daily_retention_days
        .unwrap_or(config.daily_retention_days),
      archive_retention_days: env
        .ferry_archive_retention_days
        .unwrap_or(config.archive_retention_days),
      logging: LogConfig {
        level: env
          .ferry_logging_level
          .unwrap_or(config.logging.level),
        stdio: env
          .ferry_logging_stdio
          .unwrap_or(config.logging.stdio),
        pretty: env
          .ferry_logging_pretty
          .unwrap_or(config.logging.pretty),
        otlp_endpoint: env
          .ferry_logging_otlp_endpoint
          .unwrap_or(config.logging.otlp_endpoint),
        opentelemetry_service_name: env
          .ferry_logging_opentelemetry_service_name
          .unwrap_or(config.logging.opentelemetry_service_name),
      },
    }
  })
}

pub fn data_dir() -> PathBuf {
  PathBuf::from(&core_config().data_dir)
}

pub fn task_timeout() -> Duration {
  Duration::from_secs(core_config().task_timeout_secs)
}

pub fn session_retention() -> Duration {
  Duration::from_secs(core_config().session_retention_secs)
}
