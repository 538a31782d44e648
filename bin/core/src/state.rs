use std::{
  path::PathBuf,
  sync::{Arc, OnceLock},
};

use store_client::{GraphStore, StoreClient};

use crate::{
  config::{core_config, data_dir, task_timeout},
  dispatch::Dispatcher,
  migration_log::MigrationLog,
  session::SessionManager,
};

pub fn session_manager() -> &'static SessionManager {
  static SESSION_MANAGER: OnceLock<SessionManager> = OnceLock::new();
  SESSION_MANAGER.get_or_init(|| {
    SessionManager::new(core_config().subscriber_queue_size)
  })
}

pub fn migration_log() -> &'static MigrationLog {
  static MIGRATION_LOG: OnceLock<MigrationLog> = OnceLock::new();
  MIGRATION_LOG.get_or_init(|| {
    MigrationLog::new(
      data_dir().join("migrations"),
      core_config().daily_retention_days,
      core_config().archive_retention_days,
    )
    .expect("failed to init migration log")
  })
}

pub fn dispatcher() -> &'static Dispatcher {
  static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();
  DISPATCHER.get_or_init(Dispatcher::default)
}

/// The backend adapter handle passed into every handler
/// invocation.
pub fn graph_store() -> &'static Arc<dyn GraphStore> {
  static GRAPH_STORE: OnceLock<Arc<dyn GraphStore>> =
    OnceLock::new();
  GRAPH_STORE
    .get_or_init(|| Arc::new(StoreClient::new(task_timeout())))
}

/// Staging area for uploads and handler temp files.
pub fn work_dir() -> &'static PathBuf {
  static WORK_DIR: OnceLock<PathBuf> = OnceLock::new();
  WORK_DIR.get_or_init(|| {
    let dir = data_dir().join("tmp");
    std::fs::create_dir_all(&dir)
      .expect("failed to create work dir");
    dir
  })
}
