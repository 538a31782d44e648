use std::{
  collections::HashMap,
  sync::{Arc, Mutex, RwLock},
  time::Duration,
};

use ferry_client::{
  entities::{status::TaskStatus, task::Task, user::AuthContext},
  unix_timestamp_ms,
};
use indexmap::IndexMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Live state of one executing batch: the ordered status vector and
/// the subscriber registry. Exactly one executor writes; subscribers
/// come and go concurrently.
pub struct TaskSession {
  pub id: String,
  pub user: AuthContext,
  pub started_at: i64,
  inner: Mutex<SessionInner>,
}

struct SessionInner {
  statuses: Vec<TaskStatus>,
  subscribers: HashMap<u64, mpsc::Sender<TaskStatus>>,
  next_subscriber_id: u64,
  ended_at: Option<i64>,
}

impl TaskSession {
  /// Snapshot of the status vector in index order.
  pub fn statuses(&self) -> Vec<TaskStatus> {
    self.inner.lock().unwrap().statuses.clone()
  }
}

/// One stream subscription. Dropping it (the SSE connection went
/// away) removes the queue from the session.
pub struct Subscriber {
  subscriber_id: u64,
  session: Arc<TaskSession>,
  pub receiver: mpsc::Receiver<TaskStatus>,
}

impl Drop for Subscriber {
  fn drop(&mut self) {
    self
      .session
      .inner
      .lock()
      .unwrap()
      .subscribers
      .remove(&self.subscriber_id);
  }
}

/// Process-wide registry of live sessions, keyed by session id in
/// creation order.
pub struct SessionManager {
  sessions: RwLock<IndexMap<String, Arc<TaskSession>>>,
  queue_size: usize,
}

impl SessionManager {
  pub fn new(queue_size: usize) -> SessionManager {
    SessionManager {
      sessions: Default::default(),
      queue_size: queue_size.max(1),
    }
  }

  /// Allocate a session with every task `pending` and register it.
  pub fn create(
    &self,
    user: AuthContext,
    tasks: &[Task],
  ) -> Arc<TaskSession> {
    let id = Uuid::new_v4().to_string();
    let statuses = tasks
      .iter()
      .enumerate()
      .map(|(index, task)| TaskStatus::init(index, task))
      .collect();
    let session = Arc::new(TaskSession {
      id: id.clone(),
      user,
      started_at: unix_timestamp_ms(),
      inner: Mutex::new(SessionInner {
        statuses,
        subscribers: HashMap::new(),
        next_subscriber_id: 0,
        ended_at: None,
      }),
    });
    self
      .sessions
      .write()
      .unwrap()
      .insert(id, session.clone());
    session
  }

  pub fn get(&self, session_id: &str) -> Option<Arc<TaskSession>> {
    self.sessions.read().unwrap().get(session_id).cloned()
  }

  /// Update one slot of the status vector and broadcast the new
  /// status to every subscriber. Sends are non blocking; a full
  /// queue drops the update for that subscriber only.
  pub fn publish(&self, session_id: &str, status: TaskStatus) {
    let Some(session) = self.get(session_id) else {
      debug!("publish on unknown session {session_id}");
      return;
    };
    let mut inner = session.inner.lock().unwrap();
    if inner.ended_at.is_some() {
      debug!("dropping status update for ended session {session_id}");
      return;
    }
    let Some(slot) = inner.statuses.get_mut(status.index) else {
      warn!(
        "publish with out of range index {} on session {session_id}",
        status.index
      );
      return;
    };
    if slot.status.is_terminal() {
      // Terminal states are final.
      debug!(
        "dropping status update for finished task {} on session {session_id}",
        status.index
      );
      return;
    }
    *slot = status.clone();
    for sender in inner.subscribers.values() {
      // Liveness over completeness: a slow consumer misses updates.
      let _ = sender.try_send(status.clone());
    }
  }

  /// Register a subscriber queue and replay the current vector into
  /// it, in index order, before any further update can interleave.
  pub fn subscribe(&self, session_id: &str) -> Option<Subscriber> {
    let session = self.get(session_id)?;
    let (sender, receiver) = mpsc::channel(self.queue_size);
    let mut inner = session.inner.lock().unwrap();
    for status in &inner.statuses {
      let _ = sender.try_send(status.clone());
    }
    let subscriber_id = inner.next_subscriber_id;
    inner.next_subscriber_id += 1;
    inner.subscribers.insert(subscriber_id, sender);
    drop(inner);
    Some(Subscriber {
      subscriber_id,
      session,
      receiver,
    })
  }

  /// Stamp the session end. Subscribers stay attached until GC.
  pub fn mark_ended(&self, session_id: &str) {
    if let Some(session) = self.get(session_id) {
      session.inner.lock().unwrap().ended_at =
        Some(unix_timestamp_ms());
    }
  }

  /// Evict the session. Dropping the registered senders closes
  /// every subscriber queue, which ends their streams.
  pub fn remove(&self, session_id: &str) {
    let session =
      self.sessions.write().unwrap().shift_remove(session_id);
    if let Some(session) = session {
      session.inner.lock().unwrap().subscribers.clear();
    }
  }

  /// Evict the session `delay` after completion.
  pub fn spawn_gc(
    &'static self,
    session_id: String,
    delay: Duration,
  ) {
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      debug!("evicting session {session_id}");
      self.remove(&session_id);
    });
  }
}
