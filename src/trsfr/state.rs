use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::Notify;
use tokio::task::AbortHandle;

pub type SessionId = u64;

struct SessionEntry {
    peer: String,
    started: Instant,
    abort: Option<AbortHandle>,
}

/// Live relay bookkeeping, shared between the accept loop and every relay
/// task. Only used to coordinate shutdown.
#[derive(Default)]
pub struct ProxyState {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    next_id: AtomicU64,
    idle: Notify,
}

/// Deregisters its session when dropped, whether the relay finished, failed,
/// panicked or was aborted.
pub struct SessionGuard {
    id: SessionId,
    state: Arc<ProxyState>,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.remove(self.id);
    }
}

impl ProxyState {
    pub fn new() -> Arc<Self> {
        Arc::new(ProxyState::default())
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(self: &Arc<Self>, peer: String) -> SessionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions().insert(
            id,
            SessionEntry {
                peer,
                started: Instant::now(),
                abort: None,
            },
        );
        SessionGuard {
            id,
            state: Arc::clone(self),
        }
    }

    /// Attaches the task handle used to force-close the session. A session
    /// that already finished is left alone.
    pub fn attach(&self, id: SessionId, abort: AbortHandle) {
        if let Some(entry) = self.sessions().get_mut(&id) {
            entry.abort = Some(abort);
        }
    }

    fn remove(&self, id: SessionId) {
        let mut sessions = self.sessions();
        if let Some(entry) = sessions.remove(&id) {
            debug!(
                "Session {} from {} released after {:?}",
                id,
                entry.peer,
                entry.started.elapsed()
            );
        }
        if sessions.is_empty() {
            self.idle.notify_waiters();
        }
    }

    pub fn active(&self) -> usize {
        self.sessions().len()
    }

    /// Session ids and peers still running.
    pub fn snapshot(&self) -> Vec<(SessionId, String)> {
        let mut live: Vec<_> = self
            .sessions()
            .iter()
            .map(|(id, entry)| (*id, entry.peer.clone()))
            .collect();
        live.sort_unstable_by_key(|(id, _)| *id);
        live
    }

    /// Aborts every live session task and returns how many were signalled.
    pub fn abort_all(&self) -> usize {
        let handles: Vec<AbortHandle> = self
            .sessions()
            .values_mut()
            .filter_map(|entry| entry.abort.take())
            .collect();
        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}
