//! Row id to session map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::debug;

use super::bridge::Publisher;
use super::session::{wait_terminal, ForwardSession, SessionDeps, SessionTimeouts};
use crate::domain::{ForwardSpec, RowId, SessionState};
use crate::error::{ForwardError, ForwardResult};
use crate::ports::{ClusterClient, TunnelDialer};

/// A registered session and the start that created it.
struct Entry {
    generation: u64,
    session: ForwardSession,
}

type SessionMap = Arc<Mutex<HashMap<RowId, Entry>>>;

/// Holds at most one live session per row.
///
/// Every map mutation happens under one lock, which serializes start, stop
/// and remove for the same row. None of the operations wait for the network;
/// they are safe to call from the presentation thread.
///
/// A session leaves the map shortly after it reaches a terminal state, whether
/// it was stopped or ended on its own.
pub struct SessionRegistry<C: ClusterClient, D: TunnelDialer> {
    sessions: SessionMap,
    generation: AtomicU64,
    deps: SessionDeps<C, D>,
    runtime: Handle,
}

impl<C: ClusterClient, D: TunnelDialer> SessionRegistry<C, D> {
    /// Create a registry whose sessions run on `runtime`.
    pub fn new(
        client: Arc<C>,
        dialer: Arc<D>,
        publisher: Publisher,
        timeouts: SessionTimeouts,
        runtime: Handle,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            deps: SessionDeps {
                client,
                dialer,
                publisher,
                timeouts,
            },
            runtime,
        }
    }

    /// Start forwarding for `id`.
    ///
    /// Fails with `AlreadyRunning` while a previous session for the row has
    /// not reached a terminal state, and with `InvalidSpec` before any network
    /// call. A finished session for the row is replaced.
    pub fn start(&self, id: RowId, spec: ForwardSpec) -> ForwardResult<()> {
        let mut sessions = self.sessions.lock();

        if let Some(existing) = sessions.get(&id) {
            if !existing.session.is_terminal() {
                return Err(ForwardError::AlreadyRunning(id));
            }
        }

        let session = ForwardSession::start(id, spec, self.deps.clone(), &self.runtime)?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let state = session.subscribe();
        sessions.insert(id, Entry { generation, session });

        let map = Arc::clone(&self.sessions);
        self.runtime.spawn(async move {
            wait_terminal(state).await;
            reap(&map, id, generation);
        });
        Ok(())
    }

    /// Request the session for `id` to stop.
    ///
    /// Returns once cancellation is requested; the terminal event follows on
    /// the bridge and the row is then dropped from the map. Stopping a row
    /// that is already stopping is a no-op.
    pub fn stop(&self, id: RowId) -> ForwardResult<()> {
        let mut sessions = self.sessions.lock();

        match sessions.get(&id).map(|entry| &entry.session) {
            None => Err(ForwardError::NotRunning(id)),
            Some(session) if session.is_terminal() => {
                sessions.remove(&id);
                Err(ForwardError::NotRunning(id))
            }
            Some(session) => {
                if !session.is_stopping() {
                    debug!(row = %id, "stop requested");
                }
                session.stop();
                Ok(())
            }
        }
    }

    /// Stop the session for `id` and wait for its terminal state.
    pub async fn stop_and_wait(&self, id: RowId) -> ForwardResult<SessionState> {
        let state = {
            let sessions = self.sessions.lock();
            let entry = sessions.get(&id).ok_or(ForwardError::NotRunning(id))?;
            entry.session.stop();
            entry.session.subscribe()
        };

        Ok(wait_terminal(state).await)
    }

    /// Forget the row `id`, stopping its session first if it is live.
    pub fn remove(&self, id: RowId) -> ForwardResult<()> {
        let entry = self
            .sessions
            .lock()
            .remove(&id)
            .ok_or(ForwardError::NotRunning(id))?;

        // The worker keeps running until it has shut the tunnel down
        entry.session.stop();
        debug!(row = %id, "row removed");
        Ok(())
    }

    /// Current state of the session for `id`, if one is registered.
    pub fn state(&self, id: RowId) -> Option<SessionState> {
        self.sessions.lock().get(&id).map(|entry| entry.session.state())
    }

    /// Rows whose session is connecting or active.
    pub fn active_rows(&self) -> Vec<RowId> {
        let mut rows: Vec<RowId> = self
            .sessions
            .lock()
            .values()
            .filter(|entry| !entry.session.is_terminal())
            .map(|entry| entry.session.id())
            .collect();
        rows.sort();
        rows
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Stop every session and wait for all workers to exit.
    pub async fn shutdown(&self) {
        let sessions: Vec<ForwardSession> = self
            .sessions
            .lock()
            .drain()
            .map(|(_, entry)| entry.session)
            .collect();
        if sessions.is_empty() {
            return;
        }

        debug!(count = sessions.len(), "shutting down forward sessions");
        for session in &sessions {
            session.stop();
        }
        for session in sessions {
            session.join().await;
        }
    }
}

/// Drops the entry for `id` if it still belongs to the start `generation`.
fn reap(sessions: &Mutex<HashMap<RowId, Entry>>, id: RowId, generation: u64) {
    let mut sessions = sessions.lock();
    if sessions
        .get(&id)
        .is_some_and(|entry| entry.generation == generation)
    {
        sessions.remove(&id);
        debug!(row = %id, "finished session reaped");
    }
}
