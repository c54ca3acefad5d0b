//! One forward session: resolve the target, open the tunnel, wait for it to
//! end or for a stop request.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bridge::Publisher;
use crate::config::Settings;
use crate::domain::{ForwardSpec, RowId, SessionEvent, SessionOutcome, SessionState};
use crate::error::{ForwardError, ForwardResult};
use crate::ports::{ClusterClient, Tunnel, TunnelDialer};

/// Bounds on the two connecting steps of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub resolve: Duration,
    pub dial: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl SessionTimeouts {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            resolve: settings.resolve_timeout(),
            dial: settings.dial_timeout(),
        }
    }
}

/// Everything a session worker needs besides its own spec.
pub struct SessionDeps<C, D> {
    pub client: Arc<C>,
    pub dialer: Arc<D>,
    pub publisher: Publisher,
    pub timeouts: SessionTimeouts,
}

impl<C, D> Clone for SessionDeps<C, D> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            dialer: self.dialer.clone(),
            publisher: self.publisher.clone(),
            timeouts: self.timeouts,
        }
    }
}

/// Handle to a running (or finished) session.
///
/// The state is written only by the worker task; this handle reads it and
/// can request cancellation.
pub struct ForwardSession {
    id: RowId,
    spec: ForwardSpec,
    state: watch::Receiver<SessionState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ForwardSession {
    /// Validates `spec` and spawns the worker on `runtime`.
    ///
    /// An invalid spec is rejected here, before anything touches the cluster.
    /// On success the session is already `Connecting`.
    pub fn start<C, D>(
        id: RowId,
        spec: ForwardSpec,
        deps: SessionDeps<C, D>,
        runtime: &Handle,
    ) -> ForwardResult<Self>
    where
        C: ClusterClient,
        D: TunnelDialer,
    {
        spec.validate()?;

        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let cancel = CancellationToken::new();

        debug!(row = %id, target = %spec.describe(), "starting forward session");
        let task = runtime.spawn(run(id, spec.clone(), deps, state_tx, cancel.clone()));

        Ok(Self {
            id,
            spec,
            state: state_rx,
            cancel,
            task,
        })
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn spec(&self) -> &ForwardSpec {
        &self.spec
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    /// True once a stop was requested, even if the worker is still cleaning up.
    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Requests cancellation. No-op for a terminal session or a repeated stop.
    pub fn stop(&self) {
        if !self.is_terminal() {
            self.cancel.cancel();
        }
    }

    /// A receiver that observes every state change of this session.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Waits for the worker task to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(row = %self.id, error = %e, "forward session task failed");
        }
    }
}

/// Waits until `state` reaches Stopped or Failed and returns it.
pub async fn wait_terminal(mut state: watch::Receiver<SessionState>) -> SessionState {
    let terminal = match state.wait_for(SessionState::is_terminal).await {
        Ok(terminal) => Some(terminal.clone()),
        Err(_) => None,
    };
    // The worker always settles before dropping the sender
    terminal.unwrap_or_else(|| state.borrow().clone())
}

/// Worker body. The single exit path guarantees exactly one terminal event.
async fn run<C, D>(
    id: RowId,
    spec: ForwardSpec,
    deps: SessionDeps<C, D>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
) where
    C: ClusterClient,
    D: TunnelDialer,
{
    let outcome = forward(id, &spec, &deps, &state, &cancel).await;

    match &outcome {
        SessionOutcome::Failed(reason) => {
            warn!(row = %id, target = %spec.describe(), error = %reason, "forward failed")
        }
        _ => info!(row = %id, target = %spec.describe(), outcome = ?outcome, "forward ended"),
    }

    settle(id, &state, &deps.publisher, outcome);
}

async fn forward<C, D>(
    id: RowId,
    spec: &ForwardSpec,
    deps: &SessionDeps<C, D>,
    state: &watch::Sender<SessionState>,
    cancel: &CancellationToken,
) -> SessionOutcome
where
    C: ClusterClient,
    D: TunnelDialer,
{
    let resolved = tokio::select! {
        biased;
        _ = cancel.cancelled() => return SessionOutcome::StoppedByUser,
        result = timeout(
            deps.timeouts.resolve,
            deps.client.resolve(&spec.namespace, spec.kind, &spec.resource_name),
        ) => result,
    };
    match resolved {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return SessionOutcome::Failed(e),
        Err(_) => return SessionOutcome::Failed(ForwardError::Timeout),
    }

    // Dropping an unfinished dial drops its transport, which must clean up
    let dialed = tokio::select! {
        biased;
        _ = cancel.cancelled() => return SessionOutcome::StoppedByUser,
        result = timeout(deps.timeouts.dial, deps.dialer.dial(spec)) => result,
    };
    let mut tunnel = match dialed {
        Ok(Ok(tunnel)) => tunnel,
        Ok(Err(e)) => return SessionOutcome::Failed(e),
        Err(_) => return SessionOutcome::Failed(ForwardError::Timeout),
    };

    settle(id, state, &deps.publisher, SessionOutcome::Started);
    info!(
        row = %id,
        target = %spec.describe(),
        local_port = spec.local_port,
        "forwarding"
    );

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => SessionOutcome::StoppedByUser,
        result = tunnel.closed() => match result {
            Ok(()) => SessionOutcome::Closed,
            Err(e) => SessionOutcome::Failed(e),
        },
    };

    tunnel.shutdown().await;
    outcome
}

/// Records the state for `outcome` and publishes its event under the state
/// lock, so a reader that has seen the event also sees the state.
fn settle(
    id: RowId,
    state: &watch::Sender<SessionState>,
    publisher: &Publisher,
    outcome: SessionOutcome,
) {
    state.send_modify(|current| {
        *current = outcome.resulting_state();
        if publisher.publish(SessionEvent::new(id, outcome)).is_err() {
            debug!(row = %id, "bridge closed, session event dropped");
        }
    });
}
