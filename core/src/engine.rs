//! Forward engine - the entry point for the presentation layer.
//!
//! Owns the async runtime, the cluster client, the session registry and the
//! publishing side of the notification bridge. Every method is synchronous:
//! quick ones return immediately, the `fetch_*` ones block the calling thread
//! and are meant for one-shot CLI commands. A UI thread should use the
//! `request_*` variants and read results from the bridge instead.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::application::{channel, Publisher, SessionRegistry, SessionTimeouts, Subscriber};
use crate::config::Settings;
use crate::domain::{ForwardSpec, ListingEvent, ResourceKind, RowId, SessionState};
use crate::error::{ForwardResult, Result};
use crate::kubernetes::{ClusterContext, KubectlClient, KubectlDialer};
use crate::ports::{ClusterClient, TunnelDialer};

/// The forward engine.
///
/// Generic over the cluster client and tunnel dialer so tests can run it
/// against in-memory doubles; the defaults drive kubectl.
pub struct ForwardEngine<C: ClusterClient = KubectlClient, D: TunnelDialer = KubectlDialer> {
    runtime: Runtime,
    settings: Settings,
    client: Arc<C>,
    registry: Arc<SessionRegistry<C, D>>,
    publisher: Publisher,
}

impl ForwardEngine {
    /// Create an engine with its own multi-threaded runtime.
    ///
    /// Fails when no kubectl binary can be found.
    pub fn new(settings: Settings) -> Result<(Self, Subscriber)> {
        Self::with_runtime(build_runtime()?, settings)
    }

    /// Create an engine on an existing runtime.
    pub fn with_runtime(runtime: Runtime, settings: Settings) -> Result<(Self, Subscriber)> {
        let context = ClusterContext::from_settings(&settings)?;
        info!(
            kubectl = %context.kubectl_path().display(),
            kubeconfig = ?context.kubeconfig(),
            "using kubectl"
        );

        let client = KubectlClient::new(context.clone());
        let dialer = KubectlDialer::new(context).with_bind_address(settings.bind_address.clone());
        Ok(Self::from_parts(runtime, settings, client, dialer))
    }
}

impl<C: ClusterClient, D: TunnelDialer> ForwardEngine<C, D> {
    /// Assemble an engine from explicit parts.
    pub fn from_parts(runtime: Runtime, settings: Settings, client: C, dialer: D) -> (Self, Subscriber) {
        let (publisher, subscriber) = channel(settings.event_high_water);
        let client = Arc::new(client);
        let registry = Arc::new(SessionRegistry::new(
            client.clone(),
            Arc::new(dialer),
            publisher.clone(),
            SessionTimeouts::from_settings(&settings),
            runtime.handle().clone(),
        ));

        let engine = Self {
            runtime,
            settings,
            client,
            registry,
            publisher,
        };
        (engine, subscriber)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<C, D>> {
        &self.registry
    }

    /// Another publishing handle onto the bridge.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// List namespaces, blocking the calling thread.
    pub fn fetch_namespaces(&self) -> ForwardResult<Vec<String>> {
        self.runtime.block_on(self.client.list_namespaces())
    }

    /// List resources of `kind` in `namespace`, blocking the calling thread.
    pub fn fetch_resources(&self, namespace: &str, kind: ResourceKind) -> ForwardResult<Vec<String>> {
        self.runtime.block_on(self.client.list_resources(namespace, kind))
    }

    /// List namespaces in the background; the result arrives on the bridge.
    pub fn request_namespaces(&self) {
        let client = self.client.clone();
        let publisher = self.publisher.clone();
        self.runtime.spawn(async move {
            let result = client.list_namespaces().await;
            if publisher.publish(ListingEvent::Namespaces(result)).is_err() {
                debug!("bridge closed, namespace listing dropped");
            }
        });
    }

    /// List resources in the background; the result arrives on the bridge.
    pub fn request_resources(&self, namespace: impl Into<String>, kind: ResourceKind) {
        let namespace = namespace.into();
        let client = self.client.clone();
        let publisher = self.publisher.clone();
        self.runtime.spawn(async move {
            let result = client.list_resources(&namespace, kind).await;
            let event = ListingEvent::Resources {
                namespace,
                kind,
                result,
            };
            if publisher.publish(event).is_err() {
                debug!("bridge closed, resource listing dropped");
            }
        });
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub fn start(&self, id: RowId, spec: ForwardSpec) -> ForwardResult<()> {
        self.registry.start(id, spec)
    }

    pub fn stop(&self, id: RowId) -> ForwardResult<()> {
        self.registry.stop(id)
    }

    /// Stop a row and block until its session is terminal.
    pub fn stop_and_wait(&self, id: RowId) -> ForwardResult<SessionState> {
        self.runtime.block_on(self.registry.stop_and_wait(id))
    }

    pub fn remove(&self, id: RowId) -> ForwardResult<()> {
        self.registry.remove(id)
    }

    pub fn state(&self, id: RowId) -> Option<SessionState> {
        self.registry.state(id)
    }

    pub fn active_rows(&self) -> Vec<RowId> {
        self.registry.active_rows()
    }

    // ========================================================================
    // Runtime access
    // ========================================================================

    /// Run a task on the engine's runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// Run a future to completion on the engine's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Stop every session, wait for their tunnels to close, then close the
    /// bridge. The subscriber drains what is left and then sees the end.
    pub fn shutdown(&self) {
        self.runtime.block_on(self.registry.shutdown());
        self.publisher.close();
        info!("engine shut down");
    }
}

fn build_runtime() -> Result<Runtime> {
    let runtime = Builder::new_multi_thread()
        .thread_name("kubeforward-worker")
        .enable_all()
        .build()?;
    Ok(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::application::testing::{MockCluster, MockDialer};
    use crate::domain::{BridgeEvent, SessionEvent, SessionOutcome};
    use crate::error::ForwardError;

    fn engine(cluster: MockCluster) -> (ForwardEngine<MockCluster, MockDialer>, Subscriber) {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        ForwardEngine::from_parts(runtime, Settings::default(), cluster, MockDialer::new())
    }

    fn session_event(subscriber: &mut Subscriber) -> SessionEvent {
        match subscriber.blocking_recv() {
            Some(BridgeEvent::Session(event)) => event,
            other => panic!("expected a session event, got {:?}", other),
        }
    }

    #[test]
    fn test_fetch_resources() {
        let (engine, _subscriber) = engine(MockCluster::with_pods(&["b", "a"]));

        assert_eq!(
            engine.fetch_resources("backend", ResourceKind::Pod).unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            engine.fetch_resources("ghost", ResourceKind::Pod),
            Err(ForwardError::NamespaceNotFound("ghost".to_string()))
        );
        assert!(engine.fetch_namespaces().unwrap().contains(&"backend".to_string()));
    }

    #[test]
    fn test_request_resources_reports_on_bridge() {
        let (engine, mut subscriber) = engine(MockCluster::with_pods(&["api"]));

        engine.request_resources("backend", ResourceKind::Pod);
        match subscriber.blocking_recv() {
            Some(BridgeEvent::Listing(ListingEvent::Resources {
                namespace,
                kind,
                result,
            })) => {
                assert_eq!(namespace, "backend");
                assert_eq!(kind, ResourceKind::Pod);
                assert_eq!(result, Ok(vec!["api".to_string()]));
            }
            other => panic!("expected a resource listing, got {:?}", other),
        }

        engine.request_namespaces();
        assert!(matches!(
            subscriber.blocking_recv(),
            Some(BridgeEvent::Listing(ListingEvent::Namespaces(Ok(_))))
        ));
    }

    #[test]
    fn test_start_stop_and_shutdown() {
        let (engine, mut subscriber) = engine(MockCluster::with_pods(&["api"]));
        let row = RowId::new();
        let spec = ForwardSpec::new("backend", ResourceKind::Pod, "api", 8080, 80);

        engine.start(row, spec).unwrap();
        assert_eq!(session_event(&mut subscriber).outcome, SessionOutcome::Started);
        assert_eq!(engine.active_rows(), vec![row]);

        assert_eq!(engine.stop_and_wait(row), Ok(SessionState::Stopped));
        assert_eq!(
            session_event(&mut subscriber),
            SessionEvent::new(row, SessionOutcome::StoppedByUser)
        );

        engine.shutdown();
        assert_eq!(subscriber.blocking_recv(), None);
    }

    #[test]
    fn test_shutdown_stops_live_sessions() {
        let (engine, mut subscriber) = engine(MockCluster::with_pods(&["api"]));
        let spec = ForwardSpec::new("backend", ResourceKind::Pod, "api", 8080, 80);
        engine.start(RowId::new(), spec).unwrap();
        assert_eq!(session_event(&mut subscriber).outcome, SessionOutcome::Started);

        engine.shutdown();
        assert_eq!(
            session_event(&mut subscriber).outcome,
            SessionOutcome::StoppedByUser
        );
        assert_eq!(subscriber.blocking_recv(), None);
        assert!(engine.registry().is_empty());

        // Work submitted after shutdown never reaches the closed bridge
        engine.request_namespaces();
        engine.block_on(async { tokio::time::sleep(Duration::from_millis(20)).await });
        assert_eq!(subscriber.blocking_recv(), None);
    }
}
