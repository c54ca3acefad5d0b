//! In-memory stand-ins for the cluster and the tunnel transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::domain::{ForwardSpec, ResourceKind};
use crate::error::{ForwardError, ForwardResult};
use crate::ports::{ClusterClient, Tunnel, TunnelDialer};

pub const NAMESPACE: &str = "backend";

/// Cluster with one namespace holding a fixed set of pods.
pub struct MockCluster {
    pods: Vec<String>,
    hang: bool,
    calls: AtomicUsize,
}

impl MockCluster {
    pub fn with_pods(pods: &[&str]) -> Self {
        Self {
            pods: pods.iter().map(|p| p.to_string()).collect(),
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A cluster whose resolve never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::with_pods(&[])
        }
    }

    /// Number of cluster round-trips made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_namespace(&self, namespace: &str) -> ForwardResult<()> {
        if namespace == NAMESPACE {
            Ok(())
        } else {
            Err(ForwardError::NamespaceNotFound(namespace.to_string()))
        }
    }
}

impl ClusterClient for MockCluster {
    async fn list_namespaces(&self) -> ForwardResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["default".to_string(), NAMESPACE.to_string()])
    }

    async fn list_resources(
        &self,
        namespace: &str,
        kind: ResourceKind,
    ) -> ForwardResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_namespace(namespace)?;
        match kind {
            ResourceKind::Pod => {
                let mut pods = self.pods.clone();
                pods.sort();
                Ok(pods)
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn resolve(&self, namespace: &str, kind: ResourceKind, name: &str) -> ForwardResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.check_namespace(namespace)?;
        if kind == ResourceKind::Pod && self.pods.iter().any(|p| p == name) {
            Ok(())
        } else {
            Err(ForwardError::ResourceNotFound(format!(
                "{}/{}",
                kind.target_prefix(),
                name
            )))
        }
    }
}

/// Dialer whose tunnels stay open until the test closes them.
pub struct MockDialer {
    fail: Option<ForwardError>,
    dials: AtomicUsize,
    shutdowns: Arc<AtomicUsize>,
    open: Mutex<Vec<(String, oneshot::Sender<ForwardResult<()>>)>>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self {
            fail: None,
            dials: AtomicUsize::new(0),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            open: Mutex::new(Vec::new()),
        }
    }

    /// A dialer that refuses every tunnel with `error`.
    pub fn failing(error: ForwardError) -> Self {
        Self {
            fail: Some(error),
            ..Self::new()
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Ends the oldest open tunnel to `resource_name` as if the transport
    /// finished with `result`.
    pub fn close_tunnel(&self, resource_name: &str, result: ForwardResult<()>) {
        let mut open = self.open.lock();
        let index = open
            .iter()
            .position(|(name, _)| name == resource_name)
            .expect("no open tunnel for resource");
        let (_, closer) = open.remove(index);
        let _ = closer.send(result);
    }
}

impl TunnelDialer for MockDialer {
    type Tunnel = MockTunnel;

    async fn dial(&self, spec: &ForwardSpec) -> ForwardResult<MockTunnel> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.fail {
            return Err(error.clone());
        }

        let (closer, closed) = oneshot::channel();
        self.open.lock().push((spec.resource_name.clone(), closer));
        Ok(MockTunnel {
            closed,
            shutdowns: self.shutdowns.clone(),
        })
    }
}

pub struct MockTunnel {
    closed: oneshot::Receiver<ForwardResult<()>>,
    shutdowns: Arc<AtomicUsize>,
}

impl Tunnel for MockTunnel {
    async fn closed(&mut self) -> ForwardResult<()> {
        match (&mut self.closed).await {
            Ok(result) => result,
            // Closer dropped with the dialer: the tunnel just stays up
            Err(_) => std::future::pending().await,
        }
    }

    async fn shutdown(self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
