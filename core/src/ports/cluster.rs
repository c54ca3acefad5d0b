//! Cluster resource client port (interface).

use crate::domain::ResourceKind;
use crate::error::ForwardResult;

/// Port for read-only queries against the cluster control plane.
///
/// Implementations hold no per-call mutable state and may be called
/// concurrently. Nothing is cached: a name returned by a listing may be gone
/// by the time a session tries to resolve it.
pub trait ClusterClient: Send + Sync + 'static {
    /// List all namespace names.
    fn list_namespaces(
        &self,
    ) -> impl std::future::Future<Output = ForwardResult<Vec<String>>> + Send;

    /// List the names of objects of `kind` in `namespace`.
    ///
    /// Fails with `NamespaceNotFound` when the namespace does not exist.
    fn list_resources(
        &self,
        namespace: &str,
        kind: ResourceKind,
    ) -> impl std::future::Future<Output = ForwardResult<Vec<String>>> + Send;

    /// Confirm that one named object exists.
    ///
    /// Fails with `ResourceNotFound` or `NamespaceNotFound` when it does not.
    fn resolve(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> impl std::future::Future<Output = ForwardResult<()>> + Send;
}
