//! Kubernetes adapters for discovery and port forwarding.
//!
//! This module provides:
//! - The cluster context (kubectl binary and connection flags)
//! - Namespace and resource discovery via `kubectl get`
//! - Tunnels via `kubectl port-forward` child processes

pub mod context;
pub mod discovery;
pub mod models;
pub mod tunnel;

// Re-export commonly used types
pub use context::ClusterContext;
pub use discovery::KubectlClient;
pub use tunnel::{KubectlDialer, KubectlTunnel};
