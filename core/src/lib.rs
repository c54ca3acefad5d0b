//! kubeforward Core Library
//!
//! Session manager for Kubernetes port forwards. Provides functionality to:
//! - Discover namespaces and forwardable resources through kubectl
//! - Start, track and stop any number of independent forwards, one per row
//! - Deliver session and listing events to a single-threaded front end
//! - Manage user settings (kubectl location, kubeconfig, timeouts)
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data types and validation
//! - `ports`: Trait definitions for the cluster and the tunnel transport
//! - `kubernetes`: kubectl-backed implementations of those traits
//! - `application`: Sessions, the registry and the notification bridge
//! - `engine`: Runtime-owning facade for the presentation layer

// Hexagonal architecture layers
pub mod application;
pub mod domain;
pub mod kubernetes;
pub mod ports;

pub mod config;
pub mod engine;
pub mod error;

// Re-export domain types (primary API)
pub use domain::{
    parse_port, parse_port_pair, BridgeEvent, ForwardSpec, ListingEvent, ResourceKind,
    ResourceRef, RowId, SessionEvent, SessionOutcome, SessionState,
};

// Re-export other commonly used types
pub use application::{Publisher, SessionRegistry, SessionTimeouts, Subscriber};
pub use config::{Settings, SettingsStore};
pub use engine::ForwardEngine;
pub use error::{Error, ForwardError, ForwardResult, Result};
