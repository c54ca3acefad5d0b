//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the application layer uses
//! to interact with external systems. Implementations live in `kubernetes`.

mod cluster;
mod tunnel;

pub use cluster::ClusterClient;
pub use tunnel::{Tunnel, TunnelDialer};
