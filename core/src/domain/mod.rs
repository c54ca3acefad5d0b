//! Domain layer - Pure business logic and data models.
//!
//! This module contains domain entities that represent core business concepts.
//! These types have no I/O dependencies and can be tested in isolation.

mod resource;
mod session;
mod spec;

// Re-export all domain types
pub use resource::{ResourceKind, ResourceRef};
pub use session::{BridgeEvent, ListingEvent, SessionEvent, SessionOutcome, SessionState};
pub use spec::{parse_port, parse_port_pair, ForwardSpec, RowId};
