//! Application layer - session management.
//!
//! Sessions, the registry that owns them and the bridge they report through.
//! Everything here talks to the cluster and the tunnel transport only through
//! the traits in [`crate::ports`].

pub mod bridge;
mod registry;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{channel, BridgeClosed, Publisher, Subscriber, DEFAULT_HIGH_WATER};
pub use registry::SessionRegistry;
pub use session::{wait_terminal, ForwardSession, SessionDeps, SessionTimeouts};
