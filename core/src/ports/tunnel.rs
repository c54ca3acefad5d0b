//! Tunnel transport port (interface).

use crate::domain::ForwardSpec;
use crate::error::ForwardResult;

/// Port for opening port-forward tunnels.
///
/// The byte-level forwarding is the implementation's business; sessions only
/// open a tunnel, wait for it to end, and shut it down.
pub trait TunnelDialer: Send + Sync + 'static {
    type Tunnel: Tunnel;

    /// Open a tunnel for `spec`. Resolves once the local port is listening.
    ///
    /// Dropping the returned future before it resolves must release anything
    /// it had acquired.
    fn dial(
        &self,
        spec: &ForwardSpec,
    ) -> impl std::future::Future<Output = ForwardResult<Self::Tunnel>> + Send;
}

/// An established tunnel.
pub trait Tunnel: Send + 'static {
    /// Wait until the transport ends on its own.
    ///
    /// `Ok(())` is a clean close; an error explains why it broke. Must be
    /// cancel-safe: it is raced against stop requests.
    fn closed(&mut self) -> impl std::future::Future<Output = ForwardResult<()>> + Send;

    /// Tear the tunnel down and release its resources.
    fn shutdown(self) -> impl std::future::Future<Output = ()> + Send;
}
