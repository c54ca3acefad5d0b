//! Forward specification and row identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resource::{ResourceKind, ResourceRef};
use crate::error::{ForwardError, ForwardResult};

/// Identity of one presentation row; the registry key for its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(Uuid);

impl RowId {
    /// Allocates a fresh, process-unique row id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RowId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First block of the UUID is enough to tell rows apart in logs.
        let s = self.0.to_string();
        f.write_str(&s[..8])
    }
}

/// What to forward: one local port to one port of a named cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardSpec {
    pub namespace: String,
    pub kind: ResourceKind,
    pub resource_name: String,
    pub local_port: u16,
    pub remote_port: u16,
}

impl ForwardSpec {
    /// Creates a spec without validating it; see [`ForwardSpec::validate`].
    pub fn new(
        namespace: impl Into<String>,
        kind: ResourceKind,
        resource_name: impl Into<String>,
        local_port: u16,
        remote_port: u16,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            resource_name: resource_name.into(),
            local_port,
            remote_port,
        }
    }

    /// Builds a spec from raw port numbers as typed by a user.
    ///
    /// Values outside `1..=65535` are rejected with `InvalidSpec`.
    pub fn from_raw_ports(
        namespace: impl Into<String>,
        kind: ResourceKind,
        resource_name: impl Into<String>,
        local_port: u32,
        remote_port: u32,
    ) -> ForwardResult<Self> {
        let spec = Self::new(
            namespace,
            kind,
            resource_name,
            checked_port("local", local_port)?,
            checked_port("remote", remote_port)?,
        );
        spec.validate()?;
        Ok(spec)
    }

    /// Checks the invariants that can be verified without the cluster.
    pub fn validate(&self) -> ForwardResult<()> {
        if self.namespace.trim().is_empty() {
            return Err(ForwardError::InvalidSpec("namespace is empty".to_string()));
        }
        if self.resource_name.trim().is_empty() {
            return Err(ForwardError::InvalidSpec("resource name is empty".to_string()));
        }
        checked_port("local", u32::from(self.local_port))?;
        checked_port("remote", u32::from(self.remote_port))?;
        Ok(())
    }

    /// `kubectl port-forward` target, e.g. `pod/user-rpc-1`.
    pub fn target(&self) -> String {
        ResourceRef::new(self.kind, self.resource_name.clone()).to_string()
    }

    /// Human readable label used in notifications.
    pub fn describe(&self) -> String {
        format!(
            "{}/{} {}:{}",
            self.namespace,
            self.target(),
            self.local_port,
            self.remote_port
        )
    }
}

fn checked_port(which: &str, port: u32) -> ForwardResult<u16> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ForwardError::InvalidSpec(format!(
            "{} port {} is outside 1-65535",
            which, port
        ))),
    }
}

/// Parses a port typed into an entry field. Only ASCII digits are accepted.
pub fn parse_port(text: &str) -> ForwardResult<u16> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ForwardError::InvalidSpec(format!("'{}' is not a port", text)));
    }
    let value: u32 = text
        .parse()
        .map_err(|_| ForwardError::InvalidSpec(format!("'{}' is not a port", text)))?;
    checked_port("entered", value)
}

/// Parses `local:remote`, or a single port used for both sides.
pub fn parse_port_pair(text: &str) -> ForwardResult<(u16, u16)> {
    match text.split_once(':') {
        Some((local, remote)) => Ok((parse_port(local)?, parse_port(remote)?)),
        None => {
            let port = parse_port(text)?;
            Ok((port, port))
        }
    }
}
