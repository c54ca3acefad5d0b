//! Forwardable Kubernetes resource kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ForwardError;

/// Kind of object a port forward can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[default]
    Pod,
    Deployment,
    ReplicaSet,
    Service,
}

impl ResourceKind {
    /// All kinds, in the order the UI offers them.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Pod,
        ResourceKind::Deployment,
        ResourceKind::ReplicaSet,
        ResourceKind::Service,
    ];

    /// Resource name used with `kubectl get`.
    pub fn list_name(&self) -> &'static str {
        match self {
            Self::Pod => "pods",
            Self::Deployment => "deployments",
            Self::ReplicaSet => "replicasets",
            Self::Service => "services",
        }
    }

    /// Prefix used in `kubectl port-forward <prefix>/<name>`.
    pub fn target_prefix(&self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Deployment => "deployment",
            Self::ReplicaSet => "replicaset",
            Self::Service => "service",
        }
    }

    /// The kind after this one, wrapping around. Used by selectors.
    pub fn next(&self) -> Self {
        match self {
            Self::Pod => Self::Deployment,
            Self::Deployment => Self::ReplicaSet,
            Self::ReplicaSet => Self::Service,
            Self::Service => Self::Pod,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target_prefix())
    }
}

impl FromStr for ResourceKind {
    type Err = ForwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "po" | "pod" | "pods" => Ok(Self::Pod),
            "deploy" | "deployment" | "deployments" => Ok(Self::Deployment),
            "rs" | "replicaset" | "replicasets" => Ok(Self::ReplicaSet),
            "svc" | "service" | "services" => Ok(Self::Service),
            other => Err(ForwardError::InvalidSpec(format!(
                "unknown resource kind '{}'",
                other
            ))),
        }
    }
}

/// A `kind/name` reference, e.g. `pod/user-rpc-1nidnqin`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.target_prefix(), self.name)
    }
}

impl FromStr for ResourceRef {
    type Err = ForwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s.split_once('/').ok_or_else(|| {
            ForwardError::InvalidSpec(format!("expected kind/name, got '{}'", s))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ForwardError::InvalidSpec("resource name is empty".to_string()));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_accepts_ui_labels_and_aliases() {
        assert_eq!("pods".parse::<ResourceKind>().unwrap(), ResourceKind::Pod);
        assert_eq!("deployment".parse::<ResourceKind>().unwrap(), ResourceKind::Deployment);
        assert_eq!("replicaset".parse::<ResourceKind>().unwrap(), ResourceKind::ReplicaSet);
        assert_eq!("service".parse::<ResourceKind>().unwrap(), ResourceKind::Service);
        assert_eq!("svc".parse::<ResourceKind>().unwrap(), ResourceKind::Service);
        assert_eq!("RS".parse::<ResourceKind>().unwrap(), ResourceKind::ReplicaSet);
        assert!("configmap".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_kind_cycle_visits_every_kind() {
        let mut kind = ResourceKind::Pod;
        for expected in ResourceKind::ALL.iter().skip(1) {
            kind = kind.next();
            assert_eq!(kind, *expected);
        }
        assert_eq!(kind.next(), ResourceKind::Pod);
    }

    #[test]
    fn test_resource_ref_round_trip() {
        let r: ResourceRef = "pod/user-rpc-1nidnqin".parse().unwrap();
        assert_eq!(r.kind, ResourceKind::Pod);
        assert_eq!(r.name, "user-rpc-1nidnqin");
        assert_eq!(r.to_string(), "pod/user-rpc-1nidnqin");

        let svc: ResourceRef = "svc/web".parse().unwrap();
        assert_eq!(svc.to_string(), "service/web");
    }

    #[test]
    fn test_resource_ref_rejects_malformed() {
        assert!("user-rpc".parse::<ResourceRef>().is_err());
        assert!("pod/".parse::<ResourceRef>().is_err());
        assert!("secret/x".parse::<ResourceRef>().is_err());
    }
}
