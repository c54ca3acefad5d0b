//! Error types for the kubeforward-core library.

use thiserror::Error;

use crate::domain::RowId;

/// Result type alias for crate-level operations (settings, engine setup).
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by discovery, forwarding sessions and the session registry.
///
/// Cloneable so that a failure can travel inside a [`SessionEvent`] or a
/// listing result after it has been logged.
///
/// [`SessionEvent`]: crate::domain::SessionEvent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// Client-side validation failure; raised before any cluster call.
    #[error("Invalid forward spec: {0}")]
    InvalidSpec(String),

    /// The cluster API could not be reached.
    #[error("Cluster unreachable: {0}")]
    ClusterUnreachable(String),

    /// The cluster rejected our credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// Target object is absent, e.g. `pod/user-rpc-1 in namespace backend`.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Row {0} already has a running forward")]
    AlreadyRunning(RowId),

    #[error("Row {0} has no running forward")]
    NotRunning(RowId),

    /// The tunnel ended after it had become active.
    #[error("Tunnel closed: {0}")]
    TunnelClosed(String),

    /// The local port is taken by another process.
    #[error("Local port {0} is already in use")]
    PortInUse(u16),

    #[error("kubectl not found")]
    KubectlNotFound,

    #[error("Operation timed out")]
    Timeout,

    #[error("Failed to parse kubectl output: {0}")]
    ParsingFailed(String),

    #[error("kubectl failed: {0}")]
    CommandFailed(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type alias for session manager operations.
pub type ForwardResult<T> = std::result::Result<T, ForwardError>;

impl From<std::io::Error> for ForwardError {
    fn from(e: std::io::Error) -> Self {
        ForwardError::Io(e.to_string())
    }
}

impl ForwardError {
    /// Classifies kubectl stderr output into an error variant.
    pub fn from_kubectl_error(stderr: &str) -> Self {
        let message = stderr.trim().to_string();

        // Object names may contain any keyword below; the NotFound shape quotes them
        if let Some((kind, name)) = parse_not_found(&message) {
            if kind == "namespaces" || kind == "namespace" {
                return ForwardError::NamespaceNotFound(name);
            }
            return ForwardError::ResourceNotFound(format!("{}/{}", kind, name));
        }

        let lower = message.to_lowercase();

        if lower.contains("(unauthorized)")
            || lower.contains("(forbidden)")
            || lower.contains(" is forbidden:")
            || lower.contains("must be logged in")
        {
            return ForwardError::Unauthorized(message);
        }

        if lower.contains("connection refused")
            || lower.contains("no configuration has been provided")
            || lower.contains("unable to connect to the server")
            || lower.contains("dial tcp")
            || lower.contains("no such host")
            || lower.contains("i/o timeout")
        {
            return ForwardError::ClusterUnreachable(message);
        }

        ForwardError::CommandFailed(message)
    }

    /// Whether the error means the cluster itself is unavailable.
    pub fn is_cluster_unreachable(&self) -> bool {
        matches!(
            self,
            ForwardError::ClusterUnreachable(_) | ForwardError::KubectlNotFound
        )
    }

    /// Short label used in one-line notifications.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::InvalidSpec(_) => "invalid",
            Self::ClusterUnreachable(_) => "unreachable",
            Self::Unauthorized(_) => "unauthorized",
            Self::NamespaceNotFound(_) | Self::ResourceNotFound(_) => "not found",
            Self::AlreadyRunning(_) => "already running",
            Self::NotRunning(_) => "not running",
            Self::TunnelClosed(_) => "closed",
            Self::PortInUse(_) => "port in use",
            Self::KubectlNotFound => "no kubectl",
            Self::Timeout => "timeout",
            Self::ParsingFailed(_) | Self::CommandFailed(_) | Self::Io(_) => "error",
        }
    }
}

/// Extracts `(kind, name)` from kubectl's `(NotFound): pods "x" not found`.
fn parse_not_found(message: &str) -> Option<(String, String)> {
    use std::sync::OnceLock;

    static NOT_FOUND: OnceLock<regex::Regex> = OnceLock::new();
    let re = NOT_FOUND.get_or_init(|| {
        regex::Regex::new(r#"\(NotFound\):\s*(?P<kind>[\w.\-]+)\s+"(?P<name>[^"]+)"\s+not found"#)
            .expect("static regex")
    });

    let caps = re.captures(message)?;
    let kind = caps.name("kind")?.as_str();
    // `deployments.apps` -> `deployments`
    let kind = kind.split('.').next().unwrap_or(kind);
    Some((kind.to_string(), caps.name("name")?.as_str().to_string()))
}

/// Errors that can occur in the library outside a forwarding session.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Discovery or forwarding error.
    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] ForwardError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_detection() {
        let refused = ForwardError::from_kubectl_error(
            "The connection to the server localhost:8080 was refused - did you specify the right host or port?\nconnection refused",
        );
        assert!(refused.is_cluster_unreachable());

        let no_config = ForwardError::from_kubectl_error("no configuration has been provided");
        assert!(no_config.is_cluster_unreachable());

        let dial = ForwardError::from_kubectl_error("dial tcp 127.0.0.1:6443: connect");
        assert!(dial.is_cluster_unreachable());

        let other = ForwardError::from_kubectl_error("some other error");
        assert!(!other.is_cluster_unreachable());
        assert_eq!(other, ForwardError::CommandFailed("some other error".to_string()));
    }

    #[test]
    fn test_unauthorized_detection() {
        let err = ForwardError::from_kubectl_error(
            "error: You must be logged in to the server (Unauthorized)",
        );
        assert!(matches!(err, ForwardError::Unauthorized(_)));

        let err = ForwardError::from_kubectl_error(
            r#"Error from server (Forbidden): pods is forbidden: User "dev" cannot list resource "pods""#,
        );
        assert!(matches!(err, ForwardError::Unauthorized(_)));
    }

    #[test]
    fn test_not_found_detection() {
        let err = ForwardError::from_kubectl_error(
            r#"Error from server (NotFound): pods "user-rpc-1" not found"#,
        );
        assert_eq!(err, ForwardError::ResourceNotFound("pods/user-rpc-1".to_string()));

        let err = ForwardError::from_kubectl_error(
            r#"Error from server (NotFound): deployments.apps "api" not found"#,
        );
        assert_eq!(err, ForwardError::ResourceNotFound("deployments/api".to_string()));

        let err = ForwardError::from_kubectl_error(
            r#"Error from server (NotFound): namespaces "nope" not found"#,
        );
        assert_eq!(err, ForwardError::NamespaceNotFound("nope".to_string()));
    }

    #[test]
    fn test_not_found_with_keyword_in_name() {
        let err = ForwardError::from_kubectl_error(
            r#"Error from server (NotFound): pods "forbidden-gateway" not found"#,
        );
        assert_eq!(err, ForwardError::ResourceNotFound("pods/forbidden-gateway".to_string()));

        let err = ForwardError::from_kubectl_error(
            r#"Error from server (NotFound): services "unauthorized-proxy" not found"#,
        );
        assert_eq!(err, ForwardError::ResourceNotFound("services/unauthorized-proxy".to_string()));

        // Outside a NotFound message a name alone does not classify the error
        let err = ForwardError::from_kubectl_error(
            r#"error: unable to forward port because pod "forbidden-gateway" is not running"#,
        );
        assert!(matches!(err, ForwardError::CommandFailed(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ForwardError = io.into();
        assert!(matches!(err, ForwardError::Io(msg) if msg.contains("missing")));
    }
}
