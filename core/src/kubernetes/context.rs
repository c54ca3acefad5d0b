//! How to reach the cluster: the kubectl binary and its connection flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::config::Settings;
use crate::error::{ForwardError, ForwardResult};

/// Default paths to search for kubectl.
const KUBECTL_PATHS: &[&str] = &[
    "/opt/homebrew/bin/kubectl", // Apple Silicon
    "/usr/local/bin/kubectl",    // Intel Mac / Homebrew
    "/usr/bin/kubectl",          // System
    "/snap/bin/kubectl",         // Ubuntu snap
];

/// Default timeout for one kubectl round-trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to one cluster, shared read-only by discovery and tunnels.
///
/// Created once at startup. Credentials and context selection stay with
/// kubectl and the kubeconfig file.
#[derive(Debug, Clone)]
pub struct ClusterContext {
    kubectl_path: PathBuf,
    kubeconfig: Option<PathBuf>,
    request_timeout: Duration,
}

impl ClusterContext {
    /// Creates a context for an explicit kubectl binary.
    pub fn new(kubectl_path: PathBuf) -> Self {
        Self {
            kubectl_path,
            kubeconfig: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Searches the well-known install locations, then `PATH`.
    pub fn discover() -> ForwardResult<Self> {
        find_executable(KUBECTL_PATHS)
            .or_else(|| find_on_path("kubectl"))
            .map(Self::new)
            .ok_or(ForwardError::KubectlNotFound)
    }

    /// Builds a context from user settings.
    pub fn from_settings(settings: &Settings) -> ForwardResult<Self> {
        let context = match &settings.kubectl_path {
            Some(path) if path.exists() => Self::new(path.clone()),
            Some(_) => return Err(ForwardError::KubectlNotFound),
            None => Self::discover()?,
        };
        Ok(context
            .with_kubeconfig(settings.kubeconfig.clone())
            .with_request_timeout(settings.request_timeout()))
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn kubectl_path(&self) -> &Path {
        &self.kubectl_path
    }

    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// A kubectl command with the connection flags already applied.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.kubectl_path);
        command.args(self.connection_args());
        command
    }

    /// `--kubeconfig` flag, when one was configured.
    pub fn connection_args(&self) -> Vec<String> {
        match &self.kubeconfig {
            Some(path) => vec![format!("--kubeconfig={}", path.display())],
            None => Vec::new(),
        }
    }

    /// `--request-timeout` flag matching the configured timeout.
    pub fn request_timeout_arg(&self) -> String {
        format!("--request-timeout={}s", self.request_timeout.as_secs().max(1))
    }
}

/// Finds an executable in the given paths.
fn find_executable(paths: &[&str]) -> Option<PathBuf> {
    paths.iter().map(PathBuf::from).find(|p| p.exists())
}

/// Finds `name` in the directories listed in `PATH`.
fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
