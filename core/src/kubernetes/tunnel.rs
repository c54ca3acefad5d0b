//! Tunnel transport built on `kubectl port-forward` child processes.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::context::ClusterContext;
use crate::domain::ForwardSpec;
use crate::error::{ForwardError, ForwardResult};
use crate::ports::{Tunnel, TunnelDialer};

/// Grace period before force-killing a process.
const KILL_GRACE_PERIOD: Duration = Duration::from_millis(300);

/// How long to wait for the last stderr lines after the process exits.
const STDERR_SETTLE: Duration = Duration::from_millis(200);

/// Number of stderr lines kept to explain a closed tunnel.
const STDERR_TAIL_LINES: usize = 20;

/// Default listen address for the local side.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// Opens tunnels by spawning `kubectl port-forward`.
#[derive(Debug, Clone)]
pub struct KubectlDialer {
    context: ClusterContext,
    bind_address: String,
}

impl KubectlDialer {
    pub fn new(context: ClusterContext) -> Self {
        Self {
            context,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Arguments passed to kubectl after the connection flags.
    fn port_forward_args(&self, spec: &ForwardSpec) -> Vec<String> {
        vec![
            "port-forward".to_string(),
            "-n".to_string(),
            spec.namespace.clone(),
            spec.target(),
            format!("{}:{}", spec.local_port, spec.remote_port),
            format!("--address={}", self.bind_address),
        ]
    }

    async fn spawn(&self, spec: &ForwardSpec) -> ForwardResult<KubectlTunnel> {
        let mut child = self
            .context
            .command()
            .args(self.port_forward_args(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ForwardError::KubectlNotFound,
                _ => ForwardError::CommandFailed(format!("Failed to start kubectl: {}", e)),
            })?;

        debug!(pid = ?child.id(), target = %spec.target(), "kubectl port-forward spawned");

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                terminate(&mut child).await;
                return Err(ForwardError::CommandFailed(
                    "kubectl output is not captured".to_string(),
                ));
            }
        };

        let tail: StderrTail = Arc::new(Mutex::new(VecDeque::new()));
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut stderr_open = true;

        // Wait for "Forwarding from ..." or the first sign of failure
        let ready = loop {
            tokio::select! {
                line = out_lines.next_line() => match line {
                    Ok(Some(line)) => {
                        debug!(%line, "kubectl stdout");
                        if is_ready_line(&line) {
                            break Ok(());
                        }
                    }
                    Ok(None) | Err(_) => {
                        let _ = child.wait().await;

                        // The reason may still be buffered on stderr
                        let mut failure = None;
                        while stderr_open && failure.is_none() {
                            match timeout(STDERR_SETTLE, err_lines.next_line()).await {
                                Ok(Ok(Some(line))) => {
                                    push_tail(&tail, &line);
                                    failure = stderr_failure(&line);
                                }
                                _ => stderr_open = false,
                            }
                        }
                        break Err(failure.unwrap_or_else(|| {
                            closed_error(&tail, "kubectl exited before forwarding")
                        }));
                    }
                },
                line = err_lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => {
                        push_tail(&tail, &line);
                        if let Some(e) = stderr_failure(&line) {
                            break Err(e);
                        }
                    }
                    Ok(None) | Err(_) => stderr_open = false,
                },
            }
        };

        if let Err(e) = ready {
            terminate(&mut child).await;
            return Err(e);
        }

        let stdout_drain = tokio::spawn(async move {
            while let Ok(Some(line)) = out_lines.next_line().await {
                debug!(%line, "kubectl stdout");
            }
        });
        let stderr_drain = stderr_open.then(|| {
            let tail = tail.clone();
            tokio::spawn(async move {
                while let Ok(Some(line)) = err_lines.next_line().await {
                    warn!(%line, "kubectl stderr");
                    push_tail(&tail, &line);
                }
            })
        });

        Ok(KubectlTunnel {
            child,
            tail,
            stdout_drain: Some(stdout_drain),
            stderr_drain,
        })
    }
}

impl TunnelDialer for KubectlDialer {
    type Tunnel = KubectlTunnel;

    async fn dial(&self, spec: &ForwardSpec) -> ForwardResult<KubectlTunnel> {
        self.spawn(spec).await
    }
}

/// A running `kubectl port-forward` process.
pub struct KubectlTunnel {
    child: Child,
    tail: StderrTail,
    stdout_drain: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<()>>,
}

impl KubectlTunnel {
    /// The kubectl process id, while it is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

impl Tunnel for KubectlTunnel {
    async fn closed(&mut self) -> ForwardResult<()> {
        let status = self.child.wait().await?;

        // Let the drain pick up the final error line
        if let Some(drain) = self.stderr_drain.take() {
            let _ = timeout(STDERR_SETTLE, drain).await;
        }

        if status.success() {
            Ok(())
        } else {
            Err(closed_error(&self.tail, &status.to_string()))
        }
    }

    async fn shutdown(mut self) {
        terminate(&mut self.child).await;
        for drain in [self.stdout_drain.take(), self.stderr_drain.take()]
            .into_iter()
            .flatten()
        {
            drain.abort();
        }
    }
}

/// Terminates a child gracefully, force-killing it after a grace period.
async fn terminate(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
            && timeout(KILL_GRACE_PERIOD, child.wait()).await.is_ok()
        {
            return;
        }
    }

    let _ = child.start_kill();
    let _ = child.wait().await; // Wait to avoid zombies
}

fn push_tail(tail: &StderrTail, line: &str) {
    let mut tail = tail.lock();
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line.to_string());
}

/// The dial error a stderr line reports, if any.
fn stderr_failure(line: &str) -> Option<ForwardError> {
    if let Some(port) = detect_port_conflict(line) {
        return Some(ForwardError::PortInUse(port));
    }
    is_error_line(line).then(|| ForwardError::from_kubectl_error(line))
}

fn closed_error(tail: &StderrTail, fallback: &str) -> ForwardError {
    let tail = tail.lock();
    let reason = tail
        .iter()
        .rev()
        .find(|l| is_error_line(l))
        .or_else(|| tail.back())
        .cloned()
        .unwrap_or_else(|| fallback.to_string());
    ForwardError::TunnelClosed(reason)
}

// ============================================================================
// Output Parsing
// ============================================================================

/// Whether kubectl reports the local listener as ready.
pub fn is_ready_line(line: &str) -> bool {
    line.trim_start().starts_with("Forwarding from")
}

/// Checks if a line indicates an error.
pub fn is_error_line(line: &str) -> bool {
    let line_lower = line.to_lowercase();
    line_lower.contains("error")
        || line_lower.contains("failed")
        || line_lower.contains("unable to")
        || line_lower.contains("connection refused")
        || line_lower.contains("lost connection")
        || line_lower.contains("an error occurred")
}

/// Detects port conflict from output line.
/// Returns the conflicting port if detected.
pub fn detect_port_conflict(line: &str) -> Option<u16> {
    // kubectl format: "listen tcp4 127.0.0.1:8080: bind: address already in use"

    if !line.to_lowercase().contains("address already in use") {
        return None;
    }

    // Look for patterns like ":8080" followed by non-digit
    for part in line.split(':').skip(1) {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            continue;
        }

        if let Ok(port) = digits.parse::<u16>() {
            // Skip IP octets, which are small numbers
            if port > 255 {
                return Some(port);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;
    use std::path::PathBuf;

    #[test]
    fn test_is_error_line() {
        assert!(is_error_line("Error: connection refused"));
        assert!(is_error_line("Failed to connect"));
        assert!(is_error_line("Unable to establish connection"));
        assert!(is_error_line("Lost connection to pod"));
        assert!(!is_error_line("Forwarding from 127.0.0.1:8080 -> 80"));
    }

    #[test]
    fn test_is_ready_line() {
        assert!(is_ready_line("Forwarding from 127.0.0.1:8080 -> 80"));
        assert!(is_ready_line("Forwarding from [::1]:8080 -> 80"));
        assert!(!is_ready_line("Handling connection for 8080"));
    }

    #[test]
    fn test_detect_port_conflict() {
        let kubectl_error = "listen tcp4 127.0.0.1:8080: bind: address already in use";
        assert_eq!(detect_port_conflict(kubectl_error), Some(8080));

        let no_conflict = "Forwarding from 127.0.0.1:8080 -> 80";
        assert_eq!(detect_port_conflict(no_conflict), None);
    }

    #[test]
    fn test_port_forward_args() {
        let dialer = KubectlDialer::new(ClusterContext::new(PathBuf::from("/usr/bin/kubectl")))
            .with_bind_address("0.0.0.0");
        let spec = ForwardSpec::new("backend", ResourceKind::Deployment, "api", 8080, 80);

        assert_eq!(
            dialer.port_forward_args(&spec),
            vec![
                "port-forward",
                "-n",
                "backend",
                "deployment/api",
                "8080:80",
                "--address=0.0.0.0",
            ]
        );
    }

    #[test]
    fn test_closed_error_prefers_error_lines() {
        let tail: StderrTail = Arc::new(Mutex::new(VecDeque::new()));
        assert_eq!(
            closed_error(&tail, "exit status: 1"),
            ForwardError::TunnelClosed("exit status: 1".to_string())
        );

        push_tail(&tail, "E0101 lost connection to pod");
        push_tail(&tail, "Handling connection for 8080");
        assert_eq!(
            closed_error(&tail, "exit status: 1"),
            ForwardError::TunnelClosed("E0101 lost connection to pod".to_string())
        );
    }

    #[test]
    fn test_tail_is_bounded() {
        let tail: StderrTail = Arc::new(Mutex::new(VecDeque::new()));
        for i in 0..(STDERR_TAIL_LINES + 5) {
            push_tail(&tail, &format!("line {}", i));
        }
        assert_eq!(tail.lock().len(), STDERR_TAIL_LINES);
        assert_eq!(tail.lock().front().map(String::as_str), Some("line 5"));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_kubectl(dir: &tempfile::TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("kubectl");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn spec() -> ForwardSpec {
            ForwardSpec::new("backend", ResourceKind::Pod, "user-rpc-1", 18080, 80)
        }

        #[tokio::test]
        async fn test_dial_ready_then_clean_close() {
            let dir = tempfile::tempdir().unwrap();
            let kubectl = fake_kubectl(
                &dir,
                "echo 'Forwarding from 127.0.0.1:18080 -> 80'\nsleep 0.2\nexit 0",
            );
            let dialer = KubectlDialer::new(ClusterContext::new(kubectl));

            let mut tunnel = dialer.dial(&spec()).await.unwrap();
            assert!(tunnel.closed().await.is_ok());
            tunnel.shutdown().await;
        }

        #[tokio::test]
        async fn test_dial_port_conflict() {
            let dir = tempfile::tempdir().unwrap();
            let kubectl = fake_kubectl(
                &dir,
                "echo 'Unable to listen on port 18080: listen tcp4 127.0.0.1:18080: bind: address already in use' >&2\nsleep 5",
            );
            let dialer = KubectlDialer::new(ClusterContext::new(kubectl));

            let err = dialer.dial(&spec()).await.err().unwrap();
            assert_eq!(err, ForwardError::PortInUse(18080));
        }

        #[tokio::test]
        async fn test_dial_error_after_stdout_closes() {
            let dir = tempfile::tempdir().unwrap();
            let kubectl = fake_kubectl(
                &dir,
                "exec >&-\nsleep 0.1\necho 'error: unable to forward port because pod is not running. Current status=Pending' >&2\nexit 1",
            );
            let dialer = KubectlDialer::new(ClusterContext::new(kubectl));

            let err = dialer.dial(&spec()).await.err().unwrap();
            assert!(
                matches!(&err, ForwardError::CommandFailed(msg) if msg.contains("pod is not running")),
                "unexpected error: {:?}",
                err
            );
        }

        #[tokio::test]
        async fn test_broken_tunnel_reports_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let kubectl = fake_kubectl(
                &dir,
                "echo 'Forwarding from 127.0.0.1:18080 -> 80'\nsleep 0.2\necho 'lost connection to pod' >&2\nexit 1",
            );
            let dialer = KubectlDialer::new(ClusterContext::new(kubectl));

            let mut tunnel = dialer.dial(&spec()).await.unwrap();
            let err = tunnel.closed().await.unwrap_err();
            assert_eq!(err, ForwardError::TunnelClosed("lost connection to pod".to_string()));
            tunnel.shutdown().await;
        }

        #[tokio::test]
        async fn test_shutdown_stops_process() {
            let dir = tempfile::tempdir().unwrap();
            let kubectl = fake_kubectl(
                &dir,
                "echo 'Forwarding from 127.0.0.1:18080 -> 80'\nexec sleep 30",
            );
            let dialer = KubectlDialer::new(ClusterContext::new(kubectl));

            let tunnel = dialer.dial(&spec()).await.unwrap();
            assert!(tunnel.pid().is_some());
            tokio::time::timeout(Duration::from_secs(5), tunnel.shutdown())
                .await
                .expect("shutdown should finish");
        }
    }
}
