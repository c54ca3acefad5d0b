//! Kubernetes discovery using kubectl commands.

use tokio::time::timeout;
use tracing::debug;

use super::context::ClusterContext;
use super::models::{parse_object_name, ObjectListResponse};
use crate::domain::ResourceKind;
use crate::error::{ForwardError, ForwardResult};
use crate::ports::ClusterClient;

/// Cluster resource client backed by `kubectl get`.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    context: ClusterContext,
}

impl KubectlClient {
    pub fn new(context: ClusterContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ClusterContext {
        &self.context
    }

    /// Fetches all Kubernetes namespaces.
    pub async fn fetch_namespaces(&self) -> ForwardResult<Vec<String>> {
        let request_timeout = self.context.request_timeout_arg();
        let output = self
            .execute_kubectl(&["get", "namespaces", "-o", "json", &request_timeout])
            .await?;

        parse_names(&output)
    }

    /// Fetches the names of `kind` objects in a namespace.
    pub async fn fetch_resources(
        &self,
        namespace: &str,
        kind: ResourceKind,
    ) -> ForwardResult<Vec<String>> {
        let request_timeout = self.context.request_timeout_arg();
        let output = self
            .execute_kubectl(&[
                "get",
                kind.list_name(),
                "-n",
                namespace,
                "-o",
                "json",
                &request_timeout,
            ])
            .await?;

        let names = parse_names(&output)?;

        // kubectl answers an unknown namespace with an empty list
        if names.is_empty() {
            self.ensure_namespace(namespace).await?;
        }

        Ok(names)
    }

    /// Confirms that `kind/name` exists in `namespace`.
    pub async fn fetch_object(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> ForwardResult<()> {
        let request_timeout = self.context.request_timeout_arg();
        let result = self
            .execute_kubectl(&[
                "get",
                kind.list_name(),
                name,
                "-n",
                namespace,
                "-o",
                "name",
                &request_timeout,
            ])
            .await;

        match result {
            Ok(output) if parse_object_name(&output).is_some() => Ok(()),
            Ok(_) => Err(not_found(namespace, kind, name)),
            Err(ForwardError::ResourceNotFound(_)) => {
                // kubectl says "pods not found" for a missing namespace too
                self.ensure_namespace(namespace).await?;
                Err(not_found(namespace, kind, name))
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_namespace(&self, namespace: &str) -> ForwardResult<()> {
        let request_timeout = self.context.request_timeout_arg();
        match self
            .execute_kubectl(&["get", "namespace", namespace, "-o", "name", &request_timeout])
            .await
        {
            Ok(_) => Ok(()),
            Err(ForwardError::ResourceNotFound(_)) | Err(ForwardError::NamespaceNotFound(_)) => {
                Err(ForwardError::NamespaceNotFound(namespace.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Executes a kubectl command and returns the output.
    async fn execute_kubectl(&self, args: &[&str]) -> ForwardResult<String> {
        debug!(?args, "running kubectl");

        // Outer bound in case kubectl hangs before applying its own timeout
        let limit = self.context.request_timeout() * 2;
        let result = timeout(limit, async {
            // A cancelled or timed-out call must not leave kubectl behind
            let output = self
                .context
                .command()
                .args(args)
                .kill_on_drop(true)
                .output()
                .await?;

            Ok::<_, std::io::Error>((output.status, output.stdout, output.stderr))
        })
        .await;

        match result {
            Ok(Ok((status, stdout, stderr))) => {
                if status.success() {
                    String::from_utf8(stdout)
                        .map_err(|e| ForwardError::ParsingFailed(e.to_string()))
                } else {
                    let stderr_str = String::from_utf8_lossy(&stderr);
                    debug!(stderr = %stderr_str.trim(), "kubectl failed");
                    Err(ForwardError::from_kubectl_error(&stderr_str))
                }
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ForwardError::KubectlNotFound)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ForwardError::Timeout),
        }
    }
}

impl ClusterClient for KubectlClient {
    async fn list_namespaces(&self) -> ForwardResult<Vec<String>> {
        self.fetch_namespaces().await
    }

    async fn list_resources(
        &self,
        namespace: &str,
        kind: ResourceKind,
    ) -> ForwardResult<Vec<String>> {
        self.fetch_resources(namespace, kind).await
    }

    async fn resolve(&self, namespace: &str, kind: ResourceKind, name: &str) -> ForwardResult<()> {
        self.fetch_object(namespace, kind, name).await
    }
}

fn parse_names(output: &str) -> ForwardResult<Vec<String>> {
    let response: ObjectListResponse =
        serde_json::from_str(output).map_err(|e| ForwardError::ParsingFailed(e.to_string()))?;
    Ok(response.into_names())
}

fn not_found(namespace: &str, kind: ResourceKind, name: &str) -> ForwardError {
    ForwardError::ResourceNotFound(format!(
        "{}/{} in namespace {}",
        kind.target_prefix(),
        name,
        namespace
    ))
}
