//! kubectl JSON response parsing.

use serde::Deserialize;

// ============================================================================
// kubectl JSON Response Parsing
// ============================================================================

/// Response structure for `kubectl get <kind> -o json`.
///
/// Only object names are needed for discovery, so one shape covers
/// namespaces, pods, deployments, replica sets and services.
#[derive(Debug, Deserialize)]
pub struct ObjectListResponse {
    #[serde(default)]
    pub items: Vec<ObjectItem>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectItem {
    pub metadata: ObjectMetadata,
}

#[derive(Debug, Deserialize)]
pub struct ObjectMetadata {
    pub name: String,
}

impl ObjectListResponse {
    /// Converts the kubectl response to a sorted list of names.
    ///
    /// Objects that are being deleted are still present and are listed.
    pub fn into_names(self) -> Vec<String> {
        let mut names: Vec<String> = self
            .items
            .into_iter()
            .map(|item| item.metadata.name)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Parses the output of `kubectl get <kind> <name> -o name`,
/// e.g. `pod/user-rpc-1` or `deployment.apps/api`.
pub fn parse_object_name(output: &str) -> Option<(&str, &str)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (kind, name) = line.split_once('/')?;
    let kind = kind.split('.').next().unwrap_or(kind);
    if name.is_empty() {
        return None;
    }
    Some((kind, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pod_list() {
        let json = r#"{
            "apiVersion": "v1",
            "kind": "List",
            "items": [
                {"metadata": {"name": "user-rpc-b", "namespace": "backend"}},
                {"metadata": {"name": "user-rpc-a", "namespace": "backend"}},
                {"metadata": {"name": "user-rpc-old", "namespace": "backend",
                              "deletionTimestamp": "2026-01-01T00:00:00Z"}}
            ]
        }"#;
        let response: ObjectListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.into_names(),
            vec!["user-rpc-a", "user-rpc-b", "user-rpc-old"]
        );
    }

    #[test]
    fn test_parse_empty_list() {
        let response: ObjectListResponse =
            serde_json::from_str(r#"{"apiVersion": "v1", "items": []}"#).unwrap();
        assert!(response.into_names().is_empty());

        let response: ObjectListResponse = serde_json::from_str(r#"{"kind": "List"}"#).unwrap();
        assert!(response.into_names().is_empty());
    }

    #[test]
    fn test_parse_object_name() {
        assert_eq!(parse_object_name("pod/user-rpc-1\n"), Some(("pod", "user-rpc-1")));
        assert_eq!(parse_object_name("deployment.apps/api"), Some(("deployment", "api")));
        assert_eq!(parse_object_name(""), None);
        assert_eq!(parse_object_name("pod/"), None);
    }
}
