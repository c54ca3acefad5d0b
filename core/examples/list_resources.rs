//! Example: List every namespace and the forwardable objects in it.
//!
//! Usage:
//!   cargo run --example list_resources            # All namespaces, pods
//!   cargo run --example list_resources services   # All namespaces, services

use kubeforward_core::kubernetes::{ClusterContext, KubectlClient};
use kubeforward_core::ports::ClusterClient;
use kubeforward_core::{ResourceKind, ResourceRef};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let kind: ResourceKind = match std::env::args().nth(1).map(|arg| arg.parse()) {
        Some(Ok(kind)) => kind,
        Some(Err(e)) => {
            eprintln!("{}", e);
            return;
        }
        None => ResourceKind::Pod,
    };

    let client = match ClusterContext::discover() {
        Ok(context) => KubectlClient::new(context),
        Err(e) => {
            eprintln!("Error: {}", e);
            return;
        }
    };

    let namespaces = match client.list_namespaces().await {
        Ok(namespaces) => namespaces,
        Err(e) => {
            eprintln!("Error listing namespaces: {}", e);
            return;
        }
    };

    let mut total = 0;
    for namespace in &namespaces {
        match client.list_resources(namespace, kind).await {
            Ok(names) => {
                for name in names {
                    println!("{:<20} {}", namespace, ResourceRef::new(kind, name));
                    total += 1;
                }
            }
            Err(e) => eprintln!("{:<20} error: {}", namespace, e),
        }
    }

    println!("\nTotal: {} {} in {} namespaces", total, kind.list_name(), namespaces.len());
}
