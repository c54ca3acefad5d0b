//! Resources command - list forwardable objects of one kind in a namespace.

use anyhow::Result;
use kubeforward_core::{ForwardEngine, ResourceKind, ResourceRef};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceEntry {
    namespace: String,
    kind: ResourceKind,
    name: String,
    target: String,
}

pub fn run(engine: &ForwardEngine, namespace: &str, kind: ResourceKind, json: bool) -> Result<()> {
    let names = engine.fetch_resources(namespace, kind)?;
    let refs: Vec<ResourceRef> = names
        .into_iter()
        .map(|name| ResourceRef::new(kind, name))
        .collect();

    if json {
        let entries: Vec<ResourceEntry> = refs
            .iter()
            .map(|r| ResourceEntry {
                namespace: namespace.to_string(),
                kind: r.kind,
                name: r.name.clone(),
                target: r.to_string(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if refs.is_empty() {
        println!("No {} found in namespace {}.", kind.list_name(), namespace);
        return Ok(());
    }

    // Table header
    println!("{:<20} {:<12} NAME", "NAMESPACE", "KIND");
    println!("{}", "-".repeat(60));

    for r in &refs {
        println!(
            "{:<20} {:<12} {}",
            truncate(namespace, 20),
            r.kind.target_prefix(),
            r.name
        );
    }

    println!("\nTotal: {} {}", refs.len(), kind.list_name());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}
