//! Namespaces command - list every namespace in the cluster.

use anyhow::Result;
use kubeforward_core::ForwardEngine;

pub fn run(engine: &ForwardEngine, json: bool) -> Result<()> {
    let namespaces = engine.fetch_namespaces()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&namespaces)?);
        return Ok(());
    }

    if namespaces.is_empty() {
        println!("No namespaces found.");
        return Ok(());
    }

    for namespace in &namespaces {
        println!("{}", namespace);
    }

    println!("\nTotal: {} namespaces", namespaces.len());
    Ok(())
}
