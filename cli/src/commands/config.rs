//! Config command - show the effective settings.

use anyhow::Result;
use kubeforward_core::kubernetes::ClusterContext;
use kubeforward_core::{Settings, SettingsStore};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigReport<'a> {
    config_path: String,
    kubectl: Option<String>,
    settings: &'a Settings,
}

pub fn show(store: &SettingsStore, settings: &Settings, json: bool) -> Result<()> {
    let kubectl = ClusterContext::from_settings(settings)
        .ok()
        .map(|context| context.kubectl_path().display().to_string());

    if json {
        let report = ConfigReport {
            config_path: store.config_path().display().to_string(),
            kubectl,
            settings,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Config file:      {}", store.config_path().display());
    println!(
        "kubectl:          {}",
        kubectl.as_deref().unwrap_or("not found")
    );
    println!(
        "kubeconfig:       {}",
        settings
            .kubeconfig
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(kubectl default)".to_string())
    );
    println!("Bind address:     {}", settings.bind_address);
    println!("Request timeout:  {}s", settings.request_timeout().as_secs());
    println!("Resolve timeout:  {}s", settings.resolve_timeout().as_secs());
    println!("Dial timeout:     {}s", settings.dial_timeout().as_secs());
    println!("Event high-water: {}", settings.event_high_water);
    println!("Log filter:       {}", settings.log_filter);

    Ok(())
}
