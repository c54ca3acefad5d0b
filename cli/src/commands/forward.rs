//! Forward command - run forwards until they end or Ctrl-C.

use std::collections::HashMap;

use anyhow::{bail, Result};
use chrono::Local;
use kubeforward_core::{
    parse_port_pair, BridgeEvent, ForwardEngine, ForwardError, ForwardResult, ForwardSpec,
    ResourceRef, RowId, SessionEvent, SessionOutcome, Subscriber,
};
use serde::Serialize;
use tracing::{info, warn};

/// Parses `kind/name:local:remote` or `kind/name:port`.
pub fn parse_target(text: &str) -> ForwardResult<(ResourceRef, u16, u16)> {
    let (resource, ports) = text.split_once(':').ok_or_else(|| {
        ForwardError::InvalidSpec(format!("'{}' has no port, expected kind/name:local:remote", text))
    })?;
    let resource: ResourceRef = resource.parse()?;
    let (local, remote) = parse_port_pair(ports)?;
    Ok((resource, local, remote))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventLine<'a> {
    time: String,
    row: String,
    target: &'a str,
    outcome: &'static str,
    message: String,
}

pub fn run(
    engine: &ForwardEngine,
    mut subscriber: Subscriber,
    namespace: &str,
    targets: &[String],
    json: bool,
) -> Result<()> {
    // Validate everything before starting anything
    let specs = targets
        .iter()
        .map(|text| {
            let (resource, local, remote) = parse_target(text)?;
            let spec = ForwardSpec::new(namespace, resource.kind, resource.name, local, remote);
            spec.validate()?;
            Ok(spec)
        })
        .collect::<ForwardResult<Vec<_>>>()?;

    let mut pending: HashMap<RowId, String> = HashMap::new();
    for spec in specs {
        let id = RowId::new();
        let description = spec.describe();
        engine.start(id, spec)?;
        pending.insert(id, description);
    }

    let registry = engine.registry().clone();
    engine.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping forwards");
            for id in registry.active_rows() {
                // Already finishing on its own
                let _ = registry.stop(id);
            }
        }
    });

    let total = pending.len();
    let mut failed = 0;
    while !pending.is_empty() {
        let Some(event) = subscriber.blocking_recv() else {
            break;
        };
        let BridgeEvent::Session(event) = event else {
            continue;
        };
        let Some(target) = pending.get(&event.id).cloned() else {
            continue;
        };

        print_event(&event, &target, json)?;

        if event.outcome.is_terminal() {
            pending.remove(&event.id);
            if matches!(event.outcome, SessionOutcome::Failed(_)) {
                failed += 1;
            }
        }
    }

    if failed > 0 {
        warn!(failed, total, "some forwards failed");
        bail!("{} of {} forwards failed", failed, total);
    }
    Ok(())
}

fn print_event(event: &SessionEvent, target: &str, json: bool) -> Result<()> {
    let time = Local::now().format("%H:%M:%S").to_string();

    if json {
        let line = EventLine {
            time,
            row: event.id.to_string(),
            target,
            outcome: outcome_label(&event.outcome),
            message: event.message(),
        };
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    match &event.outcome {
        SessionOutcome::Started => println!("{} {:<10} {}", time, "forwarding", target),
        SessionOutcome::StoppedByUser => println!("{} {:<10} {}", time, "stopped", target),
        SessionOutcome::Closed => println!("{} {:<10} {}", time, "closed", target),
        SessionOutcome::Failed(reason) => {
            println!("{} {:<10} {}: {}", time, "failed", target, reason)
        }
    }
    Ok(())
}

fn outcome_label(outcome: &SessionOutcome) -> &'static str {
    match outcome {
        SessionOutcome::Started => "started",
        SessionOutcome::StoppedByUser => "stopped",
        SessionOutcome::Closed => "closed",
        SessionOutcome::Failed(_) => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeforward_core::ResourceKind;

    #[test]
    fn test_parse_target() {
        let (resource, local, remote) = parse_target("svc/api:8080:80").unwrap();
        assert_eq!(resource, ResourceRef::new(ResourceKind::Service, "api"));
        assert_eq!((local, remote), (8080, 80));

        let (resource, local, remote) = parse_target("pod/user-rpc-1:9000").unwrap();
        assert_eq!(resource.kind, ResourceKind::Pod);
        assert_eq!((local, remote), (9000, 9000));
    }

    #[test]
    fn test_parse_target_rejects_bad_input() {
        assert!(matches!(
            parse_target("pod/api"),
            Err(ForwardError::InvalidSpec(_))
        ));
        assert!(matches!(
            parse_target("pod/api:0:80"),
            Err(ForwardError::InvalidSpec(_))
        ));
        assert!(matches!(
            parse_target("pod/api:8080:70000"),
            Err(ForwardError::InvalidSpec(_))
        ));
        assert!(matches!(
            parse_target("configmap/api:8080"),
            Err(ForwardError::InvalidSpec(_))
        ));
    }
}
