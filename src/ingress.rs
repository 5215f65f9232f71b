//! Reverse-tunnel ingress synchronization.
//!
//! Consumes the same project list as the dispatcher and keeps a tunnel
//! profile's routing-table document in line with it: one hostname rule per
//! published project branch, terminated by a catch-all 404 rule. Only the
//! `ingress` key of the routing table is rewritten; every other field in
//! the document is preserved. After writing, DNS routes are registered per
//! hostname and the tunnel service is restarted.

use serde::Serialize;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{error, info, warn};

use crate::config::{Config, TunnelProfile};
use crate::error::Result;

pub const CATCH_ALL_SERVICE: &str = "http_status:404";

/// One entry of the tunnel's ingress table. The catch-all rule has no
/// hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
}

/// Builds the ordered ingress rules for one profile, plus the list of
/// hostnames needing DNS routes. Projects are walked in configuration
/// order; entries bound to other profiles or disabled are skipped.
pub fn build_rules(
    config: &Config,
    profile_name: &str,
    profile: &TunnelProfile,
) -> (Vec<IngressRule>, Vec<String>) {
    let mut rules = Vec::new();
    let mut hostnames = Vec::new();

    for project in &config.projects {
        let Some(ingress) = &project.ingress else {
            continue;
        };
        if !ingress.enabled || ingress.profile != profile_name {
            continue;
        }
        if ingress.subdomain.is_empty() {
            warn!(
                project = %project.name,
                "Skipping ingress entry with empty subdomain"
            );
            continue;
        }

        let hostname = format!("{}.{}", ingress.subdomain, profile.root_domain);
        let protocol = ingress.protocol.as_deref().unwrap_or("http");
        let local_path = ingress.local_path.as_deref().unwrap_or("/");
        let service = format!(
            "{}://localhost:{}{}",
            protocol, ingress.local_port, local_path
        );

        rules.push(IngressRule {
            hostname: Some(hostname.clone()),
            service,
        });
        hostnames.push(hostname);
    }

    rules.push(IngressRule {
        hostname: None,
        service: CATCH_ALL_SERVICE.to_string(),
    });
    (rules, hostnames)
}

/// Rewrites the `ingress` key of the routing-table document, preserving
/// every unrelated field. A missing or unparseable document starts from an
/// empty one.
pub fn write_routing_table(path: &Path, rules: &[IngressRule]) -> Result<()> {
    let mut doc: serde_yaml_ng::Value = match fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => match serde_yaml_ng::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse existing routing table {:?}: {}", path, e);
                serde_yaml_ng::Value::Mapping(Default::default())
            }
        },
        _ => serde_yaml_ng::Value::Mapping(Default::default()),
    };

    if !doc.is_mapping() {
        doc = serde_yaml_ng::Value::Mapping(Default::default());
    }
    if let Some(mapping) = doc.as_mapping_mut() {
        mapping.insert(
            serde_yaml_ng::Value::String("ingress".to_string()),
            serde_yaml_ng::to_value(rules)?,
        );
    }

    fs::write(path, serde_yaml_ng::to_string(&doc)?)?;
    Ok(())
}

/// Syncs one tunnel profile: rewrite the routing table, register DNS
/// routes, restart the tunnel service. Command failures are logged per
/// hostname and do not abort the remaining work.
pub fn sync_profile(config: &Config, profile_name: &str, profile: &TunnelProfile) -> Result<()> {
    let (rules, hostnames) = build_rules(config, profile_name, profile);
    write_routing_table(&profile.config_file, &rules)?;
    info!(
        "Updated ingress in {:?} ({} hostnames)",
        profile.config_file,
        hostnames.len()
    );

    for hostname in &hostnames {
        route_dns(&profile.tunnel_name, hostname);
    }

    if let Some(service) = &profile.service_name {
        restart_service(service);
    }

    Ok(())
}

fn route_dns(tunnel_name: &str, hostname: &str) {
    info!("cloudflared tunnel route dns {} {}", tunnel_name, hostname);
    match Command::new("cloudflared")
        .args(["tunnel", "route", "dns", tunnel_name, hostname])
        .status()
    {
        Ok(status) if status.success() => {}
        Ok(status) => error!("DNS route for {} failed: {}", hostname, status),
        Err(e) => error!("Failed to run cloudflared for {}: {}", hostname, e),
    }
}

fn restart_service(service_name: &str) {
    info!("Restarting service: {}", service_name);
    match Command::new("systemctl")
        .args(["restart", service_name])
        .status()
    {
        Ok(status) if status.success() => {}
        Ok(status) => error!("Restart of {} failed: {}", service_name, status),
        Err(e) => error!("Failed to run systemctl for {}: {}", service_name, e),
    }
}
