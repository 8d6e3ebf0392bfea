//! Human-readable summary of a deploy configuration.

use crate::config::DeployConfig;

/// Render the deployment plan: service identity, target, namespace, and
/// one line per workload.
pub fn format_plan(config: &DeployConfig) -> String {
    let mut lines = vec![
        format!("Service: {} ({})", config.service, config.mode),
        format!("Target: {}", config.target),
        format!(
            "Namespace: {}",
            config.namespace.as_deref().unwrap_or("(default)")
        ),
        String::new(),
        "Workloads:".to_string(),
    ];

    for workload in &config.workloads {
        let image = workload
            .image
            .as_ref()
            .map(|i| i.as_string())
            .unwrap_or_else(|| "unspecified".to_string());
        let manifests = workload
            .manifests
            .iter()
            .map(|m| m.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let forward = workload
            .port_forward
            .as_ref()
            .map(|pf| {
                format!(
                    ", port-forward svc/{}:{}->{}",
                    pf.service,
                    pf.local_or_remote(),
                    pf.remote_port
                )
            })
            .unwrap_or_default();
        lines.push(format!(
            "- {} [{}] -> manifests {} (image: {}{})",
            workload.name, workload.mode, manifests, image, forward
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeployTarget, ImageRef, PortForward, ServiceMode, Workload};
    use std::path::PathBuf;

    #[test]
    fn test_format_plan_mentions_every_workload() {
        let config = DeployConfig {
            service: "demo".to_string(),
            mode: ServiceMode::Stateless,
            target: DeployTarget::Kubernetes,
            namespace: Some("mesh".to_string()),
            workloads: vec![
                Workload {
                    name: "api".to_string(),
                    mode: ServiceMode::Stateless,
                    manifests: vec![PathBuf::from("/srv/k8s/api.yaml")],
                    image: Some(ImageRef::new("api", "v1", None)),
                    build_context: None,
                    dockerfile: None,
                    port_forward: Some(PortForward {
                        service: "api".to_string(),
                        remote_port: 8080,
                        local_port: Some(18080),
                    }),
                },
                Workload {
                    name: "worker".to_string(),
                    mode: ServiceMode::Stateful,
                    manifests: vec![PathBuf::from("/srv/k8s/worker.yaml")],
                    image: None,
                    build_context: None,
                    dockerfile: None,
                    port_forward: None,
                },
            ],
        };

        let plan = format_plan(&config);
        assert!(plan.contains("Service: demo (stateless)"));
        assert!(plan.contains("Namespace: mesh"));
        assert!(plan.contains("- api [stateless]"));
        assert!(plan.contains("port-forward svc/api:18080->8080"));
        assert!(plan.contains("- worker [stateful]"));
        assert!(plan.contains("image: unspecified"));
    }

    #[test]
    fn test_format_plan_default_namespace_placeholder() {
        let config = DeployConfig {
            service: "demo".to_string(),
            mode: ServiceMode::Stateless,
            target: DeployTarget::Kubernetes,
            namespace: None,
            workloads: vec![],
        };
        assert!(format_plan(&config).contains("Namespace: (default)"));
    }
}
