//! Structural validation of a loaded deploy configuration.
//!
//! Pure check over a `DeployConfig`: nothing is executed, every rule is
//! evaluated (no short-circuit), and the result separates blocking errors
//! from advisory warnings.

use serde::Serialize;

use super::DeployConfig;

/// Outcome of validating a configuration. `ok` iff `errors` is empty;
/// warnings never affect it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a configuration for structural problems without executing
/// anything.
pub fn validate(config: &DeployConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.workloads.is_empty() {
        result.errors.push("No workloads defined in manifest.".to_string());
    }

    let mut seen_names: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for workload in &config.workloads {
        if !seen_names.insert(&workload.name) {
            result
                .errors
                .push(format!("Duplicate workload name '{}'.", workload.name));
        }

        for manifest in &workload.manifests {
            if !manifest.exists() {
                result.errors.push(format!(
                    "Manifest missing for workload '{}': {}",
                    workload.name,
                    manifest.display()
                ));
            }
        }

        // Non-fatal: plan display still works, but build/push will refuse.
        if workload.image.is_none() {
            result.warnings.push(format!(
                "Workload '{}' is missing an image definition.",
                workload.name
            ));
        }

        if let Some(context) = &workload.build_context {
            if !context.exists() {
                result.errors.push(format!(
                    "Build context not found for workload '{}': {}",
                    workload.name,
                    context.display()
                ));
            }
        }

        if let Some(dockerfile) = &workload.dockerfile {
            if !dockerfile.exists() {
                result.errors.push(format!(
                    "Dockerfile not found for workload '{}': {}",
                    workload.name,
                    dockerfile.display()
                ));
            }
        }

        if let Some(pf) = &workload.port_forward {
            if pf.remote_port == 0 {
                result.errors.push(format!(
                    "Port-forward target port invalid for workload '{}'.",
                    workload.name
                ));
            }
        }
    }

    result
}
