//! Cluster query layer.
//!
//! Everything goes through `kubectl get ... -o json` so the CLI needs no
//! cluster credentials of its own. Payloads are deserialized into the few
//! fields the tables show; unknown fields are ignored.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CommandError, MeshError};
use crate::runner::ProcessRunner;
use crate::ui::{Reporter, StepStatus};

pub const DEFAULT_NAMESPACE: &str = "mesh";
pub const DEFAULT_SELECTOR: &str = "component=workload";

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub namespace: String,
    pub selector: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            selector: Some(DEFAULT_SELECTOR.to_string()),
            kubeconfig: None,
            context: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentRow {
    pub name: String,
    pub ready: String,
    pub available: u32,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceRow {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub cluster_ip: String,
    pub ports: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodRow {
    pub name: String,
    pub ready: String,
    pub phase: String,
    pub restarts: u32,
    pub node: String,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub deployments: Vec<DeploymentRow>,
    pub services: Vec<ServiceRow>,
    pub pods: Vec<PodRow>,
}

// kubectl -o json payload surface, only the fields the rows need

#[derive(Debug, Deserialize)]
struct KubeList<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Metadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeploymentItem {
    metadata: Metadata,
    spec: DeploymentSpec,
    status: DeploymentStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeploymentSpec {
    template: PodTemplate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodTemplate {
    spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodSpec {
    containers: Vec<Container>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Container {
    image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeploymentStatus {
    replicas: u32,
    #[serde(rename = "readyReplicas")]
    ready_replicas: u32,
    #[serde(rename = "availableReplicas")]
    available_replicas: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceItem {
    metadata: Metadata,
    spec: ServiceSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceSpec {
    #[serde(rename = "type")]
    service_type: Option<String>,
    #[serde(rename = "clusterIP")]
    cluster_ip: Option<String>,
    ports: Vec<ServicePort>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServicePort {
    port: Option<u32>,
    // kubectl emits this as either a number or a named port
    #[serde(rename = "targetPort")]
    target_port: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodItem {
    metadata: Metadata,
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodStatus {
    phase: Option<String>,
    #[serde(rename = "nodeName")]
    node_name: Option<String>,
    #[serde(rename = "containerStatuses")]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerStatus {
    ready: bool,
    #[serde(rename = "restartCount")]
    restart_count: u32,
}

pub async fn list_deployments<R: ProcessRunner>(
    opts: &QueryOptions,
    runner: &R,
) -> Result<Vec<DeploymentRow>, MeshError> {
    let items: Vec<DeploymentItem> = fetch_items(opts, runner, "deploy").await?;
    Ok(items
        .into_iter()
        .map(|item| {
            let images = item
                .spec
                .template
                .spec
                .containers
                .into_iter()
                .filter_map(|c| c.image)
                .collect();
            DeploymentRow {
                name: item.metadata.name,
                ready: format!(
                    "{}/{}",
                    item.status.ready_replicas, item.status.replicas
                ),
                available: item.status.available_replicas,
                images,
            }
        })
        .collect())
}

pub async fn list_services<R: ProcessRunner>(
    opts: &QueryOptions,
    runner: &R,
) -> Result<Vec<ServiceRow>, MeshError> {
    let items: Vec<ServiceItem> = fetch_items(opts, runner, "svc").await?;
    Ok(items
        .into_iter()
        .map(|item| {
            let ports = item
                .spec
                .ports
                .iter()
                .filter_map(render_port)
                .collect::<Vec<_>>()
                .join(", ");
            ServiceRow {
                name: item.metadata.name,
                service_type: item
                    .spec
                    .service_type
                    .unwrap_or_else(|| "ClusterIP".to_string()),
                cluster_ip: item.spec.cluster_ip.unwrap_or_default(),
                ports,
            }
        })
        .collect())
}

pub async fn list_pods<R: ProcessRunner>(
    opts: &QueryOptions,
    runner: &R,
) -> Result<Vec<PodRow>, MeshError> {
    let items: Vec<PodItem> = fetch_items(opts, runner, "pods").await?;
    Ok(items
        .into_iter()
        .map(|item| {
            let statuses = &item.status.container_statuses;
            let ready_count = statuses.iter().filter(|cs| cs.ready).count();
            let restarts = statuses.iter().map(|cs| cs.restart_count).sum();
            PodRow {
                name: item.metadata.name,
                ready: format!("{}/{}", ready_count, statuses.len()),
                phase: item.status.phase.unwrap_or_default(),
                restarts,
                node: item.status.node_name.unwrap_or_default(),
            }
        })
        .collect())
}

/// Fetch all three resource kinds for the combined `status` view.
pub async fn gather<R: ProcessRunner>(
    opts: &QueryOptions,
    runner: &R,
    reporter: &Reporter,
) -> Result<StatusReport, MeshError> {
    let step = reporter.begin("list deployments");
    let deployments = match list_deployments(opts, runner).await {
        Ok(rows) => {
            step.done(StepStatus::Ok);
            rows
        }
        Err(e) => {
            step.done(StepStatus::Failed);
            return Err(e);
        }
    };

    let step = reporter.begin("list services");
    let services = match list_services(opts, runner).await {
        Ok(rows) => {
            step.done(StepStatus::Ok);
            rows
        }
        Err(e) => {
            step.done(StepStatus::Failed);
            return Err(e);
        }
    };

    let step = reporter.begin("list pods");
    let pods = match list_pods(opts, runner).await {
        Ok(rows) => {
            step.done(StepStatus::Ok);
            rows
        }
        Err(e) => {
            step.done(StepStatus::Failed);
            return Err(e);
        }
    };

    Ok(StatusReport {
        deployments,
        services,
        pods,
    })
}

fn render_port(port: &ServicePort) -> Option<String> {
    let port_number = port.port?;
    let target = match &port.target_port {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    if target.is_empty() {
        Some(port_number.to_string())
    } else {
        Some(format!("{port_number}->{target}"))
    }
}

async fn fetch_items<T, R>(
    opts: &QueryOptions,
    runner: &R,
    resource: &str,
) -> Result<Vec<T>, MeshError>
where
    T: DeserializeOwned + Default,
    R: ProcessRunner,
{
    let mut argv = vec!["kubectl".to_string()];
    if let Some(path) = &opts.kubeconfig {
        argv.push("--kubeconfig".to_string());
        argv.push(path.display().to_string());
    }
    if let Some(context) = &opts.context {
        argv.push("--context".to_string());
        argv.push(context.clone());
    }
    argv.extend([
        "get".to_string(),
        resource.to_string(),
        "-n".to_string(),
        opts.namespace.clone(),
        "-o".to_string(),
        "json".to_string(),
    ]);
    if let Some(selector) = &opts.selector {
        argv.push("-l".to_string());
        argv.push(selector.clone());
    }

    let output = runner.run(&argv).await.map_err(|e| CommandError::Spawn {
        tool: "kubectl".to_string(),
        message: e.to_string(),
    })?;
    if !output.success() {
        return Err(CommandError::Query {
            resource: resource.to_string(),
            detail: output.detail().to_string(),
        }
        .into());
    }

    let body = if output.stdout.trim().is_empty() {
        "{}"
    } else {
        output.stdout.as_str()
    };
    let payload: KubeList<T> =
        serde_json::from_str(body).map_err(|e| CommandError::Query {
            resource: resource.to_string(),
            detail: format!("unable to parse kubectl output: {e}"),
        })?;
    Ok(payload.items)
}

pub fn format_deployments_table(rows: &[DeploymentRow]) -> String {
    let mut table = vec![vec![
        "NAME".to_string(),
        "READY".to_string(),
        "AVAILABLE".to_string(),
        "IMAGES".to_string(),
    ]];
    for row in rows {
        let images = if row.images.is_empty() {
            "-".to_string()
        } else {
            row.images.join(", ")
        };
        table.push(vec![
            row.name.clone(),
            row.ready.clone(),
            row.available.to_string(),
            images,
        ]);
    }
    format_table(&table)
}

pub fn format_services_table(rows: &[ServiceRow]) -> String {
    let mut table = vec![vec![
        "NAME".to_string(),
        "TYPE".to_string(),
        "CLUSTER IP".to_string(),
        "PORTS".to_string(),
    ]];
    for row in rows {
        table.push(vec![
            row.name.clone(),
            row.service_type.clone(),
            dash_if_empty(&row.cluster_ip),
            dash_if_empty(&row.ports),
        ]);
    }
    format_table(&table)
}

pub fn format_pods_table(rows: &[PodRow]) -> String {
    let mut table = vec![vec![
        "NAME".to_string(),
        "READY".to_string(),
        "STATUS".to_string(),
        "RESTARTS".to_string(),
        "NODE".to_string(),
    ]];
    for row in rows {
        table.push(vec![
            row.name.clone(),
            row.ready.clone(),
            dash_if_empty(&row.phase),
            row.restarts.to_string(),
            dash_if_empty(&row.node),
        ]);
    }
    format_table(&table)
}

fn dash_if_empty(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Left-aligned columns with a two-space gutter and a dash rule under the
/// header row.
fn format_table(rows: &[Vec<String>]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let mut widths = vec![0usize; first.len()];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut lines = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let padded: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
            .collect();
        lines.push(padded.join("  ").trim_end().to_string());
        if idx == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            lines.push(rule.join("  "));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;
    use crate::runner::RunOutput;

    const DEPLOY_JSON: &str = r#"{
      "items": [
        {
          "metadata": {"name": "api"},
          "spec": {"template": {"spec": {"containers": [
            {"image": "registry.local/sample/api:v1"}
          ]}}},
          "status": {"replicas": 2, "readyReplicas": 1, "availableReplicas": 1}
        }
      ]
    }"#;

    const SVC_JSON: &str = r#"{
      "items": [
        {
          "metadata": {"name": "api"},
          "spec": {
            "type": "ClusterIP",
            "clusterIP": "10.96.0.12",
            "ports": [
              {"port": 80, "targetPort": 8080},
              {"port": 443, "targetPort": "https"}
            ]
          }
        }
      ]
    }"#;

    const PODS_JSON: &str = r#"{
      "items": [
        {
          "metadata": {"name": "api-6d5f"},
          "status": {
            "phase": "Running",
            "nodeName": "node-1",
            "containerStatuses": [
              {"ready": true, "restartCount": 2},
              {"ready": false, "restartCount": 1}
            ]
          }
        }
      ]
    }"#;

    fn runner_for(json: &'static str) -> ScriptedRunner {
        ScriptedRunner::with(move |_argv| RunOutput {
            code: 0,
            stdout: json.to_string(),
            stderr: String::new(),
        })
    }

    #[tokio::test]
    async fn test_deployments_projection() {
        let rows = list_deployments(&QueryOptions::default(), &runner_for(DEPLOY_JSON))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "api");
        assert_eq!(rows[0].ready, "1/2");
        assert_eq!(rows[0].available, 1);
        assert_eq!(rows[0].images, vec!["registry.local/sample/api:v1"]);
    }

    #[tokio::test]
    async fn test_services_projection_handles_named_target_port() {
        let rows = list_services(&QueryOptions::default(), &runner_for(SVC_JSON))
            .await
            .unwrap();
        assert_eq!(rows[0].ports, "80->8080, 443->https");
        assert_eq!(rows[0].cluster_ip, "10.96.0.12");
    }

    #[tokio::test]
    async fn test_pods_projection_sums_restarts() {
        let rows = list_pods(&QueryOptions::default(), &runner_for(PODS_JSON))
            .await
            .unwrap();
        assert_eq!(rows[0].ready, "1/2");
        assert_eq!(rows[0].restarts, 3);
        assert_eq!(rows[0].phase, "Running");
        assert_eq!(rows[0].node, "node-1");
    }

    #[tokio::test]
    async fn test_query_uses_namespace_and_selector() {
        let runner = runner_for("{}");
        list_pods(&QueryOptions::default(), &runner).await.unwrap();
        let calls = runner.rendered_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("get pods -n mesh -o json"));
        assert!(calls[0].ends_with("-l component=workload"));
    }

    #[tokio::test]
    async fn test_query_without_selector_drops_the_flag() {
        let runner = runner_for("{}");
        let opts = QueryOptions {
            selector: None,
            ..Default::default()
        };
        list_pods(&opts, &runner).await.unwrap();
        assert!(!runner.rendered_calls()[0].contains("-l "));
    }

    #[tokio::test]
    async fn test_empty_payload_yields_no_rows() {
        let rows = list_deployments(&QueryOptions::default(), &runner_for(""))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_kubectl_failure_surfaces_detail() {
        let runner = ScriptedRunner::failing(1, "forbidden");
        let err = list_services(&QueryOptions::default(), &runner)
            .await
            .unwrap_err();
        match err {
            MeshError::Command(CommandError::Query { resource, detail }) => {
                assert_eq!(resource, "svc");
                assert_eq!(detail, "forbidden");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_table_alignment() {
        let rows = vec![
            DeploymentRow {
                name: "api".to_string(),
                ready: "2/2".to_string(),
                available: 2,
                images: vec!["api:v1".to_string()],
            },
            DeploymentRow {
                name: "longer-name".to_string(),
                ready: "0/1".to_string(),
                available: 0,
                images: vec![],
            },
        ];
        let table = format_deployments_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("NAME         READY"));
        assert!(lines[1].starts_with("-----------  -----"));
        assert!(lines[3].starts_with("longer-name  0/1"));
    }
}
