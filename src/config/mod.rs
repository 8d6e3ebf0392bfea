//! # Deploy manifest model and loader
//!
//! Parses the service deploy manifest (`mesh.yaml`) into a validated,
//! normalized `DeployConfig`. All relative paths in the manifest resolve
//! against the manifest file's own directory, never the process working
//! directory.
//!
//! Manifest surface:
//!
//! ```yaml
//! service:
//!   name: sample-service
//!   type: stateless
//! deploy:
//!   target: kubernetes
//!   namespace: mesh
//! workloads:
//!   - name: sample-service
//!     manifests: [k8s/service.yaml]
//!     image:
//!       repository: sample
//!       tag: local
//!     portForward:
//!       port: 8080
//!       localPort: 18080
//! ```
//!
//! Backward-compatible shorthand: when no `workloads` list is given, one
//! workload is synthesized per entry in `deploy.manifests`, inheriting the
//! top-level service name, mode, and image.

mod validate;

pub use validate::{validate, ValidationResult};

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Scheduling flavor of a service or workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    Stateless,
    Stateful,
}

impl ServiceMode {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_lowercase().as_str() {
            "stateless" => Ok(ServiceMode::Stateless),
            "stateful" => Ok(ServiceMode::Stateful),
            other => Err(ConfigError::InvalidServiceMode {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceMode::Stateless => write!(f, "stateless"),
            ServiceMode::Stateful => write!(f, "stateful"),
        }
    }
}

/// Deployment target. Kubernetes is the only supported backend; `k8s`
/// shorthand in the manifest normalizes to it at load time, so executors
/// never re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployTarget {
    Kubernetes,
}

impl DeployTarget {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(DeployTarget::Kubernetes),
            other => Err(ConfigError::UnsupportedTarget {
                target: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kubernetes")
    }
}

/// Container image reference, rendered as `{registry/}{repository}:{tag}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
    pub registry: Option<String>,
}

impl ImageRef {
    pub fn new(
        repository: impl Into<String>,
        tag: impl Into<String>,
        registry: Option<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            registry,
        }
    }

    pub fn as_string(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}:{}", registry, self.repository, self.tag),
            None => format!("{}:{}", self.repository, self.tag),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

/// Port-forward declaration for a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortForward {
    /// Target cluster service name. Defaults to the workload name.
    pub service: String,
    pub remote_port: u16,
    pub local_port: Option<u16>,
}

impl PortForward {
    /// Local port, defaulting to the remote port at use time.
    pub fn local_or_remote(&self) -> u16 {
        self.local_port.unwrap_or(self.remote_port)
    }
}

/// One deployable unit: a group of manifests plus optional image and
/// port-forward.
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    pub name: String,
    pub mode: ServiceMode,
    /// Resolved absolute manifest paths, in declaration order. Never empty.
    pub manifests: Vec<PathBuf>,
    pub image: Option<ImageRef>,
    pub build_context: Option<PathBuf>,
    pub dockerfile: Option<PathBuf>,
    pub port_forward: Option<PortForward>,
}

impl Workload {
    /// Build context, defaulting to the parent directory of the first
    /// manifest.
    pub fn effective_build_context(&self) -> PathBuf {
        self.build_context.clone().unwrap_or_else(|| {
            self.manifests[0]
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        })
    }

    /// Dockerfile, defaulting to `{context}/Dockerfile`.
    pub fn effective_dockerfile(&self) -> PathBuf {
        self.dockerfile
            .clone()
            .unwrap_or_else(|| self.effective_build_context().join("Dockerfile"))
    }
}

/// Root deployment configuration, immutable once loaded. Overrides produce
/// a new value via `with_namespace` rather than in-place mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployConfig {
    pub service: String,
    pub mode: ServiceMode,
    pub target: DeployTarget,
    pub namespace: Option<String>,
    /// Declaration order, preserved through filtering.
    pub workloads: Vec<Workload>,
}

impl DeployConfig {
    /// Load and normalize the deploy manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let manifest_path = path.canonicalize().map_err(|_| ConfigError::ManifestNotFound {
            path: path.display().to_string(),
        })?;

        let text = fs::read_to_string(&manifest_path).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;

        // An empty manifest file parses as null; treat it like an empty map.
        let raw: RawManifest = serde_yaml::from_str::<Option<RawManifest>>(&text)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })?
            .unwrap_or_default();

        let base_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let service = raw.service.unwrap_or_default();
        let service_name = service
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or(ConfigError::MissingServiceName)?;
        let service_mode = ServiceMode::parse(service.mode.as_deref().unwrap_or(""))?;

        let deploy = raw.deploy.unwrap_or_default();
        let target = DeployTarget::parse(deploy.target.as_deref().unwrap_or("kubernetes"))?;
        let namespace = deploy.namespace;

        let raw_workloads = match raw.workloads {
            Some(list) => list,
            None => synthesize_workloads(&service_name, deploy.manifests)?,
        };

        let mut workloads = Vec::with_capacity(raw_workloads.len());
        for (index, raw_workload) in raw_workloads.into_iter().enumerate() {
            workloads.push(build_workload(
                raw_workload,
                index,
                &service_name,
                service_mode,
                raw.image.as_ref(),
                &base_dir,
            )?);
        }

        Ok(DeployConfig {
            service: service_name,
            mode: service_mode,
            target,
            namespace,
            workloads,
        })
    }

    /// Narrow the workload list to the given names, preserving declaration
    /// order. Every unknown name is reported in one batch error.
    pub fn filter_workloads(&self, names: &[String]) -> Result<Self, ConfigError> {
        if names.is_empty() {
            return Ok(self.clone());
        }

        let known: HashSet<&str> = self.workloads.iter().map(|w| w.name.as_str()).collect();
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::WorkloadsNotFound {
                names: missing.join(", "),
            });
        }

        let workloads = self
            .workloads
            .iter()
            .filter(|w| names.contains(&w.name))
            .cloned()
            .collect();

        Ok(DeployConfig {
            workloads,
            ..self.clone()
        })
    }

    /// Copy-with namespace override.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        DeployConfig {
            namespace: Some(namespace.into()),
            ..self.clone()
        }
    }
}

fn synthesize_workloads(
    service_name: &str,
    manifests: Option<OneOrMany>,
) -> Result<Vec<RawWorkload>, ConfigError> {
    let entries = manifests.map(OneOrMany::into_vec).unwrap_or_default();
    if entries.is_empty() {
        return Err(ConfigError::NoWorkloads);
    }

    Ok(entries
        .into_iter()
        .map(|entry| RawWorkload {
            name: Some(service_name.to_string()),
            manifests: Some(OneOrMany::One(entry)),
            ..RawWorkload::default()
        })
        .collect())
}

fn build_workload(
    raw: RawWorkload,
    index: usize,
    service_name: &str,
    service_mode: ServiceMode,
    service_image: Option<&RawImage>,
    base_dir: &Path,
) -> Result<Workload, ConfigError> {
    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("{}-{}", service_name, index + 1));

    let mode = match raw.mode.as_deref() {
        Some(value) => ServiceMode::parse(value)?,
        None => service_mode,
    };

    let entries = raw.manifests.map(OneOrMany::into_vec).unwrap_or_default();
    if entries.is_empty() {
        return Err(ConfigError::MissingManifest { workload: name });
    }

    let mut manifests = Vec::with_capacity(entries.len());
    for entry in &entries {
        let resolved = resolve_path(base_dir, entry);
        let canonical =
            resolved
                .canonicalize()
                .map_err(|_| ConfigError::ManifestPathNotFound {
                    workload: name.clone(),
                    path: entry.clone(),
                })?;
        manifests.push(canonical);
    }

    let image = raw
        .image
        .as_ref()
        .or(service_image)
        .and_then(|raw_image| raw_image.to_image_ref());

    let build = raw.build.unwrap_or_default();
    let build_context = build.context.map(|c| resolve_path(base_dir, &c));
    let dockerfile = build.dockerfile.map(|d| resolve_path(base_dir, &d));

    let port_forward = match raw.port_forward {
        Some(pf) => Some(build_port_forward(pf, &name)?),
        None => None,
    };

    Ok(Workload {
        name,
        mode,
        manifests,
        image,
        build_context,
        dockerfile,
        port_forward,
    })
}

fn build_port_forward(raw: RawPortForward, workload: &str) -> Result<PortForward, ConfigError> {
    let remote = raw.port.or(raw.target_port).unwrap_or(0);
    let remote_port = port_in_range(remote).ok_or_else(|| ConfigError::InvalidForwardPort {
        workload: workload.to_string(),
    })?;

    let local_port = match raw.local_port {
        Some(value) => Some(port_in_range(value).ok_or_else(|| ConfigError::InvalidForwardPort {
            workload: workload.to_string(),
        })?),
        None => None,
    };

    let service = raw
        .service
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| workload.to_string());

    Ok(PortForward {
        service,
        remote_port,
        local_port,
    })
}

fn port_in_range(value: i64) -> Option<u16> {
    if (1..=65535).contains(&value) {
        Some(value as u16)
    } else {
        None
    }
}

fn resolve_path(base_dir: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

// Raw serde mirror of the YAML manifest. Normalization into the domain
// types above happens in one pass so the rest of the crate never sees
// these.

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    service: Option<RawService>,
    deploy: Option<RawDeploy>,
    image: Option<RawImage>,
    workloads: Option<Vec<RawWorkload>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawService {
    name: Option<String>,
    #[serde(rename = "type", alias = "mode")]
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDeploy {
    target: Option<String>,
    namespace: Option<String>,
    #[serde(alias = "manifest")]
    manifests: Option<OneOrMany>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWorkload {
    name: Option<String>,
    #[serde(rename = "type", alias = "mode")]
    mode: Option<String>,
    #[serde(alias = "manifest", alias = "path")]
    manifests: Option<OneOrMany>,
    image: Option<RawImage>,
    build: Option<RawBuild>,
    #[serde(rename = "portForward", alias = "port_forward")]
    port_forward: Option<RawPortForward>,
}

#[derive(Debug, Default, Deserialize)]
struct RawImage {
    #[serde(alias = "name")]
    repository: Option<String>,
    tag: Option<String>,
    registry: Option<String>,
}

impl RawImage {
    fn to_image_ref(&self) -> Option<ImageRef> {
        let repository = self.repository.clone()?;
        Some(ImageRef {
            repository,
            tag: self.tag.clone().unwrap_or_else(|| "latest".to_string()),
            registry: self.registry.clone(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawBuild {
    context: Option<String>,
    dockerfile: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPortForward {
    service: Option<String>,
    port: Option<i64>,
    #[serde(rename = "targetPort")]
    target_port: Option<i64>,
    #[serde(rename = "localPort", alias = "local_port")]
    local_port: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}
