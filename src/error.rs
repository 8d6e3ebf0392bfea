//! Centralized error types for meshctl
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.

use thiserror::Error;

/// Top-level error type for meshctl operations
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Manifest and configuration errors. Always fatal to the current
/// command; never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Deploy manifest not found at {path}. Add one or pass --manifest")]
    ManifestNotFound { path: String },

    #[error("Unable to parse YAML manifest: {message}")]
    ParseError { message: String },

    #[error("service.name is required in the deploy manifest")]
    MissingServiceName,

    #[error("service.type must be 'stateless' or 'stateful', got '{value}'")]
    InvalidServiceMode { value: String },

    #[error("Unsupported deploy target '{target}'. Only kubernetes is supported right now")]
    UnsupportedTarget { target: String },

    #[error("Define 'workloads' or 'deploy.manifests' in the deploy manifest")]
    NoWorkloads,

    #[error("Workload '{workload}' is missing a manifest path")]
    MissingManifest { workload: String },

    #[error("Manifest path not found for workload '{workload}': {path}")]
    ManifestPathNotFound { workload: String, path: String },

    #[error("Workload '{workload}' portForward.port/targetPort must be set")]
    InvalidForwardPort { workload: String },

    #[error("Workloads not found: {names}")]
    WorkloadsNotFound { names: String },

    #[error("Workload '{workload}' is missing an image definition")]
    MissingImage { workload: String },

    #[error("talosconfig not found at {path}")]
    TalosconfigNotFound { path: String },

    #[error("Unable to parse talosconfig at {path}: {message}")]
    TalosconfigParse { path: String, message: String },

    #[error("No endpoints supplied and none found in talosconfig")]
    NoEndpoints,
}

/// External process errors. Abort the remaining steps in the batch
/// and surface exit code plus captured output to the user.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{tool} {verb} failed for workload '{workload}' (exit {code}): {detail}")]
    Failed {
        tool: String,
        verb: String,
        workload: String,
        code: i32,
        detail: String,
    },

    #[error("talosctl kubeconfig failed (exit {code}): {detail}")]
    KubeconfigFailed { code: i32, detail: String },

    #[error("kubectl get {resource} failed: {detail}")]
    Query { resource: String, detail: String },

    #[error("Failed to launch {tool}: {message}")]
    Spawn { tool: String, message: String },

    #[error("{action} requires command(s) on PATH: {missing}")]
    MissingTools { action: String, missing: String },
}

/// Invalid discovery parameters, caught before any probing starts.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid port {port}; must be between 1 and 65535")]
    InvalidPort { port: u16 },

    #[error("max_hosts must be greater than zero")]
    InvalidHostCap,

    #[error("Invalid CIDR '{cidr}': {message}")]
    InvalidCidr { cidr: String, message: String },
}
