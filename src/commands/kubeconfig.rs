//! Kubeconfig generation for Talos-backed clusters.
//!
//! Resolves the talosconfig (searching upward from the working directory
//! for relative paths), derives endpoints and nodes from its active
//! context, optionally falls back to network discovery, then shells out to
//! `talosctl kubeconfig`.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::discovery;
use crate::error::{CommandError, ConfigError, MeshError};
use crate::runner::{render_command, ProcessRunner};
use crate::ui::{Reporter, StepStatus};

#[derive(Debug, Clone)]
pub struct KubeconfigOptions {
    pub talosconfig: PathBuf,
    pub endpoints: Vec<String>,
    pub nodes: Vec<String>,
    pub out: PathBuf,
    pub force: bool,
    pub dry_run: bool,
    pub discover_cidrs: Vec<String>,
    pub discover_port: u16,
    pub discover_timeout: Duration,
    pub max_hosts: usize,
}

impl Default for KubeconfigOptions {
    fn default() -> Self {
        Self {
            talosconfig: PathBuf::from("clusterconfig/talosconfig"),
            endpoints: Vec::new(),
            nodes: Vec::new(),
            out: default_kubeconfig_path(),
            force: false,
            dry_run: false,
            discover_cidrs: Vec::new(),
            discover_port: discovery::DEFAULT_PROBE_PORT,
            discover_timeout: discovery::DEFAULT_PROBE_TIMEOUT,
            max_hosts: discovery::DEFAULT_MAX_HOSTS,
        }
    }
}

#[derive(Debug)]
pub struct KubeconfigResult {
    pub path: PathBuf,
    pub endpoints: Vec<String>,
    pub nodes: Vec<String>,
    pub command: String,
}

/// Raw talosconfig surface, just enough to derive endpoints and nodes.
#[derive(Debug, Default, Deserialize)]
struct TalosConfigFile {
    context: Option<String>,
    #[serde(default)]
    contexts: HashMap<String, TalosContextEntry>,
    #[serde(default)]
    endpoints: Vec<String>,
    #[serde(default)]
    nodes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TalosContextEntry {
    #[serde(default)]
    endpoints: Vec<String>,
    #[serde(default)]
    nodes: Vec<String>,
}

impl TalosConfigFile {
    /// Active-context endpoints/nodes, falling back to the top level.
    fn derived(&self) -> (Vec<String>, Vec<String>) {
        let entry = self
            .context
            .as_ref()
            .and_then(|name| self.contexts.get(name));
        let endpoints = entry
            .map(|e| e.endpoints.clone())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.endpoints.clone());
        let nodes = entry
            .map(|e| e.nodes.clone())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.nodes.clone());
        (non_blank(endpoints), non_blank(nodes))
    }
}

fn non_blank(values: Vec<String>) -> Vec<String> {
    values.into_iter().filter(|v| !v.trim().is_empty()).collect()
}

pub async fn generate<R: ProcessRunner>(
    opts: &KubeconfigOptions,
    runner: &R,
    reporter: &Reporter,
) -> Result<KubeconfigResult, MeshError> {
    let base_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let talosconfig = resolve_talosconfig(&opts.talosconfig, &base_dir);
    if !talosconfig.exists() {
        return Err(ConfigError::TalosconfigNotFound {
            path: talosconfig.display().to_string(),
        }
        .into());
    }

    let parsed = load_talosconfig(&talosconfig)?;
    let (derived_endpoints, derived_nodes) = parsed.derived();

    let mut endpoints = if opts.endpoints.is_empty() {
        derived_endpoints
    } else {
        opts.endpoints.clone()
    };
    let mut nodes = if opts.nodes.is_empty() {
        derived_nodes
    } else {
        opts.nodes.clone()
    };

    if endpoints.is_empty() && !opts.discover_cidrs.is_empty() {
        debug!(cidrs = ?opts.discover_cidrs, "no endpoints configured, probing network");
        let mut found = discovery::discover_endpoints(
            &opts.discover_cidrs,
            opts.discover_port,
            opts.discover_timeout,
            opts.max_hosts,
            discovery::DEFAULT_MAX_WORKERS,
        )
        .await?;
        // stable CSV for talosctl
        found.sort();
        endpoints = found.iter().map(|ip| ip.to_string()).collect();
        if nodes.is_empty() {
            nodes = endpoints.clone();
        }
    }

    if endpoints.is_empty() {
        return Err(ConfigError::NoEndpoints.into());
    }
    if nodes.is_empty() {
        nodes = endpoints.clone();
    }

    let out_path = expand_home(&opts.out);
    if let Some(parent) = out_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut argv = vec![
        "talosctl".to_string(),
        "--talosconfig".to_string(),
        talosconfig.display().to_string(),
        "--endpoints".to_string(),
        endpoints.join(","),
        "--nodes".to_string(),
        nodes.join(","),
        "kubeconfig".to_string(),
        out_path.display().to_string(),
    ];
    if opts.force {
        argv.push("--force".to_string());
    }
    let command = render_command(&argv);

    let step = reporter.begin(format!("generate kubeconfig at {}", out_path.display()));
    if opts.dry_run {
        step.done(StepStatus::Skipped);
        return Ok(KubeconfigResult {
            path: out_path,
            endpoints,
            nodes,
            command,
        });
    }

    let output = runner.run(&argv).await.map_err(|e| CommandError::Spawn {
        tool: "talosctl".to_string(),
        message: e.to_string(),
    })?;
    if !output.success() {
        step.done(StepStatus::Failed);
        return Err(CommandError::KubeconfigFailed {
            code: output.code,
            detail: output.detail().to_string(),
        }
        .into());
    }
    step.done(StepStatus::Ok);

    restrict_permissions(&out_path);

    Ok(KubeconfigResult {
        path: out_path,
        endpoints,
        nodes,
        command,
    })
}

fn load_talosconfig(path: &Path) -> Result<TalosConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::TalosconfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let parsed: Option<TalosConfigFile> =
        serde_yaml::from_str(&text).map_err(|e| ConfigError::TalosconfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(parsed.unwrap_or_default())
}

/// Relative paths are searched upward from `base_dir`; the first hit wins.
/// A miss resolves against `base_dir` so the not-found error names a
/// concrete path.
fn resolve_talosconfig(path: &Path, base_dir: &Path) -> PathBuf {
    let candidate = expand_home(path);
    if candidate.is_absolute() {
        return candidate;
    }

    let mut root = Some(base_dir);
    while let Some(dir) = root {
        let probe = dir.join(&candidate);
        if probe.exists() {
            return probe;
        }
        root = dir.parent();
    }

    base_dir.join(candidate)
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

pub fn default_kubeconfig_path() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".kube").join("config"),
        None => PathBuf::from(".kube/config"),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE_TALOSCONFIG: &str = r#"
context: admin@mesh
contexts:
  admin@mesh:
    endpoints:
      - 10.0.0.5
      - 10.0.0.6
    nodes:
      - 10.0.0.5
"#;

    fn write_talosconfig(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("talosconfig");
        fs::write(&path, content).unwrap();
        path
    }

    fn opts_for(talosconfig: PathBuf, out: &TempDir) -> KubeconfigOptions {
        KubeconfigOptions {
            talosconfig,
            out: out.path().join("kubeconfig"),
            ..Default::default()
        }
    }

    #[test]
    fn test_derives_endpoints_from_active_context() {
        let parsed: TalosConfigFile = serde_yaml::from_str(SAMPLE_TALOSCONFIG).unwrap();
        let (endpoints, nodes) = parsed.derived();
        assert_eq!(endpoints, vec!["10.0.0.5", "10.0.0.6"]);
        assert_eq!(nodes, vec!["10.0.0.5"]);
    }

    #[test]
    fn test_falls_back_to_top_level_endpoints() {
        let parsed: TalosConfigFile =
            serde_yaml::from_str("endpoints:\n  - 192.168.0.1\n").unwrap();
        let (endpoints, nodes) = parsed.derived();
        assert_eq!(endpoints, vec!["192.168.0.1"]);
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_resolve_searches_parent_directories() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join("talosconfig"), "context: x\n").unwrap();

        let resolved = resolve_talosconfig(Path::new("talosconfig"), &nested);
        assert_eq!(resolved, root.path().join("talosconfig"));
    }

    #[tokio::test]
    async fn test_generate_renders_talosctl_command() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let talosconfig = write_talosconfig(&dir, SAMPLE_TALOSCONFIG);
        let runner = ScriptedRunner::succeeding();

        let result = generate(&opts_for(talosconfig, &out), &runner, &Reporter::quiet())
            .await
            .unwrap();

        assert_eq!(runner.call_count(), 1);
        assert!(result.command.contains("--endpoints 10.0.0.5,10.0.0.6"));
        assert!(result.command.contains("--nodes 10.0.0.5"));
        assert!(result.command.contains("kubeconfig"));
        assert!(!result.command.contains("--force"));
    }

    #[tokio::test]
    async fn test_explicit_endpoints_override_talosconfig() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let talosconfig = write_talosconfig(&dir, SAMPLE_TALOSCONFIG);
        let runner = ScriptedRunner::succeeding();
        let mut opts = opts_for(talosconfig, &out);
        opts.endpoints = vec!["172.16.0.9".to_string()];
        opts.nodes = Vec::new();
        opts.force = true;

        let result = generate(&opts, &runner, &Reporter::quiet()).await.unwrap();

        assert_eq!(result.endpoints, vec!["172.16.0.9"]);
        assert!(result.command.contains("--endpoints 172.16.0.9"));
        assert!(result.command.ends_with("--force"));
    }

    #[tokio::test]
    async fn test_nodes_default_to_endpoints() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let talosconfig =
            write_talosconfig(&dir, "context: x\ncontexts:\n  x:\n    endpoints: [10.1.1.1]\n");
        let runner = ScriptedRunner::succeeding();

        let result = generate(
            &opts_for(talosconfig, &out),
            &runner,
            &Reporter::quiet(),
        )
        .await
        .unwrap();

        assert_eq!(result.nodes, vec!["10.1.1.1"]);
    }

    #[tokio::test]
    async fn test_missing_talosconfig_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let runner = ScriptedRunner::succeeding();
        let opts = opts_for(dir.path().join("absent/talosconfig"), &out);

        let err = generate(&opts, &runner, &Reporter::quiet())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MeshError::Config(ConfigError::TalosconfigNotFound { .. })
        ));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_endpoints_anywhere_is_rejected() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let talosconfig = write_talosconfig(&dir, "context: x\n");
        let runner = ScriptedRunner::succeeding();

        let err = generate(
            &opts_for(talosconfig, &out),
            &runner,
            &Reporter::quiet(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MeshError::Config(ConfigError::NoEndpoints)));
    }

    #[tokio::test]
    async fn test_talosctl_failure_surfaces_exit_code() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let talosconfig = write_talosconfig(&dir, SAMPLE_TALOSCONFIG);
        let runner = ScriptedRunner::failing(3, "certificate expired");

        let err = generate(
            &opts_for(talosconfig, &out),
            &runner,
            &Reporter::quiet(),
        )
        .await
        .unwrap_err();

        match err {
            MeshError::Command(CommandError::KubeconfigFailed { code, detail }) => {
                assert_eq!(code, 3);
                assert!(detail.contains("certificate expired"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_dry_run_skips_execution() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let talosconfig = write_talosconfig(&dir, SAMPLE_TALOSCONFIG);
        let runner = ScriptedRunner::succeeding();
        let mut opts = opts_for(talosconfig, &out);
        opts.dry_run = true;

        let result = generate(&opts, &runner, &Reporter::quiet()).await.unwrap();

        assert_eq!(runner.call_count(), 0);
        assert!(result.command.starts_with("talosctl --talosconfig"));
    }
}
