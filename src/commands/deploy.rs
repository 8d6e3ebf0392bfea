//! Deploy and destroy executors.
//!
//! Both walk the workloads in declaration order and feed each manifest to
//! kubectl one at a time. The first failure aborts the batch; anything
//! already applied stays applied. Port-forward tunnels are launched right
//! after their workload's manifests land, so a broken tunnel stops the run
//! before later workloads are touched. When any step fails, tunnels that
//! were already launched are stopped before the error returns; the caller
//! only ever owns tunnels from a run that completed.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{DeployConfig, PortForward};
use crate::error::{CommandError, MeshError};
use crate::forward::{self, PortForwardHandle, TunnelSpawner};
use crate::runner::{render_command, ProcessRunner};
use crate::ui::{Reporter, StepStatus};

/// Flags shared by every kubectl-backed verb.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub dry_run: bool,
    pub verbose: bool,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

/// What a deploy run produced: the rendered command list plus any live
/// tunnels the caller now owns.
#[derive(Debug)]
pub struct DeployOutcome {
    pub commands: Vec<String>,
    pub forwards: Vec<PortForwardHandle>,
}

pub async fn deploy<R, S>(
    config: &DeployConfig,
    runner: &R,
    spawner: &S,
    reporter: &Reporter,
    opts: &ExecOptions,
    port_forward: bool,
) -> Result<DeployOutcome, MeshError>
where
    R: ProcessRunner,
    S: TunnelSpawner,
{
    let mut outcome = DeployOutcome {
        commands: Vec::new(),
        forwards: Vec::new(),
    };

    for workload in &config.workloads {
        for manifest in &workload.manifests {
            let argv = manifest_argv(opts, "apply", manifest, config.namespace.as_deref());
            let rendered = render_command(&argv);
            outcome.commands.push(rendered.clone());

            let step = reporter.begin(format!(
                "apply {} ({})",
                manifest_label(manifest),
                workload.name
            ));
            if opts.dry_run {
                step.done(StepStatus::Skipped);
                continue;
            }

            debug!(command = %rendered, "applying manifest");
            match run_kubectl(runner, &argv).await {
                Ok(output) if output.success() => {
                    step.done(StepStatus::Ok);
                    if opts.verbose {
                        reporter.note(&output.stdout);
                        reporter.note(&output.stderr);
                    }
                }
                Ok(output) => {
                    step.done(StepStatus::Failed);
                    forward::stop_all(&mut outcome.forwards).await;
                    return Err(CommandError::Failed {
                        tool: "kubectl".to_string(),
                        verb: "apply".to_string(),
                        workload: workload.name.clone(),
                        code: output.code,
                        detail: output.detail().to_string(),
                    }
                    .into());
                }
                Err(e) => {
                    step.done(StepStatus::Failed);
                    forward::stop_all(&mut outcome.forwards).await;
                    return Err(e.into());
                }
            }
        }

        if port_forward {
            if let Some(pf) = &workload.port_forward {
                let argv = forward_argv(opts, pf, config.namespace.as_deref());
                let rendered = render_command(&argv);
                outcome.commands.push(rendered.clone());

                let step = reporter.begin(format!(
                    "port-forward svc/{} ({})",
                    pf.service, workload.name
                ));
                if opts.dry_run {
                    step.done(StepStatus::Skipped);
                    continue;
                }

                let child = match spawner.spawn(&argv) {
                    Ok(child) => child,
                    Err(e) => {
                        step.done(StepStatus::Failed);
                        forward::stop_all(&mut outcome.forwards).await;
                        return Err(e.into());
                    }
                };
                let mut handle = PortForwardHandle::new(rendered, child);
                if let Err(e) = handle.check_startup().await {
                    step.done(StepStatus::Failed);
                    handle.stop().await;
                    forward::stop_all(&mut outcome.forwards).await;
                    return Err(e.into());
                }
                step.done(StepStatus::Running);
                outcome.forwards.push(handle);
            }
        }
    }

    Ok(outcome)
}

/// Deletes every manifest in the same order apply used.
pub async fn destroy<R>(
    config: &DeployConfig,
    runner: &R,
    reporter: &Reporter,
    opts: &ExecOptions,
) -> Result<Vec<String>, MeshError>
where
    R: ProcessRunner,
{
    let mut commands = Vec::new();
    for workload in &config.workloads {
        for manifest in &workload.manifests {
            let argv = manifest_argv(opts, "delete", manifest, config.namespace.as_deref());
            let rendered = render_command(&argv);
            commands.push(rendered.clone());

            let step = reporter.begin(format!(
                "delete {} ({})",
                manifest_label(manifest),
                workload.name
            ));
            if opts.dry_run {
                step.done(StepStatus::Skipped);
                continue;
            }

            debug!(command = %rendered, "deleting manifest");
            match run_kubectl(runner, &argv).await {
                Ok(output) if output.success() => {
                    step.done(StepStatus::Ok);
                    if opts.verbose {
                        reporter.note(&output.stdout);
                        reporter.note(&output.stderr);
                    }
                }
                Ok(output) => {
                    step.done(StepStatus::Failed);
                    return Err(CommandError::Failed {
                        tool: "kubectl".to_string(),
                        verb: "delete".to_string(),
                        workload: workload.name.clone(),
                        code: output.code,
                        detail: output.detail().to_string(),
                    }
                    .into());
                }
                Err(e) => {
                    step.done(StepStatus::Failed);
                    return Err(e.into());
                }
            }
        }
    }

    Ok(commands)
}

pub fn kubectl_base(opts: &ExecOptions) -> Vec<String> {
    let mut argv = vec!["kubectl".to_string()];
    if let Some(path) = &opts.kubeconfig {
        argv.push("--kubeconfig".to_string());
        argv.push(path.display().to_string());
    }
    if let Some(context) = &opts.context {
        argv.push("--context".to_string());
        argv.push(context.clone());
    }
    argv
}

fn manifest_argv(
    opts: &ExecOptions,
    verb: &str,
    manifest: &Path,
    namespace: Option<&str>,
) -> Vec<String> {
    let mut argv = kubectl_base(opts);
    argv.push(verb.to_string());
    argv.push("-f".to_string());
    argv.push(manifest.display().to_string());
    if let Some(ns) = namespace {
        argv.push("-n".to_string());
        argv.push(ns.to_string());
    }
    argv
}

fn forward_argv(opts: &ExecOptions, pf: &PortForward, namespace: Option<&str>) -> Vec<String> {
    let mut argv = kubectl_base(opts);
    argv.push("port-forward".to_string());
    argv.push(format!("svc/{}", pf.service));
    argv.push(format!("{}:{}", pf.local_or_remote(), pf.remote_port));
    if let Some(ns) = namespace {
        argv.push("-n".to_string());
        argv.push(ns.to_string());
    }
    argv
}

fn manifest_label(manifest: &Path) -> String {
    manifest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| manifest.display().to_string())
}

async fn run_kubectl<R: ProcessRunner>(
    runner: &R,
    argv: &[String],
) -> Result<crate::runner::RunOutput, CommandError> {
    runner.run(argv).await.map_err(|e| CommandError::Spawn {
        tool: "kubectl".to_string(),
        message: e.to_string(),
    })
}
