//! Image build, push, and publish executors.
//!
//! Each verb is a whole-batch pass over the workloads: publish runs a full
//! build pass and only then a full push pass, so nothing is pushed if any
//! build fails. Every workload must carry an image definition before any
//! docker command runs.

use tracing::debug;

use crate::config::{DeployConfig, Workload};
use crate::error::{CommandError, ConfigError, MeshError};
use crate::runner::{render_command, ProcessRunner};
use crate::ui::{Reporter, StepStatus};

/// Flags shared by every docker-backed verb.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageOptions {
    pub dry_run: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DockerVerb {
    Build,
    Push,
}

impl DockerVerb {
    fn as_str(self) -> &'static str {
        match self {
            DockerVerb::Build => "build",
            DockerVerb::Push => "push",
        }
    }
}

pub async fn build_images<R: ProcessRunner>(
    config: &DeployConfig,
    runner: &R,
    reporter: &Reporter,
    opts: ImageOptions,
) -> Result<Vec<String>, MeshError> {
    require_images(config)?;
    run_pass(config, runner, reporter, opts, DockerVerb::Build).await
}

pub async fn push_images<R: ProcessRunner>(
    config: &DeployConfig,
    runner: &R,
    reporter: &Reporter,
    opts: ImageOptions,
) -> Result<Vec<String>, MeshError> {
    require_images(config)?;
    run_pass(config, runner, reporter, opts, DockerVerb::Push).await
}

/// Build everything, then push everything.
pub async fn publish_images<R: ProcessRunner>(
    config: &DeployConfig,
    runner: &R,
    reporter: &Reporter,
    opts: ImageOptions,
) -> Result<Vec<String>, MeshError> {
    require_images(config)?;
    let mut commands = run_pass(config, runner, reporter, opts, DockerVerb::Build).await?;
    commands.extend(run_pass(config, runner, reporter, opts, DockerVerb::Push).await?);
    Ok(commands)
}

fn require_images(config: &DeployConfig) -> Result<(), ConfigError> {
    for workload in &config.workloads {
        if workload.image.is_none() {
            return Err(ConfigError::MissingImage {
                workload: workload.name.clone(),
            });
        }
    }
    Ok(())
}

async fn run_pass<R: ProcessRunner>(
    config: &DeployConfig,
    runner: &R,
    reporter: &Reporter,
    opts: ImageOptions,
    verb: DockerVerb,
) -> Result<Vec<String>, MeshError> {
    let mut commands = Vec::new();

    for workload in &config.workloads {
        // require_images ran first, so the image is always present here
        let Some(image) = &workload.image else {
            continue;
        };
        let argv = docker_argv(workload, &image.as_string(), verb);
        let rendered = render_command(&argv);
        commands.push(rendered.clone());

        let step = reporter.begin(format!("{} {}", verb.as_str(), image.as_string()));
        if opts.dry_run {
            step.done(StepStatus::Skipped);
            continue;
        }

        debug!(command = %rendered, "running docker");
        let output = runner.run(&argv).await.map_err(|e| CommandError::Spawn {
            tool: "docker".to_string(),
            message: e.to_string(),
        })?;
        if !output.success() {
            step.done(StepStatus::Failed);
            return Err(CommandError::Failed {
                tool: "docker".to_string(),
                verb: verb.as_str().to_string(),
                workload: workload.name.clone(),
                code: output.code,
                detail: output.detail().to_string(),
            }
            .into());
        }
        step.done(StepStatus::Ok);
        if opts.verbose {
            reporter.note(&output.stdout);
            reporter.note(&output.stderr);
        }
    }

    Ok(commands)
}

fn docker_argv(workload: &Workload, image: &str, verb: DockerVerb) -> Vec<String> {
    match verb {
        DockerVerb::Build => vec![
            "docker".to_string(),
            "build".to_string(),
            "-t".to_string(),
            image.to_string(),
            "-f".to_string(),
            workload.effective_dockerfile().display().to_string(),
            workload.effective_build_context().display().to_string(),
        ],
        DockerVerb::Push => vec!["docker".to_string(), "push".to_string(), image.to_string()],
    }
}
