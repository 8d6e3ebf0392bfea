use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod discovery;
mod error;
mod forward;
mod plan;
mod runner;
mod ui;

use std::path::Path;
use std::time::Duration;

use cli::{Cli, Commands, QueryArgs};
use commands::deploy::{self, ExecOptions};
use commands::{images, kubeconfig, status};
use config::DeployConfig;
use forward::SystemSpawner;
use runner::{require_tools, SystemRunner};
use ui::Reporter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false)
        .init();

    let reporter = Reporter::auto();
    if let Err(e) = run(cli, &reporter).await {
        ui::print_error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, reporter: &Reporter) -> Result<()> {
    let verbose = cli.verbose;

    match cli.command {
        Commands::Validate { manifest, json } => {
            let config = DeployConfig::load(&manifest)?;
            let result = config::validate(&config);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for warning in &result.warnings {
                    ui::print_warning(warning);
                }
                for error in &result.errors {
                    ui::print_error(error);
                }
                if result.ok() {
                    ui::print_success(&format!("{} is valid", manifest.display()));
                }
            }
            if !result.ok() {
                anyhow::bail!("manifest validation failed");
            }
        }

        Commands::Deploy {
            manifest,
            dry_run,
            port_forward,
            workloads,
            kubeconfig,
            context,
            namespace,
        } => {
            let config = load_config(&manifest, &workloads, namespace.as_deref())?;
            if dry_run || verbose {
                println!("{}\n", plan::format_plan(&config));
            }
            if !dry_run {
                require_tools(&["kubectl"], "deploy")?;
            }

            let opts = ExecOptions {
                dry_run,
                verbose,
                kubeconfig,
                context,
            };
            let mut outcome = deploy::deploy(
                &config,
                &SystemRunner,
                &SystemSpawner,
                reporter,
                &opts,
                port_forward,
            )
            .await?;
            reporter.summarize();
            print_commands(
                if dry_run {
                    "Planned commands:"
                } else {
                    "Executed commands:"
                },
                &outcome.commands,
            );

            if !outcome.forwards.is_empty() {
                ui::print_info("Port-forward tunnels running. Press Ctrl-C to stop.");
                forward::wait_on_forwards(&mut outcome.forwards, Duration::from_secs(1)).await;
            }
        }

        Commands::Destroy {
            manifest,
            dry_run,
            workloads,
            kubeconfig,
            context,
            namespace,
        } => {
            let config = load_config(&manifest, &workloads, namespace.as_deref())?;
            if dry_run || verbose {
                println!("{}\n", plan::format_plan(&config));
            }
            if !dry_run {
                require_tools(&["kubectl"], "destroy")?;
            }

            let opts = ExecOptions {
                dry_run,
                verbose,
                kubeconfig,
                context,
            };
            let commands = deploy::destroy(&config, &SystemRunner, reporter, &opts).await?;
            reporter.summarize();
            print_commands(
                if dry_run {
                    "Planned commands:"
                } else {
                    "Executed commands:"
                },
                &commands,
            );
        }

        Commands::Build {
            manifest,
            dry_run,
            workloads,
        } => {
            let config = load_config(&manifest, &workloads, None)?;
            if !dry_run {
                require_tools(&["docker"], "build")?;
            }
            let opts = images::ImageOptions { dry_run, verbose };
            let commands = images::build_images(&config, &SystemRunner, reporter, opts).await?;
            reporter.summarize();
            print_commands("Image commands:", &commands);
        }

        Commands::Push {
            manifest,
            dry_run,
            workloads,
        } => {
            let config = load_config(&manifest, &workloads, None)?;
            if !dry_run {
                require_tools(&["docker"], "push")?;
            }
            let opts = images::ImageOptions { dry_run, verbose };
            let commands = images::push_images(&config, &SystemRunner, reporter, opts).await?;
            reporter.summarize();
            print_commands("Image commands:", &commands);
        }

        Commands::Publish {
            manifest,
            dry_run,
            workloads,
        } => {
            let config = load_config(&manifest, &workloads, None)?;
            if !dry_run {
                require_tools(&["docker"], "publish")?;
            }
            let opts = images::ImageOptions { dry_run, verbose };
            let commands = images::publish_images(&config, &SystemRunner, reporter, opts).await?;
            reporter.summarize();
            print_commands("Image commands:", &commands);
        }

        Commands::Kubeconfig {
            talosconfig,
            endpoints,
            nodes,
            out,
            force,
            dry_run,
            discover_cidrs,
            discover_port,
            discover_timeout,
            max_hosts,
        } => {
            if !dry_run {
                require_tools(&["talosctl"], "kubeconfig")?;
            }
            let opts = kubeconfig::KubeconfigOptions {
                talosconfig,
                endpoints,
                nodes,
                out: out.unwrap_or_else(kubeconfig::default_kubeconfig_path),
                force,
                dry_run,
                discover_cidrs,
                discover_port,
                discover_timeout,
                max_hosts,
            };
            let result = kubeconfig::generate(&opts, &SystemRunner, reporter).await?;
            reporter.summarize();
            if dry_run {
                ui::print_info(&format!("Planned: {}", result.command));
            } else {
                ui::print_success(&format!("Wrote kubeconfig to {}", result.path.display()));
            }
        }

        Commands::Deployments { query } => {
            require_tools(&["kubectl"], "deployments")?;
            let rows = status::list_deployments(&query_options(&query), &SystemRunner).await?;
            if query.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", status::format_deployments_table(&rows));
            }
        }

        Commands::Services { query } => {
            require_tools(&["kubectl"], "services")?;
            let rows = status::list_services(&query_options(&query), &SystemRunner).await?;
            if query.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", status::format_services_table(&rows));
            }
        }

        Commands::Status { query } => {
            require_tools(&["kubectl"], "status")?;
            let json = query.json;
            let report = status::gather(&query_options(&query), &SystemRunner, reporter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Deployments");
                println!("{}\n", status::format_deployments_table(&report.deployments));
                println!("Services");
                println!("{}\n", status::format_services_table(&report.services));
                println!("Pods");
                println!("{}", status::format_pods_table(&report.pods));
            }
        }
    }

    Ok(())
}

fn load_config(
    manifest: &Path,
    workloads: &[String],
    namespace: Option<&str>,
) -> Result<DeployConfig, error::MeshError> {
    let mut config = DeployConfig::load(manifest)?;
    if !workloads.is_empty() {
        config = config.filter_workloads(workloads)?;
    }
    if let Some(ns) = namespace {
        config = config.with_namespace(ns);
    }
    Ok(config)
}

fn query_options(args: &QueryArgs) -> status::QueryOptions {
    status::QueryOptions {
        namespace: args.namespace.clone(),
        selector: if args.all {
            None
        } else {
            Some(args.selector.clone())
        },
        kubeconfig: args.kubeconfig.clone(),
        context: args.context.clone(),
    }
}

fn print_commands(heading: &str, commands: &[String]) {
    if commands.is_empty() {
        return;
    }
    println!("{heading}");
    for command in commands {
        println!("  {command}");
    }
}
