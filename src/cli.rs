//! CLI definitions for meshctl
//!
//! This module contains all CLI argument parsing structures using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "meshctl",
    version,
    about = "Deployment helper for mesh services on Kubernetes",
    long_about = "Parses a declarative deploy manifest and drives kubectl, docker,\nand talosctl so deployments stay reproducible and scriptable."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the deploy manifest without touching the cluster
    Validate {
        /// Path to the deploy manifest
        #[arg(short = 'f', long, default_value = "mesh.yaml")]
        manifest: PathBuf,

        /// Emit the validation result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply workload manifests to the cluster
    Deploy {
        /// Path to the deploy manifest
        #[arg(short = 'f', long, default_value = "mesh.yaml")]
        manifest: PathBuf,

        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,

        /// Start kubectl port-forward tunnels after applying
        #[arg(long)]
        port_forward: bool,

        /// Deploy only the named workloads (repeatable)
        #[arg(short = 'w', long = "workload")]
        workloads: Vec<String>,

        /// Kubeconfig passed to kubectl
        #[arg(long)]
        kubeconfig: Option<PathBuf>,

        /// Kubectl context
        #[arg(long)]
        context: Option<String>,

        /// Override the manifest's namespace
        #[arg(short = 'n', long)]
        namespace: Option<String>,
    },

    /// Delete workload manifests from the cluster
    Destroy {
        /// Path to the deploy manifest
        #[arg(short = 'f', long, default_value = "mesh.yaml")]
        manifest: PathBuf,

        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,

        /// Destroy only the named workloads (repeatable)
        #[arg(short = 'w', long = "workload")]
        workloads: Vec<String>,

        /// Kubeconfig passed to kubectl
        #[arg(long)]
        kubeconfig: Option<PathBuf>,

        /// Kubectl context
        #[arg(long)]
        context: Option<String>,

        /// Override the manifest's namespace
        #[arg(short = 'n', long)]
        namespace: Option<String>,
    },

    /// Build workload images with docker
    Build {
        /// Path to the deploy manifest
        #[arg(short = 'f', long, default_value = "mesh.yaml")]
        manifest: PathBuf,

        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,

        /// Build only the named workloads (repeatable)
        #[arg(short = 'w', long = "workload")]
        workloads: Vec<String>,
    },

    /// Push workload images to their registry
    Push {
        /// Path to the deploy manifest
        #[arg(short = 'f', long, default_value = "mesh.yaml")]
        manifest: PathBuf,

        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,

        /// Push only the named workloads (repeatable)
        #[arg(short = 'w', long = "workload")]
        workloads: Vec<String>,
    },

    /// Build then push every workload image
    Publish {
        /// Path to the deploy manifest
        #[arg(short = 'f', long, default_value = "mesh.yaml")]
        manifest: PathBuf,

        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,

        /// Publish only the named workloads (repeatable)
        #[arg(short = 'w', long = "workload")]
        workloads: Vec<String>,
    },

    /// Generate a kubeconfig with talosctl
    Kubeconfig {
        /// Path to talosconfig, searched upward when relative
        #[arg(long, default_value = "clusterconfig/talosconfig")]
        talosconfig: PathBuf,

        /// Talos endpoint (repeatable; default comes from talosconfig)
        #[arg(short = 'e', long = "endpoint")]
        endpoints: Vec<String>,

        /// Talos node (repeatable; defaults to the endpoints)
        #[arg(long = "node")]
        nodes: Vec<String>,

        /// Output path (default: ~/.kube/config)
        #[arg(short = 'o', long)]
        out: Option<PathBuf>,

        /// Overwrite an existing kubeconfig at the output path
        #[arg(long)]
        force: bool,

        /// Print the command without running it
        #[arg(long)]
        dry_run: bool,

        /// CIDR to scan for Talos endpoints when none are configured (repeatable)
        #[arg(long = "discover-cidr")]
        discover_cidrs: Vec<String>,

        /// Port probed during discovery
        #[arg(long, default_value_t = 50000)]
        discover_port: u16,

        /// Per-host connect timeout during discovery
        #[arg(long, default_value = "200ms", value_parser = humantime::parse_duration)]
        discover_timeout: Duration,

        /// Cap on the number of hosts enumerated across all CIDRs
        #[arg(long, default_value_t = 256)]
        max_hosts: usize,
    },

    /// List mesh deployments
    Deployments {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// List mesh services
    Services {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Show deployments, services, and pods in one view
    Status {
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(clap::Args)]
pub struct QueryArgs {
    /// Kubernetes namespace to inspect
    #[arg(short = 'n', long, default_value = "mesh")]
    pub namespace: String,

    /// Label selector applied to every listing
    #[arg(short = 'l', long, default_value = "component=workload")]
    pub selector: String,

    /// Drop the label selector and list everything in the namespace
    #[arg(long)]
    pub all: bool,

    /// Emit rows as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Kubeconfig passed to kubectl
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubectl context
    #[arg(long)]
    pub context: Option<String>,
}
