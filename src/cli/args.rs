// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use std::collections::BTreeMap;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "k8sbom")]
#[command(author, version, about = "Inventory container images across a Kubernetes cluster")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Kubernetes context to use (kubeconfig current context if unset)
    #[arg(short, long, value_name = "CONTEXT")]
    pub context: Option<String>,

    /// Restrict to a namespace
    #[arg(short, long, conflicts_with = "all_namespaces")]
    pub namespace: Option<String>,

    /// Enumerate every namespace visible to the credentials
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Comma-separated resource types or aliases (e.g. "deploy,sts,cm")
    #[arg(short, long, value_name = "RESOURCES")]
    pub resources: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Omit column headers in output
    #[arg(long)]
    pub no_headers: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List artifacts in scope (default)
    List,

    /// Show exactly one object
    Get {
        /// Resource type or alias
        kind: String,
        /// Object name
        name: String,
    },

    /// Inspect every node through a temporary scanning workload
    Nodes {
        #[command(flatten)]
        node: NodeArgs,

        /// Also list artifacts in scope before the node info
        #[arg(long)]
        with_artifacts: bool,
    },

    /// Cluster-wide bill of materials
    Bom {
        /// Also inspect nodes and include images found on them
        #[arg(long)]
        with_nodes: bool,

        #[command(flatten)]
        node: NodeArgs,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct NodeArgs {
    /// Base name of the scanning workload
    #[arg(long, default_value = "k8sbom-scan")]
    pub workload_name: String,

    /// Extra label for the scanning workload (repeatable)
    #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub labels: Vec<(String, String)>,

    /// Skip nodes carrying this label (repeatable, all must match)
    #[arg(long = "ignore-label", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub ignore_labels: Vec<(String, String)>,

    /// Only schedule onto nodes without taints
    #[arg(long)]
    pub no_tolerations: bool,
}

impl NodeArgs {
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.labels.iter().cloned().collect()
    }

    pub fn ignore_labels(&self) -> BTreeMap<String, String> {
        self.ignore_labels.iter().cloned().collect()
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}
