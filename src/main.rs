// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod cli;
mod output;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::prelude::*;

use cli::{Args, Command};
use k8sbom::config::{self, Config};
use k8sbom::node_inspector::Toleration;
use k8sbom::progress::{ProgressUpdate, create_spinner};
use k8sbom::{Engine, KubeConnection};
use output::Report;

/// Initialize logging with file output and optional stderr
fn init_logging(verbose: bool) {
    use tracing_rolling_file::{RollingConditionBase, RollingFileAppenderBase};
    use tracing_subscriber::fmt::format::FmtSpan;

    let log_dir = config::base_dir()
        .map(|p| p.join("log"))
        .unwrap_or_else(|_| std::path::PathBuf::from("."));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        return;
    }

    // Rotate daily or at 10MB, keep 5 files
    let log_path = log_dir.join("k8sbom.log");
    let condition = RollingConditionBase::new()
        .daily()
        .max_size(10 * 1024 * 1024);

    let file_appender = match RollingFileAppenderBase::new(log_path, condition, 5) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {}", e);
            return;
        }
    };

    let (non_blocking, _guard) = file_appender.get_non_blocking_appender();
    // Leak the guard to keep the background writer alive
    std::mem::forget(_guard);

    let filter = if verbose { "k8sbom=debug" } else { "k8sbom=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE);

    if verbose {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::NONE);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stderr_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let args = Args::parse();

    // Always log to ~/.k8sbom/log/k8sbom.log, to stderr as well with -v
    init_logging(args.verbose);

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}, using default settings", e);
        Config::default()
    });

    let connection = KubeConnection::from_context(args.context.as_deref())
        .await?
        .with_page_size(config.page_size);
    info!(context = %connection.context(), "Connected");

    let engine = scoped_engine(&args, Engine::new(Arc::new(connection)).with_config(config))?;
    // Dropping `run` on Ctrl-C inside the runtime lets scanning workloads be removed
    let outcome = tokio::select! {
        report = run(&args, &engine) => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(report) = outcome else {
        eprintln!("Interrupted, removing scanning workloads...");
        engine.wait_for_teardown().await;
        anyhow::bail!("interrupted");
    };
    let report = report?;

    for warning in &report.warnings {
        eprintln!("Warning: {}", warning);
    }
    println!("{}", report.format(&args.output, args.no_headers));
    Ok(())
}

fn scoped_engine(args: &Args, engine: Engine) -> Result<Engine> {
    let engine = if args.all_namespaces {
        engine.all_namespaces()
    } else if let Some(ref ns) = args.namespace {
        engine.namespace(ns.as_str())
    } else {
        engine
    };
    match args.resources {
        Some(ref csv) => Ok(engine.resources(csv)?),
        None => Ok(engine),
    }
}

async fn run(args: &Args, engine: &Engine) -> Result<Report> {
    let command = args.command.clone().unwrap_or(Command::List);
    let report = match command {
        Command::List => {
            let listing = with_spinner(engine, "Listing resources...", engine.list_artifacts()).await?;
            Report::listing(&listing)
        }
        Command::Get { kind, name } => {
            let artifact = engine.get_artifact(&kind, &name).await?;
            Report::artifact(&artifact)
        }
        Command::Nodes {
            node,
            with_artifacts,
        } => {
            let engine = engine.clone().ignore_nodes_labelled(node.ignore_labels());
            let tolerations = if node.no_tolerations {
                Vec::new()
            } else {
                Toleration::tolerate_all()
            };
            if with_artifacts {
                let inventory = with_spinner(
                    &engine,
                    "Collecting artifacts and node info...",
                    engine.list_artifact_and_node_info(&node.workload_name, &node.labels(), &tolerations),
                )
                .await?;
                Report::inventory(&inventory)
            } else {
                let collection = with_spinner(
                    &engine,
                    "Inspecting nodes...",
                    engine.collect_node_info(&node.workload_name, &node.labels(), &tolerations),
                )
                .await?;
                Report::nodes(&collection)
            }
        }
        Command::Bom { with_nodes, node } => {
            let bom = if with_nodes {
                let engine = engine.clone().ignore_nodes_labelled(node.ignore_labels());
                let tolerations = if node.no_tolerations {
                    Vec::new()
                } else {
                    Toleration::tolerate_all()
                };
                with_spinner(
                    &engine,
                    "Building bill of materials...",
                    engine.list_bom_info_with_nodes(&node.workload_name, &node.labels(), &tolerations),
                )
                .await?
            } else {
                with_spinner(engine, "Building bill of materials...", engine.list_bom_info()).await?
            };
            Report::bom(&bom)
        }
    };
    Ok(report)
}

/// Drive `fut` to completion while showing engine progress on a spinner
async fn with_spinner<F, T>(engine: &Engine, msg: &str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let spinner = create_spinner(msg);
    let progress = engine.progress();
    let mut progress_rx = progress.subscribe();
    tokio::pin!(fut);
    let mut closed = false;

    let result = loop {
        tokio::select! {
            biased;
            update = progress_rx.recv(), if !closed => {
                match update {
                    Ok(ProgressUpdate::EnumerationStarted { targets }) => {
                        spinner.set_message(format!("Listing {} targets...", targets));
                    }
                    Ok(ProgressUpdate::TargetComplete { namespace, resource, .. })
                    | Ok(ProgressUpdate::TargetFailed { namespace, resource }) => {
                        let (done, total) = progress.progress();
                        let ns = if namespace.is_empty() { "cluster" } else { namespace.as_str() };
                        spinner.set_message(format!("[{}/{}] {} in {}", done, total, resource, ns));
                    }
                    Ok(ProgressUpdate::WorkloadCreated { workload }) => {
                        spinner.set_message(format!("Scheduling {}...", workload));
                    }
                    Ok(ProgressUpdate::NodesReady { ready, desired, .. }) => {
                        spinner.set_message(format!("Scanner ready on {}/{} nodes...", ready, desired));
                    }
                    Ok(ProgressUpdate::TeardownComplete { workload }) => {
                        spinner.set_message(format!("Removed {}", workload));
                    }
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => closed = true,
                }
            }
            result = &mut fut => {
                break result;
            }
        }
    };

    spinner.finish_and_clear();
    result
}
