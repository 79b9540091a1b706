// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Engine: the public entry point
//!
//! An [`Engine`] pairs a shared cluster connection with an immutable [`Scope`].
//! Scoping methods return a new engine, so one base engine can be narrowed
//! differently by concurrent callers.
//!
//! ```ignore
//! let engine = Engine::new(connection);
//! let listing = engine.namespace("prod").resources("deploy,sts")?.list_artifacts().await?;
//! let bom = engine.list_bom_info().await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::artifacts::Artifact;
use crate::bom::{self, Bom};
use crate::config::Config;
use crate::error::{AggregateError, Result};
use crate::kubernetes::ClusterConnection;
use crate::lister::{Lister, Listing};
use crate::node_inspector::{
    MissedNode, NodeCollection, NodeInspector, PendingTeardowns, TeardownFailure, Toleration,
};
use crate::progress::{ProgressHandle, create_progress_handle};
use crate::scope::Scope;

/// Scope artifacts followed by the NodeInfo artifacts of one inspection
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    pub artifacts: Vec<Artifact>,
    pub errors: AggregateError,
    pub missed: Vec<MissedNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown: Option<TeardownFailure>,
}

#[derive(Clone)]
pub struct Engine {
    connection: Arc<dyn ClusterConnection>,
    scope: Scope,
    config: Config,
    ignore_node_labels: BTreeMap<String, String>,
    progress: ProgressHandle,
    /// Shared by every engine derived from this one
    pending: PendingTeardowns,
}

impl Engine {
    /// Cluster-wide engine with default settings
    pub fn new(connection: Arc<dyn ClusterConnection>) -> Self {
        Self {
            connection,
            scope: Scope::for_cluster(),
            config: Config::default(),
            ignore_node_labels: BTreeMap::new(),
            progress: create_progress_handle(),
            pending: PendingTeardowns::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    /// Skip nodes carrying all of these labels during node inspection
    pub fn ignore_nodes_labelled(mut self, labels: BTreeMap<String, String>) -> Self {
        self.ignore_node_labels = labels;
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Wait for the cleanup of inspections that were cancelled mid-flight
    pub async fn wait_for_teardown(&self) {
        if !self.pending.is_empty() {
            info!(tasks = self.pending.len(), "Waiting for background teardown");
        }
        self.pending.wait().await;
    }

    fn with_scope(&self, scope: Scope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    pub fn namespace(&self, ns: impl Into<String>) -> Self {
        self.with_scope(self.scope.namespace(ns))
    }

    pub fn all_namespaces(&self) -> Self {
        self.with_scope(self.scope.all_namespaces())
    }

    /// Restrict to a comma-separated list of resource types
    pub fn resources(&self, csv: &str) -> Result<Self> {
        Ok(self.with_scope(self.scope.resources(csv)?))
    }

    fn lister(&self) -> Lister {
        Lister::new(Arc::clone(&self.connection))
            .with_worker_budget(self.config.worker_budget)
            .with_progress(Arc::clone(&self.progress))
    }

    fn inspector(&self) -> NodeInspector {
        NodeInspector::new(
            Arc::clone(&self.connection),
            self.config.node_inspection.clone(),
        )
        .with_worker_budget(self.config.worker_budget)
        .ignore_nodes_labelled(self.ignore_node_labels.clone())
        .with_progress(Arc::clone(&self.progress))
        .with_pending_teardowns(self.pending.clone())
    }

    pub async fn list_artifacts(&self) -> Result<Listing> {
        self.lister().list(&self.scope).await
    }

    /// Exactly one object of `kind` named `name` in the scope's namespace
    pub async fn get_artifact(&self, kind: &str, name: &str) -> Result<Artifact> {
        let scope = self.scope.named(kind, name)?;
        self.lister().get(&scope, name).await
    }

    pub async fn collect_node_info(
        &self,
        workload_name: &str,
        labels: &BTreeMap<String, String>,
        tolerations: &[Toleration],
    ) -> Result<NodeCollection> {
        self.inspector()
            .collect_node_info(workload_name, labels, tolerations)
            .await
    }

    /// List the scope, then inspect every node
    ///
    /// The listing runs first so the scanning workload never shows up in it.
    pub async fn list_artifact_and_node_info(
        &self,
        workload_name: &str,
        labels: &BTreeMap<String, String>,
        tolerations: &[Toleration],
    ) -> Result<Inventory> {
        let listing = self.list_artifacts().await?;
        let nodes = self
            .collect_node_info(workload_name, labels, tolerations)
            .await?;

        let mut artifacts = listing.artifacts;
        artifacts.extend(nodes.nodes);
        Ok(Inventory {
            artifacts,
            errors: listing.errors,
            missed: nodes.missed,
            teardown: nodes.teardown,
        })
    }

    /// Image inventory of the whole cluster, regardless of this engine's scope
    pub async fn list_bom_info(&self) -> Result<Bom> {
        let listing = self.lister().list(&Scope::for_cluster()).await?;
        let entries = bom::list_bom(&listing.artifacts);
        info!(
            artifacts = listing.artifacts.len(),
            images = entries.len(),
            skipped = listing.errors.len(),
            "BOM assembled"
        );
        Ok(Bom {
            entries,
            errors: listing.errors,
            ..Default::default()
        })
    }

    /// Like [`Engine::list_bom_info`], also folding images seen on nodes
    pub async fn list_bom_info_with_nodes(
        &self,
        workload_name: &str,
        labels: &BTreeMap<String, String>,
        tolerations: &[Toleration],
    ) -> Result<Bom> {
        let listing = self.lister().list(&Scope::for_cluster()).await?;
        let nodes = self
            .collect_node_info(workload_name, labels, tolerations)
            .await?;

        let mut artifacts = listing.artifacts;
        artifacts.extend(nodes.nodes);
        let entries = bom::list_bom(&artifacts);
        info!(
            artifacts = artifacts.len(),
            images = entries.len(),
            missed_nodes = nodes.missed.len(),
            "BOM assembled with node inventory"
        );
        Ok(Bom {
            entries,
            errors: listing.errors,
            missed: nodes.missed,
            teardown: nodes.teardown,
        })
    }
}
