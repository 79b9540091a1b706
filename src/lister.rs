// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Scope execution
//!
//! The lister turns a [`Scope`] into (namespace, kind) targets, enumerates
//! them concurrently with a bounded number of in-flight calls, and merges the
//! results in a deterministic order. A failing target is recorded in the
//! [`AggregateError`] and never aborts its siblings.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifacts::{self, Artifact};
use crate::error::{AggregateError, ClusterError, EnumerationFailure, Error, FailureKind, Result};
use crate::kubernetes::catalog::{self, CanonicalKind};
use crate::kubernetes::{ApiFilters, ClusterConnection};
use crate::progress::{ProgressHandle, create_progress_handle};
use crate::scope::{NamespaceSelection, Scope};

/// Default number of concurrent list calls
pub const DEFAULT_WORKER_BUDGET: usize = 8;

/// Result of a multi-object listing: everything that could be gathered,
/// plus what was skipped and why
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub artifacts: Vec<Artifact>,
    pub errors: AggregateError,
}

impl Listing {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One list call
#[derive(Debug, Clone)]
struct Target {
    /// None = cluster-wide (or cluster-scoped kind)
    namespace: Option<String>,
    kind: CanonicalKind,
}

impl Target {
    fn namespace_label(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct Lister {
    connection: Arc<dyn ClusterConnection>,
    worker_budget: usize,
    progress: ProgressHandle,
}

impl Lister {
    pub fn new(connection: Arc<dyn ClusterConnection>) -> Self {
        Self {
            connection,
            worker_budget: DEFAULT_WORKER_BUDGET,
            progress: create_progress_handle(),
        }
    }

    pub fn with_worker_budget(mut self, budget: usize) -> Self {
        self.worker_budget = budget.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    /// Execute a multi-object scope
    ///
    /// A named scope is delegated to [`Lister::get`] and yields one artifact.
    pub async fn list(&self, scope: &Scope) -> Result<Listing> {
        if let Some(name) = scope.name() {
            let artifact = self.get(scope, name).await?;
            return Ok(Listing {
                artifacts: vec![artifact],
                errors: AggregateError::new(),
            });
        }

        let start = Instant::now();
        let mut errors = AggregateError::new();
        let targets = self.resolve_targets(scope, &mut errors).await?;

        info!(
            targets = targets.len(),
            namespaces = ?scope.namespace_selection(),
            workers = self.worker_budget,
            "Enumerating resources"
        );
        self.progress.enumeration_started(targets.len());

        let connection = &self.connection;
        let progress = &self.progress;
        let mut results: Vec<(usize, std::result::Result<Vec<Value>, ClusterError>)> =
            stream::iter(targets.iter().enumerate())
                .map(|(idx, target)| async move {
                    let call_start = Instant::now();
                    let result = connection
                        .list(&target.kind, target.namespace.as_deref(), &ApiFilters::default())
                        .await;
                    match &result {
                        Ok(items) => {
                            debug!(
                                namespace = %target.namespace_label(),
                                resource = %target.kind,
                                items = items.len(),
                                elapsed_ms = call_start.elapsed().as_millis(),
                                "Target complete"
                            );
                            progress.target_complete(
                                target.namespace_label(),
                                &target.kind.plural,
                                items.len(),
                                call_start.elapsed().as_millis() as u64,
                            );
                        }
                        Err(e) => {
                            warn!(
                                namespace = %target.namespace_label(),
                                resource = %target.kind,
                                error = %e,
                                "Target failed, skipping"
                            );
                            progress.target_failed(target.namespace_label(), &target.kind.plural);
                        }
                    }
                    (idx, result)
                })
                .buffer_unordered(self.worker_budget)
                .collect()
                .await;

        // Completion order is arbitrary; restore target order before merging
        results.sort_by_key(|(idx, _)| *idx);

        let mut artifacts = Vec::new();
        let mut skipped_controlled = 0usize;
        for (idx, result) in results {
            let target = &targets[idx];
            match result {
                Ok(items) => {
                    for raw in items {
                        if artifacts::is_controlled(&raw) {
                            skipped_controlled += 1;
                            continue;
                        }
                        let object_ns = raw["metadata"]["namespace"]
                            .as_str()
                            .unwrap_or_else(|| target.namespace_label())
                            .to_string();
                        match artifacts::extract(raw) {
                            Ok(artifact) => artifacts.push(artifact),
                            Err(e) => errors.push(EnumerationFailure {
                                failure: FailureKind::MalformedObject,
                                namespace: object_ns,
                                resource: target.kind.to_string(),
                                message: e.to_string(),
                            }),
                        }
                    }
                }
                Err(e) => errors.push(EnumerationFailure {
                    failure: FailureKind::Enumeration,
                    namespace: target.namespace_label().to_string(),
                    resource: target.kind.to_string(),
                    message: e.to_string(),
                }),
            }
        }

        // Stable: cluster order is kept within one (namespace, kind)
        artifacts.sort_by(|a, b| (&a.namespace, &a.kind).cmp(&(&b.namespace, &b.kind)));
        errors.sort();

        info!(
            artifacts = artifacts.len(),
            skipped_controlled,
            failures = errors.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Enumeration complete"
        );

        Ok(Listing { artifacts, errors })
    }

    /// Exactly-one lookup of a named scope
    pub async fn get(&self, scope: &Scope, name: &str) -> Result<Artifact> {
        let kind = match scope.kinds() {
            [kind] => kind.clone(),
            kinds => {
                return Err(Error::AmbiguousScope(format!(
                    "lookup of '{}' needs exactly one resource type, got {}",
                    name,
                    kinds.len()
                )));
            }
        };

        let namespace = if kind.namespaced {
            let ns = scope
                .single_namespace(self.connection.default_namespace())
                .ok_or_else(|| {
                    Error::AmbiguousScope(format!(
                        "lookup of {} '{}' needs exactly one namespace",
                        kind.kind, name
                    ))
                })?;
            Some(ns.to_string())
        } else {
            None
        };
        if let (Some(ns), NamespaceSelection::Namespaces(_)) =
            (namespace.as_deref(), scope.namespace_selection())
        {
            self.ensure_namespace(ns).await?;
        }
        let ns_label = namespace.clone().unwrap_or_default();

        debug!(resource = %kind, namespace = %ns_label, name = %name, "Looking up object");

        let filters = ApiFilters::fields(format!("metadata.name={}", name));
        let mut items = match self
            .connection
            .list(&kind, namespace.as_deref(), &filters)
            .await
        {
            Ok(items) => items,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        match items.len() {
            0 => Err(Error::NotFound {
                kind: kind.kind,
                namespace: ns_label,
                name: name.to_string(),
            }),
            1 => {
                let raw = items.remove(0);
                artifacts::extract(raw).map_err(|e| {
                    Error::Cluster(ClusterError::Decode(format!("{} '{}': {}", kind.kind, name, e)))
                })
            }
            count => Err(Error::AmbiguousMatch {
                kind: kind.kind,
                namespace: ns_label,
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Expand a scope into list calls, sorted by (namespace, kind)
    async fn resolve_targets(
        &self,
        scope: &Scope,
        errors: &mut AggregateError,
    ) -> Result<Vec<Target>> {
        let kinds = scope.effective_kinds();
        let (cluster_scoped, namespaced): (Vec<_>, Vec<_>) =
            kinds.into_iter().partition(|k| !k.namespaced);

        let mut targets = Vec::new();
        match scope.namespace_selection() {
            NamespaceSelection::ClusterDefault => {
                for kind in cluster_scoped.into_iter().chain(namespaced) {
                    targets.push(Target {
                        namespace: None,
                        kind,
                    });
                }
            }
            NamespaceSelection::Namespaces(set) => {
                if !cluster_scoped.is_empty() {
                    debug!(
                        skipped = cluster_scoped.len(),
                        "Cluster-scoped kinds are not listed for namespace scopes"
                    );
                }
                for ns in set {
                    self.ensure_namespace(ns).await?;
                }
                for ns in set {
                    for kind in &namespaced {
                        targets.push(Target {
                            namespace: Some(ns.clone()),
                            kind: kind.clone(),
                        });
                    }
                }
            }
            NamespaceSelection::All => {
                for kind in cluster_scoped {
                    targets.push(Target {
                        namespace: None,
                        kind,
                    });
                }
                match self.visible_namespaces().await {
                    Ok(namespaces) => {
                        for ns in &namespaces {
                            for kind in &namespaced {
                                targets.push(Target {
                                    namespace: Some(ns.clone()),
                                    kind: kind.clone(),
                                });
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Cannot list namespaces, falling back to cluster-wide calls");
                        errors.push(EnumerationFailure {
                            failure: FailureKind::NamespaceDiscovery,
                            namespace: String::new(),
                            resource: "namespaces".to_string(),
                            message: e.to_string(),
                        });
                        for kind in namespaced {
                            targets.push(Target {
                                namespace: None,
                                kind,
                            });
                        }
                    }
                }
            }
        }

        targets.sort_by(|a, b| {
            (a.namespace_label(), a.kind.kind.as_str())
                .cmp(&(b.namespace_label(), b.kind.kind.as_str()))
        });
        Ok(targets)
    }

    /// Fail if the namespace is known not to exist.
    /// Forbidden or otherwise failing lookups are not proof of absence.
    async fn ensure_namespace(&self, ns: &str) -> Result<()> {
        let kind = namespace_kind()?;
        let filters = ApiFilters::fields(format!("metadata.name={}", ns));
        match self.connection.list(&kind, None, &filters).await {
            Ok(items) if items.is_empty() => Err(Error::NamespaceNotFound(ns.to_string())),
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(namespace = %ns, error = %e, "Cannot verify namespace, continuing");
                Ok(())
            }
        }
    }

    async fn visible_namespaces(&self) -> std::result::Result<Vec<String>, ClusterError> {
        let kind = namespace_kind().map_err(|e| ClusterError::Decode(e.to_string()))?;
        let items = self
            .connection
            .list(&kind, None, &ApiFilters::default())
            .await?;
        let mut names: Vec<String> = items
            .iter()
            .filter_map(|ns| ns["metadata"]["name"].as_str().map(String::from))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

fn namespace_kind() -> Result<CanonicalKind> {
    catalog::resolve("namespaces")
}
