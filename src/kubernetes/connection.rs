// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The capability the engine needs from a cluster.
//!
//! Everything above this trait works on plain JSON objects so the engine can
//! run against a real API server ([`KubeConnection`](super::KubeConnection))
//! or an in-memory fake in tests.

use async_trait::async_trait;
use serde_json::Value;

use super::catalog::CanonicalKind;
use crate::error::ClusterError;

/// Parameters to push down to the Kubernetes API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiFilters {
    /// Label selector string (e.g., "app=nginx,version=v1")
    pub label_selector: Option<String>,
    /// Field selector string (e.g., "metadata.name=orion")
    pub field_selector: Option<String>,
}

impl ApiFilters {
    pub fn labels(selector: impl Into<String>) -> Self {
        Self {
            label_selector: Some(selector.into()),
            field_selector: None,
        }
    }

    pub fn fields(selector: impl Into<String>) -> Self {
        Self {
            label_selector: None,
            field_selector: Some(selector.into()),
        }
    }
}

/// Read and write access to cluster objects
///
/// Objects returned by `list` carry `apiVersion` and `kind`.
/// `namespace: None` means cluster-wide for namespaced kinds and is required
/// for cluster-scoped kinds.
#[async_trait]
pub trait ClusterConnection: Send + Sync {
    /// Namespace used when a scope does not name one
    fn default_namespace(&self) -> &str;

    async fn list(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        filters: &ApiFilters,
    ) -> Result<Vec<Value>, ClusterError>;

    async fn create(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value, ClusterError>;

    /// Delete one object; a missing object is not an error
    async fn delete(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError>;

    /// Delete every object of a kind matching the filters
    async fn delete_collection(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        filters: &ApiFilters,
    ) -> Result<(), ClusterError>;

    /// Stdout of a pod's first container
    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String, ClusterError>;
}
