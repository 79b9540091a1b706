// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Static catalog of the resource kinds the engine understands.
//!
//! Maps human-friendly names and aliases ("cm", "deploy", "pods") to one
//! canonical group/version/kind/plural. Built once from k8s-openapi type
//! information, so it stays in sync with the Kubernetes API version we build
//! against and needs no discovery round-trip.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use kube::discovery::ApiResource;
use serde::Serialize;

use crate::error::{Error, Result};

/// Canonical identity of a resource kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CanonicalKind {
    /// API group (empty string for core v1)
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Lowercase plural used in URLs, e.g. "deployments"
    pub plural: String,
    pub namespaced: bool,
}

impl CanonicalKind {
    /// Get the full API group/version string
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

impl fmt::Display for CanonicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.plural)
        } else {
            write!(f, "{}.{}", self.plural, self.group)
        }
    }
}

struct CatalogEntry {
    kind: CanonicalKind,
    /// Enumerated when a scope does not name its resource types
    default: bool,
}

/// Lookup table of known kinds
pub struct ResourceCatalog {
    entries: Vec<CatalogEntry>,
    /// Lowercase alias to entry index
    aliases: HashMap<String, usize>,
}

static CATALOG: LazyLock<ResourceCatalog> = LazyLock::new(ResourceCatalog::build);

/// The process-wide catalog
pub fn catalog() -> &'static ResourceCatalog {
    &CATALOG
}

/// Shorthand for `catalog().resolve(name)`
pub fn resolve(name: &str) -> Result<CanonicalKind> {
    catalog().resolve(name)
}

impl ResourceCatalog {
    fn build() -> Self {
        use k8s_openapi::api::{
            apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
            batch::v1::{CronJob, Job},
            core::v1::{
                ConfigMap, LimitRange, Namespace, Node, Pod, ReplicationController,
                ResourceQuota, Secret, Service, ServiceAccount,
            },
            networking::v1::{Ingress, NetworkPolicy},
            rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
        };
        use kube::Resource;

        let mut catalog = ResourceCatalog {
            entries: Vec::new(),
            aliases: HashMap::new(),
        };

        // Scope is given explicitly since the Resource trait's Scope is an associated type
        macro_rules! add_kind {
            ($type:ty, $namespaced:expr, $default:expr, [$($alias:expr),* $(,)?]) => {{
                let kind = CanonicalKind {
                    group: <$type>::group(&()).to_string(),
                    version: <$type>::version(&()).to_string(),
                    kind: <$type>::kind(&()).to_string(),
                    plural: <$type>::plural(&()).to_string(),
                    namespaced: $namespaced,
                };
                catalog.add(kind, $default, &[$($alias),*]);
            }};
        }

        // Workloads
        add_kind!(Pod, true, true, ["pod", "po"]);
        add_kind!(ReplicaSet, true, true, ["replicaset", "rs"]);
        add_kind!(ReplicationController, true, true, ["replicationcontroller", "rc"]);
        add_kind!(StatefulSet, true, true, ["statefulset", "sts"]);
        add_kind!(DaemonSet, true, true, ["daemonset", "ds"]);
        add_kind!(CronJob, true, true, ["cronjob", "cj"]);
        add_kind!(Job, true, true, ["job"]);
        add_kind!(Deployment, true, true, ["deployment", "deploy"]);

        // Configuration and networking
        add_kind!(Service, true, true, ["service", "svc"]);
        add_kind!(ConfigMap, true, true, ["configmap", "cm"]);
        add_kind!(NetworkPolicy, true, true, ["networkpolicy", "netpol"]);
        add_kind!(Ingress, true, true, ["ingress", "ing"]);
        add_kind!(ResourceQuota, true, true, ["resourcequota", "quota"]);
        add_kind!(LimitRange, true, true, ["limitrange", "limits"]);

        // RBAC
        add_kind!(Role, true, true, ["role"]);
        add_kind!(RoleBinding, true, true, ["rolebinding"]);
        add_kind!(ClusterRole, false, true, ["clusterrole"]);
        add_kind!(ClusterRoleBinding, false, true, ["clusterrolebinding"]);

        add_kind!(Node, false, true, ["node", "no"]);

        // Resolvable but never enumerated implicitly
        add_kind!(Secret, true, false, ["secret"]);
        add_kind!(ServiceAccount, true, false, ["serviceaccount", "sa"]);
        add_kind!(Namespace, false, false, ["namespace", "ns"]);

        catalog
    }

    fn add(&mut self, kind: CanonicalKind, default: bool, aliases: &[&str]) {
        let idx = self.entries.len();
        self.aliases.insert(kind.plural.to_lowercase(), idx);
        self.aliases.insert(kind.kind.to_lowercase(), idx);
        for alias in aliases {
            self.aliases.insert(alias.to_lowercase(), idx);
        }
        self.entries.push(CatalogEntry { kind, default });
    }

    /// Resolve a name or alias, case-insensitively
    pub fn resolve(&self, name: &str) -> Result<CanonicalKind> {
        let key = name.trim().to_lowercase();
        self.aliases
            .get(&key)
            .map(|&idx| self.entries[idx].kind.clone())
            .ok_or_else(|| Error::UnknownResourceType(name.trim().to_string()))
    }

    /// Resolve a comma-separated list, de-duplicating while keeping first-seen order
    pub fn resolve_list(&self, csv: &str) -> Result<Vec<CanonicalKind>> {
        let mut kinds: Vec<CanonicalKind> = Vec::new();
        for part in csv.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let kind = self.resolve(part)?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    /// The kinds enumerated when a scope names no resource types
    pub fn default_kinds(&self) -> Vec<CanonicalKind> {
        self.entries
            .iter()
            .filter(|e| e.default)
            .map(|e| e.kind.clone())
            .collect()
    }

    /// Look up a kind by its exact Kind name, e.g. "Deployment"
    pub fn by_kind(&self, kind: &str) -> Option<&CanonicalKind> {
        self.entries
            .iter()
            .map(|e| &e.kind)
            .find(|k| k.kind == kind)
    }

    /// All kinds, in table order
    pub fn kinds(&self) -> impl Iterator<Item = &CanonicalKind> {
        self.entries.iter().map(|e| &e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        let a = resolve("CM").unwrap();
        let b = resolve("cm").unwrap();
        let c = resolve("configmap").unwrap();
        let d = resolve("ConfigMaps").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, d);
        assert_eq!(a.kind, "ConfigMap");
        assert_eq!(a.api_version(), "v1");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let first = resolve("deploy").unwrap();
        let again = resolve(&first.plural).unwrap();
        assert_eq!(first, again);
        assert_eq!(first.kind, "Deployment");
        assert_eq!(first.group, "apps");
        assert_eq!(first.api_version(), "apps/v1");
    }

    #[test]
    fn test_resolve_aliases() {
        assert_eq!(resolve("pods").unwrap().kind, "Pod");
        assert_eq!(resolve("po").unwrap().kind, "Pod");
        assert_eq!(resolve("sts").unwrap().kind, "StatefulSet");
        assert_eq!(resolve("cj").unwrap().kind, "CronJob");
        assert_eq!(resolve("  ds ").unwrap().kind, "DaemonSet");
    }

    #[test]
    fn test_resolve_unknown() {
        let err = resolve("widgets").unwrap_err();
        assert!(matches!(err, Error::UnknownResourceType(ref n) if n == "widgets"));
    }

    #[test]
    fn test_resolve_list_dedups_in_order() {
        let kinds = catalog().resolve_list("pods, cm,po,,configmap, deploy").unwrap();
        let names: Vec<_> = kinds.iter().map(|k| k.kind.as_str()).collect();
        assert_eq!(names, vec!["Pod", "ConfigMap", "Deployment"]);
    }

    #[test]
    fn test_resolve_list_fails_on_unknown() {
        assert!(catalog().resolve_list("pods,bogus").is_err());
    }

    #[test]
    fn test_default_kinds_exclude_secrets() {
        let defaults = catalog().default_kinds();
        assert!(defaults.iter().any(|k| k.kind == "Deployment"));
        assert!(defaults.iter().any(|k| k.kind == "Node"));
        assert!(!defaults.iter().any(|k| k.kind == "Secret"));
        assert!(!defaults.iter().any(|k| k.kind == "Namespace"));
    }

    #[test]
    fn test_scope_flags() {
        assert!(resolve("pods").unwrap().namespaced);
        assert!(!resolve("nodes").unwrap().namespaced);
        assert!(!resolve("clusterrole").unwrap().namespaced);
    }

    #[test]
    fn test_display() {
        assert_eq!(resolve("pod").unwrap().to_string(), "pods");
        assert_eq!(resolve("deploy").unwrap().to_string(), "deployments.apps");
    }
}
