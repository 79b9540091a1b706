// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Artifacts: normalized records of discovered cluster objects
//!
//! [`extract`] turns one raw object into an [`Artifact`]. Extraction is best
//! effort: malformed container entries are skipped and missing fields stay
//! empty. Only an object without a usable identity is rejected, so that one
//! bad object never aborts a cluster-wide scan.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Kind name of artifacts produced by node inspection
pub const NODE_INFO_KIND: &str = "NodeInfo";

/// Container lists of a pod spec, in extraction order
const CONTAINER_FIELDS: [&str; 3] = ["initContainers", "containers", "ephemeralContainers"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub kind: String,
    pub name: String,
    /// Empty for cluster-scoped objects
    pub namespace: String,
    /// Container images, de-duplicated, in init/main/ephemeral order
    pub images: Vec<String>,
    pub raw_resource: Value,
}

/// Identity of an artifact: (kind, namespace, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArtifactRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
        }
    }
}

impl Artifact {
    pub fn key(&self) -> ArtifactRef {
        ArtifactRef {
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn is_node_info(&self) -> bool {
        self.kind == NODE_INFO_KIND
    }

    /// Labels of the underlying object
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.raw_resource["metadata"]["labels"]
            .as_object()
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.namespace == other.namespace && self.name == other.name
    }
}

impl Eq for Artifact {}

/// Why an object could not be turned into an artifact
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed object: {0}")]
pub struct ExtractError(pub String);

/// Kinds that embed a pod spec, each with one extraction rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Pod,
    Deployment,
    DaemonSet,
    StatefulSet,
    ReplicaSet,
    ReplicationController,
    Job,
    CronJob,
    /// No pod template (ConfigMap, Service, RBAC objects, ...)
    Other,
}

impl WorkloadKind {
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "Pod" => Self::Pod,
            "Deployment" => Self::Deployment,
            "DaemonSet" => Self::DaemonSet,
            "StatefulSet" => Self::StatefulSet,
            "ReplicaSet" => Self::ReplicaSet,
            "ReplicationController" => Self::ReplicationController,
            "Job" => Self::Job,
            "CronJob" => Self::CronJob,
            _ => Self::Other,
        }
    }

    /// JSON path from the object root to its pod spec
    fn pod_spec_path(self) -> &'static [&'static str] {
        match self {
            Self::Pod => &["spec"],
            Self::Deployment
            | Self::DaemonSet
            | Self::StatefulSet
            | Self::ReplicaSet
            | Self::ReplicationController
            | Self::Job => &["spec", "template", "spec"],
            Self::CronJob => &["spec", "jobTemplate", "spec", "template", "spec"],
            Self::Other => &[],
        }
    }

    pub fn has_pod_template(self) -> bool {
        self != Self::Other
    }

    /// The pod spec embedded in `object`, if any
    pub fn pod_spec(self, object: &Value) -> Option<&Value> {
        if !self.has_pod_template() {
            return None;
        }
        self.pod_spec_path()
            .iter()
            .try_fold(object, |cur, key| cur.get(*key))
            .filter(|spec| spec.is_object())
    }
}

/// Images of a pod spec: init containers, then containers, then ephemeral
/// containers, de-duplicated. Entries without a string image are skipped.
pub fn pod_spec_images(spec: &Value) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    for field in CONTAINER_FIELDS {
        let Some(containers) = spec.get(field).and_then(Value::as_array) else {
            continue;
        };
        for image in containers.iter().filter_map(|c| c.get("image")?.as_str()) {
            let image = image.trim();
            if !image.is_empty() && !images.iter().any(|i| i == image) {
                images.push(image.to_string());
            }
        }
    }
    images
}

/// Turn a raw cluster object into an artifact
pub fn extract(raw: Value) -> Result<Artifact, ExtractError> {
    if !raw.is_object() {
        return Err(ExtractError("not a JSON object".to_string()));
    }
    let kind = raw
        .get("kind")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ExtractError("missing kind".to_string()))?
        .to_string();
    let metadata = raw.get("metadata");
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ExtractError(format!("{} without metadata.name", kind)))?
        .to_string();
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let images = WorkloadKind::from_kind(&kind)
        .pod_spec(&raw)
        .map(pod_spec_images)
        .unwrap_or_default();

    Ok(Artifact {
        kind,
        name,
        namespace,
        images,
        raw_resource: raw,
    })
}

/// Whether the object is managed by a pod-template-bearing controller.
///
/// Such objects (pods of a ReplicaSet, ReplicaSets of a Deployment, Jobs of a
/// CronJob) are reported through their top-level owner instead.
pub fn is_controlled(raw: &Value) -> bool {
    raw["metadata"]["ownerReferences"]
        .as_array()
        .is_some_and(|refs| {
            refs.iter().any(|r| {
                r["controller"].as_bool() == Some(true)
                    && r["kind"]
                        .as_str()
                        .is_some_and(|k| WorkloadKind::from_kind(k).has_pod_template())
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_pod_orders_init_main_ephemeral() {
        let raw = json!({
            "kind": "Pod",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {
                "ephemeralContainers": [{"name": "debug", "image": "busybox:1.36"}],
                "containers": [
                    {"name": "app", "image": "app:1.0"},
                    {"name": "sidecar", "image": "envoy:1.29"}
                ],
                "initContainers": [{"name": "migrate", "image": "migrate:2"}]
            }
        });
        let artifact = extract(raw).unwrap();
        assert_eq!(artifact.kind, "Pod");
        assert_eq!(artifact.namespace, "default");
        assert_eq!(
            artifact.images,
            vec!["migrate:2", "app:1.0", "envoy:1.29", "busybox:1.36"]
        );
    }

    #[test]
    fn test_extract_dedups_images() {
        let raw = json!({
            "kind": "Pod",
            "metadata": {"name": "p"},
            "spec": {
                "initContainers": [{"image": "app:1.0"}],
                "containers": [{"image": "app:1.0"}, {"image": "app:1.0"}]
            }
        });
        assert_eq!(extract(raw).unwrap().images, vec!["app:1.0"]);
    }

    #[test]
    fn test_extract_controllers() {
        let template = json!({"spec": {"containers": [{"image": "nginx:1.27"}]}});
        for kind in [
            "Deployment",
            "DaemonSet",
            "StatefulSet",
            "ReplicaSet",
            "ReplicationController",
            "Job",
        ] {
            let raw = json!({
                "kind": kind,
                "metadata": {"name": "x", "namespace": "ns"},
                "spec": {"template": template}
            });
            assert_eq!(extract(raw).unwrap().images, vec!["nginx:1.27"], "{}", kind);
        }
    }

    #[test]
    fn test_extract_cronjob_nested_template() {
        let raw = json!({
            "kind": "CronJob",
            "metadata": {"name": "backup", "namespace": "ops"},
            "spec": {
                "schedule": "0 * * * *",
                "jobTemplate": {"spec": {"template": {"spec": {
                    "containers": [{"image": "restic:0.17"}]
                }}}}
            }
        });
        assert_eq!(extract(raw).unwrap().images, vec!["restic:0.17"]);
    }

    #[test]
    fn test_extract_non_workload_keeps_raw() {
        let raw = json!({
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "namespace": "default"},
            "data": {"a": "b"}
        });
        let artifact = extract(raw.clone()).unwrap();
        assert!(artifact.images.is_empty());
        assert_eq!(artifact.raw_resource, raw);
    }

    #[test]
    fn test_extract_cluster_scoped_has_empty_namespace() {
        let raw = json!({"kind": "ClusterRole", "metadata": {"name": "admin"}});
        let artifact = extract(raw).unwrap();
        assert_eq!(artifact.namespace, "");
        assert_eq!(artifact.key().to_string(), "ClusterRole/admin");
    }

    #[test]
    fn test_extract_tolerates_partial_specs() {
        let raw = json!({
            "kind": "Deployment",
            "metadata": {"name": "half", "namespace": "default"},
            "spec": {"template": {"spec": {
                "containers": [{"name": "no-image"}, {"image": 42}, "garbage", {"image": "ok:1"}],
                "initContainers": "not-a-list"
            }}}
        });
        assert_eq!(extract(raw).unwrap().images, vec!["ok:1"]);

        let raw = json!({"kind": "Deployment", "metadata": {"name": "empty"}, "spec": null});
        assert!(extract(raw).unwrap().images.is_empty());
    }

    #[test]
    fn test_extract_rejects_unidentifiable_objects() {
        assert!(extract(json!("text")).is_err());
        assert!(extract(json!({"metadata": {"name": "x"}})).is_err());
        assert!(extract(json!({"kind": "Pod", "metadata": {}})).is_err());
        assert!(extract(json!({"kind": "Pod"})).is_err());
    }

    #[test]
    fn test_artifact_equality_is_by_identity() {
        let a = extract(json!({"kind": "Pod", "metadata": {"name": "x", "namespace": "a"}})).unwrap();
        let mut b = a.clone();
        b.images.push("other:1".to_string());
        assert_eq!(a, b);
        b.namespace = "b".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_controlled() {
        let owned_pod = json!({"metadata": {"ownerReferences": [
            {"kind": "ReplicaSet", "name": "web-abc", "controller": true}
        ]}});
        assert!(is_controlled(&owned_pod));

        let not_controller = json!({"metadata": {"ownerReferences": [
            {"kind": "ReplicaSet", "name": "web-abc"}
        ]}});
        assert!(!is_controlled(&not_controller));

        // Owned by something we don't enumerate (e.g. an operator CR)
        let crd_owned = json!({"metadata": {"ownerReferences": [
            {"kind": "Postgresql", "name": "db", "controller": true}
        ]}});
        assert!(!is_controlled(&crd_owned));
        assert!(!is_controlled(&json!({"metadata": {}})));
    }

    #[test]
    fn test_labels() {
        let a = extract(json!({
            "kind": "Node",
            "metadata": {"name": "n1", "labels": {"role": "worker", "n": 1}}
        }))
        .unwrap();
        let labels = a.labels();
        assert_eq!(labels.get("role").map(String::as_str), Some("worker"));
        assert!(!labels.contains_key("n"));
    }
}
