//! In-memory cluster used by unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::catalog::CanonicalKind;
use super::connection::{ApiFilters, ClusterConnection};
use crate::error::ClusterError;

#[derive(Default)]
struct FakeState {
    objects: Vec<Value>,
    /// (plural, namespace or "") -> error returned by list
    failures: HashMap<(String, String), ClusterError>,
    /// node name -> scanner stdout
    node_output: HashMap<String, String>,
    /// nodes the scanner DaemonSet never becomes ready on
    unschedulable: HashSet<String>,
    list_calls: usize,
    create_fails: bool,
    delete_fails: bool,
}

pub(crate) struct FakeCluster {
    default_namespace: String,
    list_delay: Option<Duration>,
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            default_namespace: "default".to_string(),
            list_delay: None,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn insert(&self, object: Value) {
        self.state.lock().unwrap().objects.push(object);
    }

    pub fn fail_list(&self, plural: &str, namespace: &str, err: ClusterError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((plural.to_string(), namespace.to_string()), err);
    }

    pub fn set_node_output(&self, node: &str, output: &str) {
        self.state
            .lock()
            .unwrap()
            .node_output
            .insert(node.to_string(), output.to_string());
    }

    pub fn set_unschedulable(&self, node: &str) {
        self.state
            .lock()
            .unwrap()
            .unschedulable
            .insert(node.to_string());
    }

    pub fn fail_creates(&self) {
        self.state.lock().unwrap().create_fails = true;
    }

    /// Every delete and delete_collection fails, leaving objects in place
    pub fn fail_deletes(&self) {
        self.state.lock().unwrap().delete_fails = true;
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    /// Objects of a kind, any namespace
    pub fn objects_of(&self, kind: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .objects
            .iter()
            .filter(|o| o["kind"] == kind)
            .cloned()
            .collect()
    }

    /// Objects carrying a label key, any kind
    pub fn objects_labelled(&self, key: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .objects
            .iter()
            .filter(|o| o["metadata"]["labels"].get(key).is_some())
            .cloned()
            .collect()
    }

    fn spawn_daemon_pods(state: &mut FakeState, ds: &mut Value) {
        let ds_name = ds["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let ns = ds["metadata"]["namespace"].as_str().unwrap_or_default().to_string();
        let template = ds["spec"]["template"].clone();
        let nodes: Vec<String> = state
            .objects
            .iter()
            .filter(|o| o["kind"] == "Node")
            .filter_map(|o| o["metadata"]["name"].as_str().map(String::from))
            .collect();

        let mut ready = 0;
        for node in &nodes {
            let schedulable = !state.unschedulable.contains(node);
            let (phase, is_ready) = if schedulable {
                ready += 1;
                ("Running", "True")
            } else {
                ("Pending", "False")
            };
            state.objects.push(json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {
                    "name": format!("{}-{}", ds_name, node),
                    "namespace": ns,
                    "labels": template["metadata"]["labels"].clone(),
                    "ownerReferences": [{
                        "apiVersion": "apps/v1",
                        "kind": "DaemonSet",
                        "name": ds_name,
                        "controller": true
                    }]
                },
                "spec": {
                    "nodeName": node,
                    "containers": template["spec"]["containers"].clone()
                },
                "status": {
                    "phase": phase,
                    "conditions": [{"type": "Ready", "status": is_ready}]
                }
            }));
        }

        ds["status"] = json!({
            "desiredNumberScheduled": nodes.len(),
            "currentNumberScheduled": nodes.len(),
            "numberReady": ready
        });
    }
}

fn matches_labels(obj: &Value, selector: &str) -> bool {
    selector.split(',').filter(|p| !p.is_empty()).all(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        obj["metadata"]["labels"][k.trim()].as_str() == Some(v.trim())
    })
}

fn matches_fields(obj: &Value, selector: &str) -> bool {
    selector.split(',').filter(|p| !p.is_empty()).all(|pair| {
        let (path, v) = pair.split_once('=').unwrap_or((pair, ""));
        let mut cur = obj;
        for part in path.trim().split('.') {
            cur = &cur[part];
        }
        cur.as_str() == Some(v.trim())
    })
}

fn matches(obj: &Value, kind: &CanonicalKind, namespace: Option<&str>, filters: &ApiFilters) -> bool {
    if obj["kind"] != kind.kind.as_str() {
        return false;
    }
    if kind.namespaced
        && let Some(ns) = namespace
        && obj["metadata"]["namespace"].as_str() != Some(ns)
    {
        return false;
    }
    if let Some(ref sel) = filters.label_selector
        && !matches_labels(obj, sel)
    {
        return false;
    }
    if let Some(ref sel) = filters.field_selector
        && !matches_fields(obj, sel)
    {
        return false;
    }
    true
}

#[async_trait]
impl ClusterConnection for FakeCluster {
    fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    async fn list(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        filters: &ApiFilters,
    ) -> Result<Vec<Value>, ClusterError> {
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        let key = (kind.plural.clone(), namespace.unwrap_or_default().to_string());
        if let Some(err) = state.failures.get(&key) {
            return Err(err.clone());
        }
        Ok(state
            .objects
            .iter()
            .filter(|o| matches(o, kind, namespace, filters))
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value, ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state.create_fails {
            return Err(ClusterError::api(403, "Forbidden", "cannot create"));
        }
        let mut obj = object.clone();
        obj["kind"] = json!(kind.kind);
        obj["apiVersion"] = json!(kind.api_version());
        if let Some(ns) = namespace {
            obj["metadata"]["namespace"] = json!(ns);
        }
        if kind.kind == "DaemonSet" {
            Self::spawn_daemon_pods(&mut state, &mut obj);
        }
        state.objects.push(obj.clone());
        Ok(obj)
    }

    async fn delete(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state.delete_fails {
            return Err(ClusterError::api(500, "InternalError", "cannot delete"));
        }
        let ns = namespace.unwrap_or_default();
        state.objects.retain(|o| {
            let same = o["kind"] == kind.kind.as_str()
                && o["metadata"]["name"] == name
                && (!kind.namespaced || o["metadata"]["namespace"] == ns);
            // garbage collection of owned objects
            let owned = o["metadata"]["ownerReferences"]
                .as_array()
                .is_some_and(|refs| {
                    refs.iter()
                        .any(|r| r["kind"] == kind.kind.as_str() && r["name"] == name)
                });
            !same && !owned
        });
        Ok(())
    }

    async fn delete_collection(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        filters: &ApiFilters,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state.delete_fails {
            return Err(ClusterError::api(500, "InternalError", "cannot delete"));
        }
        state
            .objects
            .retain(|o| !matches(o, kind, namespace, filters));
        Ok(())
    }

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String, ClusterError> {
        let state = self.state.lock().unwrap();
        let node = state
            .objects
            .iter()
            .find(|o| {
                o["kind"] == "Pod"
                    && o["metadata"]["namespace"] == namespace
                    && o["metadata"]["name"] == pod
            })
            .and_then(|o| o["spec"]["nodeName"].as_str())
            .ok_or_else(|| ClusterError::api(404, "NotFound", format!("pod {} not found", pod)))?;
        Ok(state.node_output.get(node).cloned().unwrap_or_default())
    }
}

pub(crate) fn pod(ns: &str, name: &str, images: &[&str]) -> Value {
    let containers: Vec<Value> = images
        .iter()
        .enumerate()
        .map(|(i, img)| json!({"name": format!("c{}", i), "image": img}))
        .collect();
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": name, "namespace": ns},
        "spec": {"containers": containers}
    })
}

pub(crate) fn deployment(ns: &str, name: &str, init: &[&str], images: &[&str]) -> Value {
    let init: Vec<Value> = init
        .iter()
        .map(|img| json!({"name": "init", "image": img}))
        .collect();
    let containers: Vec<Value> = images
        .iter()
        .map(|img| json!({"name": "main", "image": img}))
        .collect();
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": ns},
        "spec": {
            "template": {
                "metadata": {"labels": {"app": name}},
                "spec": {"initContainers": init, "containers": containers}
            }
        }
    })
}

pub(crate) fn config_map(ns: &str, name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": ns},
        "data": {"key": "value"}
    })
}

pub(crate) fn namespace(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name}
    })
}

pub(crate) fn node(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": {"name": name, "labels": {"kubernetes.io/hostname": name}},
        "status": {"nodeInfo": {"kubeletVersion": "v1.31.0"}}
    })
}
