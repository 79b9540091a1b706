// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Node inspection through an ephemeral scanning workload
//!
//! Some data (runtime and kernel versions, images present on a node) is not
//! visible through the API server. The inspector schedules a short-lived
//! DaemonSet that tolerates whatever the caller allows, waits for one ready
//! pod per node, reads what each pod printed, and deletes everything it
//! created.
//!
//! Lifecycle: `Created -> Scheduled -> Ready -> Collected -> TornDown`, with
//! `Failed` reachable from any phase. Teardown runs on every exit path: the
//! normal path awaits it, and if the inspection future is dropped mid-flight
//! the [`WorkloadGuard`] spawns a time-bounded cleanup task.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, HostPathVolumeSource, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, Toleration as K8sToleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::artifacts::{self, Artifact, NODE_INFO_KIND};
use crate::config::NodeInspectionConfig;
use crate::error::{ClusterError, Error, Result};
use crate::kubernetes::catalog::{self, CanonicalKind};
use crate::kubernetes::{ApiFilters, ClusterConnection};
use crate::lister::DEFAULT_WORKER_BUDGET;
use crate::progress::{ProgressHandle, create_progress_handle};

/// Label marking objects created by this engine
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "k8sbom";
/// Label carrying the per-inspection run id
pub const RUN_LABEL: &str = "k8sbom/run";

/// Kubernetes object names are DNS labels
const MAX_NAME_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TolerationOperator {
    Exists,
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

/// A scheduler toleration, attached verbatim to the scanning pods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toleration {
    pub key: Option<String>,
    pub operator: TolerationOperator,
    pub value: Option<String>,
    /// None tolerates every effect
    pub effect: Option<TaintEffect>,
    pub toleration_seconds: Option<i64>,
}

impl Toleration {
    /// Tolerate any taint with the given effect
    pub fn exists(effect: TaintEffect) -> Self {
        Self {
            key: None,
            operator: TolerationOperator::Exists,
            value: None,
            effect: Some(effect),
            toleration_seconds: None,
        }
    }

    /// Tolerate a NoExecute taint for a bounded time
    pub fn no_execute_for(key: &str, seconds: i64) -> Self {
        Self {
            key: Some(key.to_string()),
            operator: TolerationOperator::Exists,
            value: None,
            effect: Some(TaintEffect::NoExecute),
            toleration_seconds: Some(seconds),
        }
    }

    /// Permissive set reaching every node, including ones mid-transition
    pub fn tolerate_all() -> Vec<Self> {
        vec![
            Self::exists(TaintEffect::NoSchedule),
            Self::exists(TaintEffect::NoExecute),
            Self::no_execute_for("node.kubernetes.io/not-ready", 300),
            Self::no_execute_for("node.kubernetes.io/unreachable", 300),
        ]
    }
}

impl From<&Toleration> for K8sToleration {
    fn from(t: &Toleration) -> Self {
        K8sToleration {
            key: t.key.clone(),
            operator: Some(
                match t.operator {
                    TolerationOperator::Exists => "Exists",
                    TolerationOperator::Equal => "Equal",
                }
                .to_string(),
            ),
            value: t.value.clone(),
            effect: t.effect.map(|e| {
                match e {
                    TaintEffect::NoSchedule => "NoSchedule",
                    TaintEffect::PreferNoSchedule => "PreferNoSchedule",
                    TaintEffect::NoExecute => "NoExecute",
                }
                .to_string()
            }),
            toleration_seconds: t.toleration_seconds,
        }
    }
}

/// Inspection lifecycle, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Scheduled,
    Ready,
    Collected,
    TornDown,
    Failed,
}

/// The scanning workload of one inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryWorkload {
    pub name: String,
    pub namespace: String,
    pub run_id: String,
    pub labels: BTreeMap<String, String>,
    pub tolerations: Vec<Toleration>,
}

impl TemporaryWorkload {
    /// Run-scoped name and labels so concurrent inspections never collide
    pub fn new(
        base_name: &str,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        tolerations: &[Toleration],
    ) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..10].to_string();
        let base: String = base_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        let base = base.trim_matches('-');
        let base = if base.is_empty() { "node-scan" } else { base };
        let max_base = MAX_NAME_LEN - run_id.len() - 1;
        let base = base[..base.len().min(max_base)].trim_end_matches('-');
        let name = format!("{}-{}", base, run_id);

        let mut all_labels = labels.clone();
        all_labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
        all_labels.insert(RUN_LABEL.to_string(), run_id.clone());

        Self {
            name,
            namespace: namespace.to_string(),
            run_id,
            labels: all_labels,
            tolerations: tolerations.to_vec(),
        }
    }

    pub fn run_selector(&self) -> String {
        format!("{}={}", RUN_LABEL, self.run_id)
    }

    /// DaemonSet spec: one scanning pod per node, no affinity
    pub fn daemon_set(&self, config: &NodeInspectionConfig) -> DaemonSet {
        let selector = BTreeMap::from([(RUN_LABEL.to_string(), self.run_id.clone())]);
        let container = Container {
            name: "collector".to_string(),
            image: Some(config.image.clone()),
            command: (!config.command.is_empty()).then(|| config.command.clone()),
            env: Some(vec![EnvVar {
                name: "NODE_NAME".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "spec.nodeName".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            volume_mounts: Some(vec![VolumeMount {
                name: "host-root".to_string(),
                mount_path: "/host".to_string(),
                read_only: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        };

        DaemonSet {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            spec: Some(DaemonSetSpec {
                selector: LabelSelector {
                    match_labels: Some(selector),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels.clone()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        tolerations: Some(self.tolerations.iter().map(K8sToleration::from).collect()),
                        host_pid: Some(true),
                        automount_service_account_token: Some(false),
                        volumes: Some(vec![Volume {
                            name: "host-root".to_string(),
                            host_path: Some(HostPathVolumeSource {
                                path: "/".to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }
}

/// A node the inspection did not collect from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissedNode {
    pub node: String,
    pub reason: String,
}

/// Cleanup did not complete; objects may be left behind
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("teardown of '{namespace}/{workload}' failed: {message}")]
pub struct TeardownFailure {
    pub workload: String,
    pub namespace: String,
    pub message: String,
}

/// Outcome of an inspection: what was collected, what was missed
#[derive(Debug, Clone, Default)]
pub struct NodeCollection {
    /// NodeInfo artifacts, ordered by node name
    pub nodes: Vec<Artifact>,
    /// Partial coverage: nodes without a ready scanner, ignored or unreadable
    pub missed: Vec<MissedNode>,
    pub teardown: Option<TeardownFailure>,
}

impl NodeCollection {
    pub fn is_complete(&self) -> bool {
        self.missed.is_empty() && self.teardown.is_none()
    }
}

fn daemon_set_kind() -> Result<CanonicalKind> {
    catalog::resolve("daemonsets")
}

fn pod_kind() -> Result<CanonicalKind> {
    catalog::resolve("pods")
}

fn node_kind() -> Result<CanonicalKind> {
    catalog::resolve("nodes")
}

/// Delete the DaemonSet and any pod carrying the run label
async fn teardown(
    connection: &dyn ClusterConnection,
    workload: &TemporaryWorkload,
) -> std::result::Result<(), TeardownFailure> {
    let failure = |message: String| TeardownFailure {
        workload: workload.name.clone(),
        namespace: workload.namespace.clone(),
        message,
    };
    let ds_kind = daemon_set_kind().map_err(|e| failure(e.to_string()))?;
    let pod_kind = pod_kind().map_err(|e| failure(e.to_string()))?;

    let mut problems = Vec::new();
    if let Err(e) = connection
        .delete(&ds_kind, Some(&workload.namespace), &workload.name)
        .await
    {
        problems.push(format!("daemonset: {}", e));
    }
    if let Err(e) = connection
        .delete_collection(
            &pod_kind,
            Some(&workload.namespace),
            &ApiFilters::labels(workload.run_selector()),
        )
        .await
    {
        problems.push(format!("pods: {}", e));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(failure(problems.join("; ")))
    }
}

/// Background teardowns spawned by cancelled inspections
///
/// Shared by clones. A caller that cancels an inspection (for example on
/// Ctrl-C) awaits [`PendingTeardowns::wait`] before the runtime shuts down.
#[derive(Clone, Default)]
pub struct PendingTeardowns {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PendingTeardowns {
    fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every teardown spawned so far
    pub async fn wait(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background teardown task failed");
            }
        }
    }
}

/// Owns the workload from before its creation until it is torn down
///
/// The guard is armed before the create call goes out, so a cancellation
/// while the API server is still answering is covered too. Consume it with
/// [`WorkloadGuard::teardown`], or [`WorkloadGuard::disarm`] once the server
/// has rejected the create. If it is dropped while still armed, cleanup is
/// spawned onto the current runtime and tracked in [`PendingTeardowns`].
struct WorkloadGuard {
    connection: Arc<dyn ClusterConnection>,
    workload: Option<TemporaryWorkload>,
    timeout: Duration,
    pending: PendingTeardowns,
}

impl WorkloadGuard {
    fn new(
        connection: Arc<dyn ClusterConnection>,
        workload: TemporaryWorkload,
        timeout: Duration,
        pending: PendingTeardowns,
    ) -> Self {
        Self {
            connection,
            workload: Some(workload),
            timeout,
            pending,
        }
    }

    /// Nothing was created, nothing to remove
    fn disarm(mut self) {
        self.workload = None;
    }

    async fn teardown(mut self) -> std::result::Result<(), TeardownFailure> {
        let Some(workload) = self.workload.take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.timeout, teardown(self.connection.as_ref(), &workload)).await {
            Ok(result) => result,
            Err(_) => Err(TeardownFailure {
                workload: workload.name.clone(),
                namespace: workload.namespace.clone(),
                message: format!("timed out after {:?}", self.timeout),
            }),
        }
    }
}

impl Drop for WorkloadGuard {
    fn drop(&mut self) {
        let Some(workload) = self.workload.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(workload = %workload.name, "No runtime to tear down scanning workload, objects may remain");
            return;
        };
        warn!(workload = %workload.name, "Inspection cancelled, tearing down in background");
        let connection = Arc::clone(&self.connection);
        let timeout = self.timeout;
        let task = handle.spawn(async move {
            match tokio::time::timeout(timeout, teardown(connection.as_ref(), &workload)).await {
                Ok(Ok(())) => {
                    info!(workload = %workload.name, phase = ?Phase::TornDown, "Background teardown complete")
                }
                Ok(Err(e)) => warn!(error = %e, "Background teardown failed"),
                Err(_) => warn!(workload = %workload.name, "Background teardown timed out"),
            }
        });
        self.pending.track(task);
    }
}

/// Parse what a scanning pod printed: the whole output as one JSON object,
/// or else the last line that is one
pub fn parse_node_output(output: &str) -> Option<Value> {
    let trimmed = output.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    trimmed
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .find(Value::is_object)
}

fn is_pod_ready(pod: &Value) -> bool {
    pod["status"]["phase"] == "Running"
        && pod["status"]["conditions"].as_array().is_some_and(|conds| {
            conds
                .iter()
                .any(|c| c["type"] == "Ready" && c["status"] == "True")
        })
}

fn labels_match(node_labels: &BTreeMap<String, String>, wanted: &BTreeMap<String, String>) -> bool {
    !wanted.is_empty()
        && wanted
            .iter()
            .all(|(k, v)| node_labels.get(k).is_some_and(|actual| actual == v))
}

/// The API server answered and did not create the object
fn create_rejected(err: &ClusterError) -> bool {
    match err {
        // 409 may follow a retried create that did go through
        ClusterError::Api { code, .. } => (400..500).contains(code) && !matches!(code, 409 | 429),
        _ => false,
    }
}

/// Keep a teardown failure next to the error that ended the inspection
fn with_teardown(err: Error, teardown: std::result::Result<(), TeardownFailure>) -> Error {
    match teardown {
        Ok(()) => err,
        Err(teardown) => Error::Inspection {
            source: Box::new(err),
            teardown,
        },
    }
}

/// One scanner pod per node, preferring a ready one
///
/// A node can briefly carry two pods of the same DaemonSet while one is
/// replaced.
fn scanner_pods_by_node(pods: &[Value]) -> HashMap<String, &Value> {
    let mut by_node: HashMap<String, &Value> = HashMap::new();
    for pod in pods {
        let Some(node) = pod["spec"]["nodeName"].as_str() else {
            continue;
        };
        match by_node.get(node) {
            Some(existing) if is_pod_ready(existing) || !is_pod_ready(pod) => {}
            _ => {
                by_node.insert(node.to_string(), pod);
            }
        }
    }
    by_node
}

#[derive(Clone)]
pub struct NodeInspector {
    connection: Arc<dyn ClusterConnection>,
    config: NodeInspectionConfig,
    worker_budget: usize,
    ignore_labels: BTreeMap<String, String>,
    progress: ProgressHandle,
    pending: PendingTeardowns,
}

impl NodeInspector {
    pub fn new(connection: Arc<dyn ClusterConnection>, config: NodeInspectionConfig) -> Self {
        Self {
            connection,
            config,
            worker_budget: DEFAULT_WORKER_BUDGET,
            ignore_labels: BTreeMap::new(),
            progress: create_progress_handle(),
            pending: PendingTeardowns::default(),
        }
    }

    pub fn with_worker_budget(mut self, budget: usize) -> Self {
        self.worker_budget = budget.max(1);
        self
    }

    /// Skip nodes carrying all of these labels
    pub fn ignore_nodes_labelled(mut self, labels: BTreeMap<String, String>) -> Self {
        self.ignore_labels = labels;
        self
    }

    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    /// Track teardowns of cancelled inspections in a caller-owned set
    pub fn with_pending_teardowns(mut self, pending: PendingTeardowns) -> Self {
        self.pending = pending;
        self
    }

    pub fn pending_teardowns(&self) -> &PendingTeardowns {
        &self.pending
    }

    /// Run one inspection across every node the tolerations allow
    ///
    /// Fails only if nothing was collected at all; partial coverage and
    /// teardown problems are reported on the returned [`NodeCollection`].
    /// A failed inspection whose teardown also failed returns
    /// [`Error::Inspection`].
    pub async fn collect_node_info(
        &self,
        workload_name: &str,
        labels: &BTreeMap<String, String>,
        tolerations: &[Toleration],
    ) -> Result<NodeCollection> {
        let workload =
            TemporaryWorkload::new(workload_name, &self.config.namespace, labels, tolerations);
        let ds_kind = daemon_set_kind()?;
        let manifest = serde_json::to_value(workload.daemon_set(&self.config))
            .map_err(|e| ClusterError::Decode(e.to_string()))?;

        let guard = WorkloadGuard::new(
            Arc::clone(&self.connection),
            workload.clone(),
            self.config.teardown_timeout(),
            self.pending.clone(),
        );
        if let Err(e) = self
            .connection
            .create(&ds_kind, Some(&workload.namespace), &manifest)
            .await
        {
            warn!(workload = %workload.name, error = %e, phase = ?Phase::Failed, "Cannot create scanning workload");
            if create_rejected(&e) {
                guard.disarm();
                return Err(e.into());
            }
            return Err(with_teardown(e.into(), guard.teardown().await));
        }
        info!(
            workload = %workload.name,
            namespace = %workload.namespace,
            tolerations = workload.tolerations.len(),
            phase = ?Phase::Created,
            "Scanning workload created"
        );
        self.progress.workload_created(&workload.name);

        let outcome = self.wait_and_collect(&workload).await;
        let teardown_result = guard.teardown().await;

        match &teardown_result {
            Ok(()) => {
                info!(workload = %workload.name, phase = ?Phase::TornDown, "Scanning workload deleted");
                self.progress.teardown_complete(&workload.name);
            }
            Err(e) => warn!(error = %e, phase = ?Phase::Failed, "Teardown failed"),
        }

        match outcome {
            Ok(mut collection) => {
                collection.teardown = teardown_result.err();
                Ok(collection)
            }
            Err(e) => {
                warn!(workload = %workload.name, error = %e, phase = ?Phase::Failed, "Inspection failed");
                Err(with_teardown(e, teardown_result))
            }
        }
    }

    /// Poll DaemonSet status until every desired pod is ready or the deadline passes.
    /// Returns (ready, desired) of the last observation.
    async fn wait_ready(&self, workload: &TemporaryWorkload) -> Result<(usize, usize)> {
        let ds_kind = daemon_set_kind()?;
        let filters = ApiFilters::fields(format!("metadata.name={}", workload.name));
        let deadline = Instant::now() + self.config.timeout();
        let mut scheduled = false;
        let mut last = (0, 0);

        loop {
            match self
                .connection
                .list(&ds_kind, Some(&workload.namespace), &filters)
                .await
            {
                Ok(items) => {
                    let status = items.first().map(|ds| &ds["status"]);
                    let desired = status
                        .and_then(|s| s["desiredNumberScheduled"].as_u64())
                        .unwrap_or(0) as usize;
                    let ready = status
                        .and_then(|s| s["numberReady"].as_u64())
                        .unwrap_or(0) as usize;
                    last = (ready, desired);
                    self.progress.nodes_ready(&workload.name, ready, desired);

                    if desired > 0 && !scheduled {
                        scheduled = true;
                        debug!(workload = %workload.name, desired, phase = ?Phase::Scheduled, "Scanner scheduled");
                    }
                    if desired > 0 && ready >= desired {
                        info!(workload = %workload.name, ready, phase = ?Phase::Ready, "Scanner ready on all nodes");
                        return Ok(last);
                    }
                }
                Err(e) => {
                    warn!(workload = %workload.name, error = %e, "Status poll failed, retrying");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    workload = %workload.name,
                    ready = last.0,
                    desired = last.1,
                    timeout_secs = self.config.timeout_secs,
                    "Timed out waiting for scanner, collecting partial results"
                );
                return Ok(last);
            }
            tokio::time::sleep(self.config.poll_interval().min(deadline - now)).await;
        }
    }

    async fn wait_and_collect(&self, workload: &TemporaryWorkload) -> Result<NodeCollection> {
        let (ready, desired) = self.wait_ready(workload).await?;

        let pods = self
            .connection
            .list(
                &pod_kind()?,
                Some(&workload.namespace),
                &ApiFilters::labels(workload.run_selector()),
            )
            .await?;
        let pod_by_node = scanner_pods_by_node(&pods);

        // Node list gives the full picture, including nodes the scanner never reached
        let node_labels: BTreeMap<String, BTreeMap<String, String>> =
            match self.connection.list(&node_kind()?, None, &ApiFilters::default()).await {
                Ok(nodes) => nodes
                    .into_iter()
                    .filter_map(|n| artifacts::extract(n).ok())
                    .map(|a| {
                        let labels = a.labels();
                        (a.name, labels)
                    })
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "Cannot list nodes, coverage limited to scheduled pods");
                    pod_by_node
                        .keys()
                        .map(|n| (n.clone(), BTreeMap::new()))
                        .collect()
                }
            };

        let mut missed = Vec::new();
        let mut targets = Vec::new();
        for (node, labels) in &node_labels {
            if labels_match(labels, &self.ignore_labels) {
                missed.push(MissedNode {
                    node: node.clone(),
                    reason: "ignored".to_string(),
                });
                continue;
            }
            match pod_by_node.get(node) {
                Some(pod) if is_pod_ready(pod) => {
                    if let Some(name) = pod["metadata"]["name"].as_str() {
                        targets.push((node.clone(), name.to_string()));
                    }
                }
                Some(pod) => missed.push(MissedNode {
                    node: node.clone(),
                    reason: format!(
                        "scanner pod not ready (phase {})",
                        pod["status"]["phase"].as_str().unwrap_or("Unknown")
                    ),
                }),
                None => missed.push(MissedNode {
                    node: node.clone(),
                    reason: "no scanner pod scheduled".to_string(),
                }),
            }
        }

        let namespace = workload.namespace.as_str();
        let connection = &self.connection;
        let mut harvested: Vec<(String, std::result::Result<Value, String>)> =
            stream::iter(targets)
                .map(|(node, pod)| async move {
                    let payload = match connection.pod_logs(namespace, &pod).await {
                        Ok(output) => parse_node_output(&output)
                            .ok_or_else(|| "scanner output is not a JSON object".to_string()),
                        Err(e) => Err(format!("cannot read scanner output: {}", e)),
                    };
                    (node, payload)
                })
                .buffer_unordered(self.worker_budget)
                .collect()
                .await;
        harvested.sort_by(|a, b| a.0.cmp(&b.0));

        let mut node_pods: Option<HashMap<String, Vec<String>>> = None;
        let mut nodes = Vec::new();
        for (node, payload) in harvested {
            let payload = match payload {
                Ok(payload) => payload,
                Err(reason) => {
                    missed.push(MissedNode { node, reason });
                    continue;
                }
            };
            let images = match payload.get("images").and_then(Value::as_array) {
                Some(list) => {
                    let mut images: Vec<String> = Vec::new();
                    for image in list.iter().filter_map(Value::as_str) {
                        if !images.iter().any(|i| i == image) {
                            images.push(image.to_string());
                        }
                    }
                    images
                }
                None => {
                    if node_pods.is_none() {
                        node_pods = Some(self.images_by_node(workload).await);
                    }
                    node_pods
                        .as_ref()
                        .and_then(|m| m.get(&node).cloned())
                        .unwrap_or_default()
                }
            };
            nodes.push(Artifact {
                kind: NODE_INFO_KIND.to_string(),
                name: node,
                namespace: String::new(),
                images,
                raw_resource: payload,
            });
        }
        missed.sort_by(|a, b| a.node.cmp(&b.node));

        if nodes.is_empty() {
            return Err(Error::SchedulingTimeout {
                workload: workload.name.clone(),
                reason: format!(
                    "{} of {} scanner pods ready, {} node(s) missed",
                    ready,
                    desired,
                    missed.len()
                ),
            });
        }

        info!(
            workload = %workload.name,
            collected = nodes.len(),
            missed = missed.len(),
            phase = ?Phase::Collected,
            "Node info collected"
        );

        Ok(NodeCollection {
            nodes,
            missed,
            teardown: None,
        })
    }

    /// Images of pods bound to each node, excluding the scanner itself
    async fn images_by_node(&self, workload: &TemporaryWorkload) -> HashMap<String, Vec<String>> {
        let mut by_node: HashMap<String, Vec<String>> = HashMap::new();
        let pods = match pod_kind() {
            Ok(kind) => self.connection.list(&kind, None, &ApiFilters::default()).await,
            Err(e) => Err(ClusterError::Decode(e.to_string())),
        };
        let pods = match pods {
            Ok(pods) => pods,
            Err(e) => {
                warn!(error = %e, "Cannot list pods for node image inventory");
                return by_node;
            }
        };
        for pod in pods {
            if pod["metadata"]["labels"][RUN_LABEL] == workload.run_id.as_str() {
                continue;
            }
            let Some(node) = pod["spec"]["nodeName"].as_str() else {
                continue;
            };
            let images = by_node.entry(node.to_string()).or_default();
            for image in artifacts::pod_spec_images(&pod["spec"]) {
                if !images.contains(&image) {
                    images.push(image);
                }
            }
        }
        by_node
    }
}
