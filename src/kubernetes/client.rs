// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, DynamicObject, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::catalog::CanonicalKind;
use super::connection::{ApiFilters, ClusterConnection};
use crate::error::ClusterError;

/// Timeout for connecting to K8s API
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for reading K8s API responses
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (doubles each retry)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Default page size for paginated list requests
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// [`ClusterConnection`] backed by a kube-rs client
#[derive(Clone)]
pub struct KubeConnection {
    client: Client,
    context: String,
    default_namespace: String,
    page_size: u32,
}

impl KubeConnection {
    /// Connect using a kubeconfig context, or the current context if None
    pub async fn from_context(context: Option<&str>) -> anyhow::Result<Self> {
        let kubeconfig = Kubeconfig::read()?;

        let context_name = context
            .map(String::from)
            .or_else(|| kubeconfig.current_context.clone())
            .ok_or_else(|| anyhow!("No context specified and no current context in kubeconfig"))?;

        if !kubeconfig.contexts.iter().any(|c| c.name == context_name) {
            return Err(anyhow!("Context '{}' not found in kubeconfig", context_name));
        }

        let mut config = Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context: Some(context_name.clone()),
                ..Default::default()
            },
        )
        .await
        .with_context(|| format!("Failed to load kubeconfig for context '{}'", context_name))?;

        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);

        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config)
            .with_context(|| format!("Failed to create client for context '{}'", context_name))?;

        debug!(context = %context_name, namespace = %default_namespace, "Connected");

        Ok(Self {
            client,
            context: context_name,
            default_namespace,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Wrap an existing client
    pub fn new(client: Client, default_namespace: impl Into<String>) -> Self {
        Self {
            client,
            context: "in-cluster".to_string(),
            default_namespace: default_namespace.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    fn api(&self, kind: &CanonicalKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        match namespace {
            Some(ns) if kind.namespaced => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }

    /// Build ListParams from API filters (label selectors, field selectors)
    fn build_list_params(filters: &ApiFilters) -> ListParams {
        let mut params = ListParams::default();

        if let Some(ref label_sel) = filters.label_selector {
            params = params.labels(label_sel);
        }

        if let Some(ref field_sel) = filters.field_selector {
            params = params.fields(field_sel);
        }

        trace!(
            label_selector = ?filters.label_selector,
            field_selector = ?filters.field_selector,
            "Built ListParams"
        );

        params
    }

    /// List all pages, following continue tokens
    async fn list_all_pages(
        &self,
        api: &Api<DynamicObject>,
        base_params: &ListParams,
        kind: &CanonicalKind,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let mut all_items: Vec<DynamicObject> = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut page_count = 0u32;

        loop {
            let mut params = base_params.clone().limit(self.page_size);
            if let Some(ref token) = continue_token {
                params = params.continue_token(token);
            }

            let list = self.list_page_with_retry(api, &params, kind).await?;

            let items_count = list.items.len();
            all_items.extend(list.items);
            page_count += 1;

            match list.metadata.continue_ {
                Some(token) if !token.is_empty() => {
                    debug!(
                        resource = %kind,
                        context = %self.context,
                        page = page_count,
                        items_this_page = items_count,
                        total_so_far = all_items.len(),
                        "Fetched page, continuing"
                    );
                    continue_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(all_items)
    }

    /// Fetch a single page with retry logic
    async fn list_page_with_retry(
        &self,
        api: &Api<DynamicObject>,
        params: &ListParams,
        kind: &CanonicalKind,
    ) -> Result<kube::api::ObjectList<DynamicObject>, ClusterError> {
        let mut attempt = 0;
        loop {
            match api.list(params).await {
                Ok(list) => return Ok(list),
                Err(e) => {
                    let err = ClusterError::from(e);
                    attempt += 1;
                    if !err.is_retryable() || attempt >= MAX_RETRIES {
                        return Err(err);
                    }
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(
                        resource = %kind,
                        context = %self.context,
                        attempt,
                        max_attempts = MAX_RETRIES,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Retryable error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Serialize a DynamicObject, injecting apiVersion and kind
/// (the list API doesn't include these per item)
fn to_value(item: DynamicObject, kind: &CanonicalKind) -> Value {
    let mut value = serde_json::to_value(item).unwrap_or(Value::Null);
    if let Value::Object(ref mut map) = value {
        map.insert("apiVersion".to_string(), Value::String(kind.api_version()));
        map.insert("kind".to_string(), Value::String(kind.kind.clone()));
    }
    value
}

#[async_trait]
impl ClusterConnection for KubeConnection {
    fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    async fn list(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        filters: &ApiFilters,
    ) -> Result<Vec<Value>, ClusterError> {
        let start = Instant::now();
        let api = self.api(kind, namespace);
        let params = Self::build_list_params(filters);
        let items = self.list_all_pages(&api, &params, kind).await?;

        debug!(
            resource = %kind,
            namespace = ?namespace,
            items = items.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Listed resources"
        );

        Ok(items.into_iter().map(|item| to_value(item, kind)).collect())
    }

    async fn create(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value, ClusterError> {
        let api = self.api(kind, namespace);
        let obj: DynamicObject = serde_json::from_value(object.clone())
            .map_err(|e| ClusterError::Decode(e.to_string()))?;
        let created = api.create(&PostParams::default(), &obj).await?;
        Ok(to_value(created, kind))
    }

    async fn delete(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        let api = self.api(kind, namespace);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = ClusterError::from(e);
                if err.is_not_found() { Ok(()) } else { Err(err) }
            }
        }
    }

    async fn delete_collection(
        &self,
        kind: &CanonicalKind,
        namespace: Option<&str>,
        filters: &ApiFilters,
    ) -> Result<(), ClusterError> {
        let api = self.api(kind, namespace);
        let params = Self::build_list_params(filters);
        api.delete_collection(&DeleteParams::background(), &params)
            .await?;
        Ok(())
    }

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.logs(pod, &LogParams::default()).await?)
    }
}
