// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Configuration for k8sbom
//!
//! All k8sbom data is stored under ~/.k8sbom/:
//! - ~/.k8sbom/config.json - engine tuning and node scanner settings
//! - ~/.k8sbom/log/ - log files
//!
//! Every field has a default, so a missing or partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the base k8sbom directory (~/.k8sbom/)
pub fn base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".k8sbom"))
        .context("Could not determine home directory")
}

/// k8sbom configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum concurrent list calls against the API server
    pub worker_budget: usize,
    /// Page size for paginated list requests
    pub page_size: u32,
    pub node_inspection: NodeInspectionConfig,
}

/// Settings of the ephemeral node scanning workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInspectionConfig {
    /// Namespace the scanning DaemonSet is created in
    pub namespace: String,
    /// Collector image; must print one JSON document describing the node on stdout
    pub image: String,
    /// Collector command, image entrypoint if empty
    pub command: Vec<String>,
    /// How long to wait for the scanner to become ready on every node
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Upper bound for cleanup after a failed or cancelled inspection
    pub teardown_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_budget: 8,
            page_size: 500,
            node_inspection: NodeInspectionConfig::default(),
        }
    }
}

impl Default for NodeInspectionConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            image: "ghcr.io/k8sbom/node-collector:0.3.1".to_string(),
            command: vec!["node-collector".to_string(), "--output".to_string(), "json".to_string()],
            timeout_secs: 120,
            poll_interval_ms: 2000,
            teardown_timeout_secs: 30,
        }
    }
}

impl NodeInspectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs.max(1))
    }
}

impl Config {
    /// Load config from disk, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to disk
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the config file path (~/.k8sbom/config.json)
    pub fn config_path() -> Result<PathBuf> {
        Ok(base_dir()?.join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.worker_budget, 8);
        assert_eq!(config.node_inspection.namespace, "default");
        assert_eq!(config.node_inspection.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_config_deserialize_partial() {
        let json = r#"{"worker_budget": 2, "node_inspection": {"namespace": "scanner"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.worker_budget, 2);
        assert_eq!(config.page_size, 500);
        assert_eq!(config.node_inspection.namespace, "scanner");
        assert_eq!(config.node_inspection.poll_interval_ms, 2000);
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_poll_interval_has_floor() {
        let cfg = NodeInspectionConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.node_inspection.image = "registry.local/collector:dev".to_string();
        config.save_to(&config_path).unwrap();

        let loaded = Config::load_from(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = Config::load_from(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
