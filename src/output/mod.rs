// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod json;
mod table;
mod yaml;

pub use json::JsonFormatter;
pub use table::TableFormatter;
pub use yaml::YamlFormatter;

use serde::Serialize;
use serde_json::Value;

use crate::cli::OutputFormat;
use k8sbom::artifacts::Artifact;
use k8sbom::bom::Bom;
use k8sbom::engine::Inventory;
use k8sbom::error::AggregateError;
use k8sbom::lister::Listing;
use k8sbom::node_inspector::{MissedNode, NodeCollection};

/// Maximum images listed in one table cell before eliding
const MAX_CELL_ITEMS: usize = 3;

/// Something printable: a table view for humans, a document for machines
#[derive(Debug, Clone)]
pub struct Report {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Serialized form for json/yaml output
    pub document: Value,
    /// Non-fatal problems, printed to stderr
    pub warnings: Vec<String>,
}

impl Report {
    pub fn format(&self, format: &OutputFormat, no_headers: bool) -> String {
        match format {
            OutputFormat::Table => TableFormatter::format(self, no_headers),
            OutputFormat::Json => JsonFormatter::format(self),
            OutputFormat::Yaml => YamlFormatter::format(self),
        }
    }

    fn new(columns: &[&str], rows: Vec<Vec<String>>, document: impl Serialize) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            document: serde_json::to_value(document).unwrap_or(Value::Null),
            warnings: Vec::new(),
        }
    }

    fn with_errors(mut self, errors: &AggregateError) -> Self {
        self.warnings.extend(
            errors
                .failures()
                .iter()
                .map(|f| format!("skipped {}", f)),
        );
        self
    }

    fn with_missed(mut self, missed: &[MissedNode]) -> Self {
        self.warnings.extend(
            missed
                .iter()
                .map(|m| format!("node {} not inspected: {}", m.node, m.reason)),
        );
        self
    }

    fn with_teardown(mut self, teardown: Option<&impl std::fmt::Display>) -> Self {
        if let Some(t) = teardown {
            self.warnings.push(t.to_string());
        }
        self
    }

    pub fn listing(listing: &Listing) -> Self {
        Self::new(
            &["NAMESPACE", "KIND", "NAME", "IMAGES"],
            artifact_rows(&listing.artifacts),
            &listing.artifacts,
        )
        .with_errors(&listing.errors)
    }

    /// One object: the table is a summary, json/yaml show the raw object
    pub fn artifact(artifact: &Artifact) -> Self {
        Self::new(
            &["NAMESPACE", "KIND", "NAME", "IMAGES"],
            artifact_rows(std::slice::from_ref(artifact)),
            &artifact.raw_resource,
        )
    }

    pub fn nodes(collection: &NodeCollection) -> Self {
        let rows = collection
            .nodes
            .iter()
            .map(|node| {
                let payload = &node.raw_resource;
                vec![
                    node.name.clone(),
                    payload_field(payload, &["os", "osImage"]),
                    payload_field(payload, &["kernel", "kernelVersion"]),
                    payload_field(payload, &["runtime", "containerRuntimeVersion"]),
                    node.images.len().to_string(),
                ]
            })
            .collect();
        Self::new(
            &["NODE", "OS", "KERNEL", "RUNTIME", "IMAGES"],
            rows,
            &collection.nodes,
        )
        .with_missed(&collection.missed)
        .with_teardown(collection.teardown.as_ref())
    }

    pub fn inventory(inventory: &Inventory) -> Self {
        Self::new(
            &["NAMESPACE", "KIND", "NAME", "IMAGES"],
            artifact_rows(&inventory.artifacts),
            inventory,
        )
        .with_errors(&inventory.errors)
        .with_missed(&inventory.missed)
        .with_teardown(inventory.teardown.as_ref())
    }

    pub fn bom(bom: &Bom) -> Self {
        let rows = bom
            .entries
            .iter()
            .map(|entry| {
                let sources: Vec<String> = entry.sources.iter().map(ToString::to_string).collect();
                vec![
                    entry.image.clone(),
                    entry.registry.clone(),
                    entry.repository.clone(),
                    entry.reference.clone(),
                    elide(&sources),
                ]
            })
            .collect();
        Self::new(
            &["IMAGE", "REGISTRY", "REPOSITORY", "REFERENCE", "SOURCES"],
            rows,
            &bom.entries,
        )
        .with_errors(&bom.errors)
        .with_missed(&bom.missed)
        .with_teardown(bom.teardown.as_ref())
    }
}

fn artifact_rows(artifacts: &[Artifact]) -> Vec<Vec<String>> {
    artifacts
        .iter()
        .map(|a| {
            vec![
                a.namespace.clone(),
                a.kind.clone(),
                a.name.clone(),
                elide(&a.images),
            ]
        })
        .collect()
}

/// Join a list for a table cell, eliding past a few entries
fn elide(items: &[String]) -> String {
    if items.len() <= MAX_CELL_ITEMS {
        items.join(", ")
    } else {
        format!(
            "{} (+{} more)",
            items[..MAX_CELL_ITEMS].join(", "),
            items.len() - MAX_CELL_ITEMS
        )
    }
}

/// First string field present in a node payload
fn payload_field(payload: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .unwrap_or("-")
        .to_string()
}
