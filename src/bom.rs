// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Bill of materials: every image in the cluster and where it was seen

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::artifacts::{Artifact, ArtifactRef};
use crate::error::AggregateError;
use crate::node_inspector::{MissedNode, TeardownFailure};

const DEFAULT_REGISTRY: &str = "docker.io";
const DEFAULT_TAG: &str = "latest";

/// One image reference and the artifacts that carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BomInfo {
    /// The reference exactly as it appears in the pod spec
    pub image: String,
    pub registry: String,
    pub repository: String,
    /// Tag or digest
    pub reference: String,
    pub sources: BTreeSet<ArtifactRef>,
}

/// Result of a BOM pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct Bom {
    /// Ordered by image
    pub entries: Vec<BomInfo>,
    /// Targets the enumeration could not read
    pub errors: AggregateError,
    /// Nodes not inspected (empty without node inspection)
    pub missed: Vec<MissedNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown: Option<TeardownFailure>,
}

impl Bom {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.missed.is_empty() && self.teardown.is_none()
    }
}

/// Split an image reference into (registry, repository, tag or digest)
///
/// Follows the Docker conventions: the first path component is a registry
/// only if it looks like a host (has a `.` or `:`, or is `localhost`);
/// single-component Docker Hub names live under `library/`.
pub fn parse_image_reference(image: &str) -> (String, String, String) {
    // name:tag@digest pins by digest, the tag is informational
    let (name, reference) = match image.split_once('@') {
        Some((name, digest)) => (split_tag(name).0, digest.to_string()),
        None => {
            let (name, tag) = split_tag(image);
            (name, tag.unwrap_or(DEFAULT_TAG).to_string())
        }
    };

    let (registry, repository) = match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
    };
    let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
        format!("library/{}", repository)
    } else {
        repository
    };
    (registry, repository, reference)
}

/// A tag is a `:` suffix after the last `/`; earlier colons are registry ports
fn split_tag(name: &str) -> (&str, Option<&str>) {
    let last_slash = name.rfind('/').map_or(0, |i| i + 1);
    match name[last_slash..].rfind(':') {
        Some(i) => (&name[..last_slash + i], Some(&name[last_slash + i + 1..])),
        None => (name, None),
    }
}

/// Fold artifacts into a de-duplicated inventory keyed by image reference
pub fn list_bom(artifacts: &[Artifact]) -> Vec<BomInfo> {
    let mut by_image: BTreeMap<&str, BTreeSet<ArtifactRef>> = BTreeMap::new();
    for artifact in artifacts {
        for image in &artifact.images {
            by_image
                .entry(image.as_str())
                .or_default()
                .insert(artifact.key());
        }
    }

    by_image
        .into_iter()
        .map(|(image, sources)| {
            let (registry, repository, reference) = parse_image_reference(image);
            BomInfo {
                image: image.to_string(),
                registry,
                repository,
                reference,
                sources,
            }
        })
        .collect()
}
