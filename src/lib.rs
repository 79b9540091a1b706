// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Kubernetes artifact discovery, node inspection and image bill of materials

pub mod artifacts;
pub mod bom;
pub mod config;
pub mod engine;
pub mod error;
pub mod kubernetes;
pub mod lister;
pub mod node_inspector;
pub mod progress;
pub mod scope;

pub use artifacts::{Artifact, ArtifactRef};
pub use bom::{Bom, BomInfo};
pub use engine::{Engine, Inventory};
pub use error::{AggregateError, ClusterError, Error, Result};
pub use kubernetes::{ClusterConnection, KubeConnection};
pub use lister::Listing;
pub use node_inspector::{MissedNode, NodeCollection, Toleration};
pub use scope::{NamespaceSelection, Scope};
