// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Error types
//!
//! Fatal errors stop an operation and are returned as [`Error`]. Per-target
//! enumeration failures are not fatal: they are collected into an
//! [`AggregateError`] that travels next to the partial result.

use std::fmt;

use serde::Serialize;

use crate::node_inspector::TeardownFailure;

/// Result alias used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by a [`ClusterConnection`](crate::kubernetes::ClusterConnection)
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClusterError {
    /// The API server answered with a failure status
    #[error("api error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    /// Connection, TLS or timeout failure before a status was received
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded or the request could not be encoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClusterError {
    pub fn api(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(404)
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self.code(), Some(401 | 403))
    }

    /// Transient failures: rate limiting, unavailable API server, gateway timeouts
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { code, .. } => matches!(code, 429 | 503 | 504),
            Self::Decode(_) => false,
        }
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(status) => Self::Api {
                code: status.code,
                reason: status.reason,
                message: status.message,
            },
            kube::Error::SerdeError(e) => Self::Decode(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Fatal errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("ambiguous scope: {0}")]
    AmbiguousScope(String),

    #[error("namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{count} objects match {kind} '{name}' in namespace '{namespace}'")]
    AmbiguousMatch {
        kind: String,
        namespace: String,
        name: String,
        count: usize,
    },

    /// Node inspection could not reach a single node before the deadline
    #[error("scanning workload '{workload}' was not ready on any node: {reason}")]
    SchedulingTimeout { workload: String, reason: String },

    /// Inspection failed and its scanning workload could not be removed
    #[error("{source}; {teardown}")]
    Inspection {
        #[source]
        source: Box<Error>,
        teardown: TeardownFailure,
    },

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// What a non-fatal failure was about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A list call for one (namespace, kind) target failed
    Enumeration,
    /// One object came back but could not be turned into an artifact
    MalformedObject,
    /// Listing visible namespaces failed, enumeration fell back to cluster-wide calls
    NamespaceDiscovery,
}

/// One skipped part of an otherwise successful listing
#[derive(Debug, Clone, Serialize)]
pub struct EnumerationFailure {
    pub failure: FailureKind,
    /// Namespace of the target, empty for cluster-wide or cluster-scoped calls
    pub namespace: String,
    pub resource: String,
    pub message: String,
}

impl fmt::Display for EnumerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.namespace.is_empty() {
            "<cluster>"
        } else {
            self.namespace.as_str()
        };
        write!(f, "{}/{}: {}", ns, self.resource, self.message)
    }
}

/// Accumulated non-fatal failures of a multi-target listing
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct AggregateError {
    failures: Vec<EnumerationFailure>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: EnumerationFailure) {
        self.failures.push(failure);
    }

    pub fn extend(&mut self, other: AggregateError) {
        self.failures.extend(other.failures);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[EnumerationFailure] {
        &self.failures
    }

    /// Order failures the same way artifacts are ordered
    pub(crate) fn sort(&mut self) {
        self.failures.sort_by(|a, b| {
            (a.namespace.as_str(), a.resource.as_str())
                .cmp(&(b.namespace.as_str(), b.resource.as_str()))
        });
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} target(s) skipped", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
