// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Query scopes
//!
//! A [`Scope`] says which cluster objects a query targets. It is an immutable
//! value: every selector returns a new scope, so a base scope can be shared
//! and branched freely. Building a scope never touches the network; cluster
//! validation happens when the scope is listed.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::kubernetes::catalog::{self, CanonicalKind};

/// Which namespaces a scope covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceSelection {
    /// Nothing selected. Listing is cluster-wide; single lookups use the
    /// connection's default namespace.
    ClusterDefault,
    /// Explicit namespaces
    Namespaces(BTreeSet<String>),
    /// Every namespace visible to the credentials in use
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    namespaces: NamespaceSelection,
    /// Empty means all default kinds
    kinds: Vec<CanonicalKind>,
    name: Option<String>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::for_cluster()
    }
}

impl Scope {
    /// Base scope: no namespace restriction, all default kinds
    pub fn for_cluster() -> Self {
        Self {
            namespaces: NamespaceSelection::ClusterDefault,
            kinds: Vec::new(),
            name: None,
        }
    }

    /// Restrict to a single namespace
    pub fn namespace(&self, ns: impl Into<String>) -> Self {
        let ns: String = ns.into();
        self.namespaces([ns])
    }

    /// Restrict to a set of namespaces
    pub fn namespaces<I, S>(&self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = namespaces.into_iter().map(Into::into).collect();
        let namespaces = if set.is_empty() {
            NamespaceSelection::ClusterDefault
        } else {
            NamespaceSelection::Namespaces(set)
        };
        Self {
            namespaces,
            ..self.clone()
        }
    }

    /// Every namespace visible to the credentials in use
    pub fn all_namespaces(&self) -> Self {
        Self {
            namespaces: NamespaceSelection::All,
            ..self.clone()
        }
    }

    /// Narrow to a comma-separated list of resource names or aliases
    pub fn resources(&self, csv: &str) -> Result<Self> {
        let kinds = catalog::catalog().resolve_list(csv)?;
        Ok(Self {
            kinds,
            ..self.clone()
        })
    }

    /// Narrow to exactly one object
    ///
    /// Fails with `AmbiguousScope` unless the scope resolves to one namespace
    /// (cluster-scoped kinds need none).
    pub fn named(&self, kind: &str, name: &str) -> Result<Self> {
        let kind = catalog::resolve(kind)?;
        if name.is_empty() {
            return Err(Error::AmbiguousScope("empty object name".to_string()));
        }
        if kind.namespaced {
            match &self.namespaces {
                NamespaceSelection::All => {
                    return Err(Error::AmbiguousScope(format!(
                        "cannot look up {} '{}' across all namespaces",
                        kind.kind, name
                    )));
                }
                NamespaceSelection::Namespaces(set) if set.len() > 1 => {
                    return Err(Error::AmbiguousScope(format!(
                        "cannot look up {} '{}' across {} namespaces",
                        kind.kind,
                        name,
                        set.len()
                    )));
                }
                _ => {}
            }
        }
        Ok(Self {
            namespaces: self.namespaces.clone(),
            kinds: vec![kind],
            name: Some(name.to_string()),
        })
    }

    pub fn namespace_selection(&self) -> &NamespaceSelection {
        &self.namespaces
    }

    /// Explicitly selected kinds; empty means the catalog defaults
    pub fn kinds(&self) -> &[CanonicalKind] {
        &self.kinds
    }

    /// The kinds this scope enumerates
    pub fn effective_kinds(&self) -> Vec<CanonicalKind> {
        if self.kinds.is_empty() {
            catalog::catalog().default_kinds()
        } else {
            self.kinds.clone()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_cluster_wide(&self) -> bool {
        self.namespaces == NamespaceSelection::ClusterDefault
    }

    /// Namespace for a single-object lookup
    pub(crate) fn single_namespace<'a>(&'a self, default_ns: &'a str) -> Option<&'a str> {
        match &self.namespaces {
            NamespaceSelection::ClusterDefault => Some(default_ns),
            NamespaceSelection::Namespaces(set) if set.len() == 1 => {
                set.iter().next().map(String::as_str)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_cluster_defaults() {
        let scope = Scope::for_cluster();
        assert!(scope.is_cluster_wide());
        assert!(scope.kinds().is_empty());
        assert!(scope.name().is_none());
        assert!(!scope.effective_kinds().is_empty());
    }

    #[test]
    fn test_selectors_do_not_mutate_base() {
        let base = Scope::for_cluster();
        let ns = base.namespace("default");
        let all = base.all_namespaces();
        let res = base.resources("cm,pods").unwrap();

        assert_eq!(base, Scope::for_cluster());
        assert_eq!(
            ns.namespace_selection(),
            &NamespaceSelection::Namespaces(BTreeSet::from(["default".to_string()]))
        );
        assert_eq!(all.namespace_selection(), &NamespaceSelection::All);
        assert_eq!(res.kinds().len(), 2);
        assert!(res.is_cluster_wide());
    }

    #[test]
    fn test_chaining_keeps_previous_selections() {
        let scope = Scope::for_cluster()
            .namespace("prod")
            .resources("deploy")
            .unwrap();
        assert_eq!(scope.kinds()[0].kind, "Deployment");
        assert!(!scope.is_cluster_wide());

        let widened = scope.all_namespaces();
        assert_eq!(widened.kinds()[0].kind, "Deployment");
        assert_eq!(widened.namespace_selection(), &NamespaceSelection::All);
    }

    #[test]
    fn test_resources_fails_fast_on_unknown_alias() {
        let err = Scope::for_cluster().resources("pods,gizmos").unwrap_err();
        assert!(matches!(err, Error::UnknownResourceType(ref n) if n == "gizmos"));
    }

    #[test]
    fn test_named_in_default_namespace() {
        let scope = Scope::for_cluster().named("deploy", "orion").unwrap();
        assert_eq!(scope.name(), Some("orion"));
        assert_eq!(scope.kinds().len(), 1);
        assert_eq!(scope.single_namespace("default"), Some("default"));
    }

    #[test]
    fn test_named_requires_single_namespace() {
        let err = Scope::for_cluster()
            .all_namespaces()
            .named("deploy", "orion")
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousScope(_)));

        let err = Scope::for_cluster()
            .namespaces(["a", "b"])
            .named("pod", "x")
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousScope(_)));
    }

    #[test]
    fn test_named_cluster_scoped_kind_ignores_namespaces() {
        let scope = Scope::for_cluster()
            .all_namespaces()
            .named("node", "worker-1")
            .unwrap();
        assert_eq!(scope.kinds()[0].kind, "Node");
    }

    #[test]
    fn test_named_unknown_kind() {
        assert!(matches!(
            Scope::for_cluster().named("gadget", "x"),
            Err(Error::UnknownResourceType(_))
        ));
    }

    #[test]
    fn test_empty_namespace_list_is_cluster_default() {
        let scope = Scope::for_cluster().namespaces(Vec::<String>::new());
        assert!(scope.is_cluster_wide());
    }
}
