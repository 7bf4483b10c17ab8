// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::Result;
use regex::Regex;

/// Process-wide namespace allow/deny rule. Patterns are unanchored, so
/// `^` and `$` must be spelled out for exact matches.
#[derive(Clone, Debug, Default)]
pub enum NamespacePolicy {
    #[default]
    AllowAll,
    Allowed(Regex),
    Ignored(Regex),
}

impl NamespacePolicy {
    /// The allow pattern wins when both are given.
    pub fn new(allowed: Option<&str>, ignored: Option<&str>) -> Result<Self> {
        Ok(match (non_empty(allowed), non_empty(ignored)) {
            (Some(allowed), _) => NamespacePolicy::Allowed(Regex::new(allowed)?),
            (None, Some(ignored)) => NamespacePolicy::Ignored(Regex::new(ignored)?),
            (None, None) => NamespacePolicy::AllowAll,
        })
    }

    pub fn is_allowed(&self, namespace: &str) -> bool {
        match self {
            NamespacePolicy::AllowAll => true,
            NamespacePolicy::Allowed(pattern) => pattern.is_match(namespace),
            NamespacePolicy::Ignored(pattern) => !pattern.is_match(namespace),
        }
    }
}

fn non_empty(pattern: Option<&str>) -> Option<&str> {
    pattern.filter(|p| !p.is_empty())
}

/// Deployment scope the resolver enforces on every selection.
#[derive(Clone, Debug)]
pub struct Scope {
    pub cluster_scoped: bool,
    /// Only consulted when not cluster scoped.
    pub target_namespace: String,
    pub policy: NamespacePolicy,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            cluster_scoped: true,
            target_namespace: "default".to_string(),
            policy: NamespacePolicy::AllowAll,
        }
    }
}

impl Scope {
    pub fn namespaced(target_namespace: impl Into<String>) -> Self {
        Self {
            cluster_scoped: false,
            target_namespace: target_namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_policy(mut self, policy: NamespacePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Namespace every list call is restricted to, if any.
    pub fn list_namespace(&self) -> Option<&str> {
        if self.cluster_scoped {
            None
        } else {
            Some(&self.target_namespace)
        }
    }

    pub fn in_scope(&self, namespace: &str) -> bool {
        self.cluster_scoped || self.target_namespace == namespace
    }
}
