// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::Mode;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filter criteria used to resolve candidate targets before sampling.
///
/// Explicit names (`pods`, `persistent_volumes`, `persistent_volume_claims`)
/// bypass every other filter. Otherwise the label filter runs at the query
/// layer and the remaining filters narrow its result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectorSpec {
    /// Namespace expressions (`ns`, `!ns`), evaluated against each pod's
    /// namespace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    /// Node names the selected pods must be scheduled on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    /// Explicit pods, namespace => names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pods: BTreeMap<String, Vec<String>>,
    /// Label selector for the nodes the selected pods must be scheduled on.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selectors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_selectors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub label_selectors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotation_selectors: BTreeMap<String, String>,
    /// Pod phase expressions (`Running`, `!Pending`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_phase_selectors: Vec<String>,
    /// Explicit persistent volume names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub persistent_volumes: Vec<String>,
    /// Explicit persistent volume claims, namespace => names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub persistent_volume_claims: BTreeMap<String, Vec<String>>,
}

impl SelectorSpec {
    pub fn has_explicit_pods(&self) -> bool {
        self.pods.values().any(|names| !names.is_empty())
    }

    pub fn has_node_filter(&self) -> bool {
        !self.nodes.is_empty() || !self.node_selectors.is_empty()
    }
}

/// Anything that carries a selection: the subjects of an experiment, or
/// the remote targets of a two-sided action.
pub trait SelectSpec {
    fn selector(&self) -> &SelectorSpec;

    fn mode(&self) -> Mode;

    fn value(&self) -> &str;
}
