// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{ChaosStatus, HasAction, Mode, SchedulerSpec, SelectorSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const KIND_POD_CHAOS: &str = "PodChaos";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PodChaosAction {
    /// Delete the selected pods.
    #[default]
    PodKill,
    /// Swap every container image of the selected pods for a pause image
    /// until recovery.
    PodFailure,
}

impl PodChaosAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodChaosAction::PodKill => "pod-kill",
            PodChaosAction::PodFailure => "pod-failure",
        }
    }
}

impl fmt::Display for PodChaosAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "chaos-mesh.org",
    version = "v1alpha1",
    kind = "PodChaos",
    namespaced,
    status = "ChaosStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PodChaosSpec {
    pub selector: SelectorSpec,
    pub action: PodChaosAction,
    pub mode: Mode,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerSpec>,
    /// Grace period handed to pod deletion, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period: Option<i64>,
}

impl_select_spec!(PodChaosSpec);
impl_inner_object!(PodChaos, KIND_POD_CHAOS);

impl HasAction for PodChaos {
    fn action(&self) -> Option<String> {
        Some(self.spec.action.to_string())
    }
}
