// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{ChaosStatus, HasAction, Mode, SchedulerSpec, SelectorSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const KIND_HELLO_WORLD_CHAOS: &str = "HelloWorldChaos";

/// A no-op experiment that resolves its persistent volumes and reports them.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "chaos-mesh.org",
    version = "v1alpha1",
    kind = "HelloWorldChaos",
    namespaced,
    status = "ChaosStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct HelloWorldChaosSpec {
    pub selector: SelectorSpec,
    pub mode: Mode,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerSpec>,
}

impl_select_spec!(HelloWorldChaosSpec);
impl_inner_object!(HelloWorldChaos, KIND_HELLO_WORLD_CHAOS);

impl HasAction for HelloWorldChaos {
    fn action(&self) -> Option<String> {
        None
    }
}
