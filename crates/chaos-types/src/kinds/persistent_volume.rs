// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{ChaosStatus, HasAction, Mode, SchedulerSpec, SelectorSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const KIND_PERSISTENT_VOLUME_CHAOS: &str = "PersistentVolumeChaos";

/// Deletes the selected persistent volumes.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "chaos-mesh.org",
    version = "v1alpha1",
    kind = "PersistentVolumeChaos",
    namespaced,
    status = "ChaosStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeChaosSpec {
    pub selector: SelectorSpec,
    pub mode: Mode,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerSpec>,
    /// Also strip the finalizers of each deleted volume so the deletion is
    /// not held back.
    #[serde(default, rename = "remove_finalizers")]
    pub remove_finalizers: bool,
}

impl_select_spec!(PersistentVolumeChaosSpec);
impl_inner_object!(PersistentVolumeChaos, KIND_PERSISTENT_VOLUME_CHAOS);

impl HasAction for PersistentVolumeChaos {
    fn action(&self) -> Option<String> {
        None
    }
}
