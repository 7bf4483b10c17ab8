// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{ChaosStatus, HasAction, Mode, SchedulerSpec, SelectorSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const KIND_PERSISTENT_VOLUME_CLAIM_CHAOS: &str = "PersistentVolumeClaimChaos";

/// Deletes the selected persistent volume claims.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "chaos-mesh.org",
    version = "v1alpha1",
    kind = "PersistentVolumeClaimChaos",
    namespaced,
    status = "ChaosStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimChaosSpec {
    pub selector: SelectorSpec,
    pub mode: Mode,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerSpec>,
    /// Also strip the finalizers of each deleted claim so the deletion is
    /// not held back.
    #[serde(default, rename = "remove_finalizers")]
    pub remove_finalizers: bool,
}

impl_select_spec!(PersistentVolumeClaimChaosSpec);
impl_inner_object!(PersistentVolumeClaimChaos, KIND_PERSISTENT_VOLUME_CLAIM_CHAOS);

impl HasAction for PersistentVolumeClaimChaos {
    fn action(&self) -> Option<String> {
        None
    }
}
