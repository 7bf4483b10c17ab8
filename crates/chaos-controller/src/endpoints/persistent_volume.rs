// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{delete_object, object_name, observe_selected};
use async_trait::async_trait;
use chaos_router::{
    downcast_mut, fan_out, Endpoint, EndpointContext, FanoutReport, Request, Result,
};
use chaos_store::KIND_PERSISTENT_VOLUME;
use chaos_types::{
    kinds::persistent_volume::KIND_PERSISTENT_VOLUME_CHAOS, InnerObject, PersistentVolumeChaos,
    Prototype,
};
use k8s_openapi::api::core::v1::PersistentVolume;
use std::sync::Arc;
use tracing::info;

/// Deletes the selected persistent volumes, optionally stripping their
/// finalizers so the deletion goes through at once.
pub struct PersistentVolumeEndpoint {
    context: Arc<EndpointContext>,
}

impl PersistentVolumeEndpoint {
    pub fn new(context: Arc<EndpointContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Endpoint for PersistentVolumeEndpoint {
    async fn apply(&self, request: &Request, chaos: &mut dyn InnerObject) -> Result<FanoutReport> {
        let chaos = downcast_mut::<PersistentVolumeChaos>(chaos, KIND_PERSISTENT_VOLUME_CHAOS)?;
        let volumes = self
            .context
            .selector
            .select_persistent_volumes(&chaos.spec)
            .await?;
        observe_selected(KIND_PERSISTENT_VOLUME_CHAOS, volumes.len());

        let store = self.context.store.as_ref();
        let remove_finalizers = chaos.spec.remove_finalizers;
        let report = fan_out(
            self.context.fanout,
            volumes,
            |volume: &PersistentVolume| object_name(&volume.metadata),
            |volume: PersistentVolume| async move {
                delete_object(store, KIND_PERSISTENT_VOLUME, &volume.metadata, remove_finalizers)
                    .await
            },
        )
        .await?;
        info!(request = %request, deleted = report.succeeded.len(), "persistent volumes deleted");
        Ok(report)
    }

    async fn recover(
        &self,
        _request: &Request,
        chaos: &mut dyn InnerObject,
    ) -> Result<FanoutReport> {
        downcast_mut::<PersistentVolumeChaos>(chaos, KIND_PERSISTENT_VOLUME_CHAOS)?;
        Ok(FanoutReport::default())
    }

    fn object(&self) -> Box<dyn InnerObject> {
        Box::new(PersistentVolumeChaos::prototype())
    }
}
