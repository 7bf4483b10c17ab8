// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{delete_object, object_name, observe_selected};
use async_trait::async_trait;
use chaos_router::{
    downcast_mut, fan_out, Endpoint, EndpointContext, FanoutReport, Request, Result,
};
use chaos_store::KIND_PERSISTENT_VOLUME_CLAIM;
use chaos_types::{
    kinds::persistent_volume_claim::KIND_PERSISTENT_VOLUME_CLAIM_CHAOS, InnerObject,
    PersistentVolumeClaimChaos, Prototype,
};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use std::sync::Arc;
use tracing::info;

pub struct PersistentVolumeClaimEndpoint {
    context: Arc<EndpointContext>,
}

impl PersistentVolumeClaimEndpoint {
    pub fn new(context: Arc<EndpointContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Endpoint for PersistentVolumeClaimEndpoint {
    async fn apply(&self, request: &Request, chaos: &mut dyn InnerObject) -> Result<FanoutReport> {
        let chaos =
            downcast_mut::<PersistentVolumeClaimChaos>(chaos, KIND_PERSISTENT_VOLUME_CLAIM_CHAOS)?;
        let claims = self
            .context
            .selector
            .select_persistent_volume_claims(&chaos.spec)
            .await?;
        observe_selected(KIND_PERSISTENT_VOLUME_CLAIM_CHAOS, claims.len());

        let store = self.context.store.as_ref();
        let remove_finalizers = chaos.spec.remove_finalizers;
        let report = fan_out(
            self.context.fanout,
            claims,
            |claim: &PersistentVolumeClaim| object_name(&claim.metadata),
            |claim: PersistentVolumeClaim| async move {
                delete_object(
                    store,
                    KIND_PERSISTENT_VOLUME_CLAIM,
                    &claim.metadata,
                    remove_finalizers,
                )
                .await
            },
        )
        .await?;
        info!(request = %request, deleted = report.succeeded.len(), "persistent volume claims deleted");
        Ok(report)
    }

    async fn recover(
        &self,
        _request: &Request,
        chaos: &mut dyn InnerObject,
    ) -> Result<FanoutReport> {
        downcast_mut::<PersistentVolumeClaimChaos>(chaos, KIND_PERSISTENT_VOLUME_CLAIM_CHAOS)?;
        Ok(FanoutReport::default())
    }

    fn object(&self) -> Box<dyn InnerObject> {
        Box::new(PersistentVolumeClaimChaos::prototype())
    }
}
