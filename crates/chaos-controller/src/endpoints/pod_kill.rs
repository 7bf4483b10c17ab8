// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{object_name, observe_selected};
use async_trait::async_trait;
use chaos_router::{
    downcast_mut, fan_out, Endpoint, EndpointContext, FanoutReport, Request, Result,
};
use chaos_store::{DeleteOptions, KIND_POD};
use chaos_types::{kinds::pod::KIND_POD_CHAOS, InnerObject, PodChaos, Prototype};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::info;

/// Deletes the selected pods. Nothing is restored on recovery; the pods'
/// owners are expected to recreate them.
pub struct PodKillEndpoint {
    context: Arc<EndpointContext>,
}

impl PodKillEndpoint {
    pub fn new(context: Arc<EndpointContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Endpoint for PodKillEndpoint {
    async fn apply(&self, request: &Request, chaos: &mut dyn InnerObject) -> Result<FanoutReport> {
        let chaos = downcast_mut::<PodChaos>(chaos, KIND_POD_CHAOS)?;
        let pods = self.context.selector.select_pods(&chaos.spec).await?;
        observe_selected(KIND_POD_CHAOS, pods.len());

        let options = DeleteOptions {
            grace_period_seconds: chaos
                .spec
                .grace_period
                .and_then(|seconds| u32::try_from(seconds).ok()),
        };
        let store = self.context.store.as_ref();
        let options = &options;
        let report = fan_out(
            self.context.fanout,
            pods,
            |pod: &Pod| object_name(&pod.metadata),
            |pod: Pod| async move {
                let name = pod.metadata.name.unwrap_or_default();
                store
                    .delete(KIND_POD, pod.metadata.namespace.as_deref(), &name, options)
                    .await
            },
        )
        .await?;
        info!(
            request = %request,
            killed = report.succeeded.len(),
            failed = report.failed.len(),
            "pod kill applied"
        );
        Ok(report)
    }

    async fn recover(
        &self,
        _request: &Request,
        chaos: &mut dyn InnerObject,
    ) -> Result<FanoutReport> {
        downcast_mut::<PodChaos>(chaos, KIND_POD_CHAOS)?;
        Ok(FanoutReport::default())
    }

    fn object(&self) -> Box<dyn InnerObject> {
        Box::new(PodChaos::prototype())
    }
}
