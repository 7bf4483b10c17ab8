// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::object_name;
use async_trait::async_trait;
use chaos_router::{downcast_mut, Endpoint, EndpointContext, FanoutReport, Request, Result};
use chaos_types::{
    kinds::hello_world::KIND_HELLO_WORLD_CHAOS, HelloWorldChaos, InnerObject, Prototype,
};
use std::sync::Arc;
use tracing::info;

/// Touches nothing: logs every persistent volume the selector matches.
pub struct HelloWorldEndpoint {
    context: Arc<EndpointContext>,
}

impl HelloWorldEndpoint {
    pub fn new(context: Arc<EndpointContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Endpoint for HelloWorldEndpoint {
    async fn apply(&self, request: &Request, chaos: &mut dyn InnerObject) -> Result<FanoutReport> {
        let chaos = downcast_mut::<HelloWorldChaos>(chaos, KIND_HELLO_WORLD_CHAOS)?;
        let volumes = self
            .context
            .selector
            .resolver()
            .persistent_volumes(&chaos.spec.selector)
            .await?;

        let mut report = FanoutReport::default();
        for volume in volumes {
            let name = object_name(&volume.metadata);
            info!(request = %request, volume = %name, "hello world");
            report.succeeded.push(name);
        }
        Ok(report)
    }

    async fn recover(&self, request: &Request, chaos: &mut dyn InnerObject) -> Result<FanoutReport> {
        downcast_mut::<HelloWorldChaos>(chaos, KIND_HELLO_WORLD_CHAOS)?;
        info!(request = %request, "goodbye world");
        Ok(FanoutReport::default())
    }

    fn object(&self) -> Box<dyn InnerObject> {
        Box::new(HelloWorldChaos::prototype())
    }
}
