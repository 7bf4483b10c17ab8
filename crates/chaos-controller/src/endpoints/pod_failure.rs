// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{object_name, observe_selected, pointer_segment};
use async_trait::async_trait;
use chaos_router::{
    downcast_mut, fan_out, Endpoint, EndpointContext, FanoutReport, Request, Result,
};
use chaos_store::{list_typed, ListQuery, ObjectStore, Patch, StoreError, KIND_POD};
use chaos_types::{kinds::pod::KIND_POD_CHAOS, InnerObject, PodChaos, Prototype};
use k8s_openapi::api::core::v1::Pod;
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, warn};

/// Marks a pod as failed by an experiment; the value is the experiment uid.
pub const POD_FAILURE_LABEL_KEY: &str = "chaos-mesh.org/pod-failure";
/// JSON map of container name to the image it ran before the failure.
pub const ORIGINAL_IMAGES_ANNOTATION_KEY: &str = "chaos-mesh.org/original-images";

/// Replaces every container image of the selected pods with a pause image.
/// The original images are kept on the pod and put back on recovery.
pub struct PodFailureEndpoint {
    context: Arc<EndpointContext>,
    pause_image: String,
}

impl PodFailureEndpoint {
    pub fn new(context: Arc<EndpointContext>, pause_image: String) -> Self {
        Self {
            context,
            pause_image,
        }
    }
}

#[async_trait]
impl Endpoint for PodFailureEndpoint {
    async fn apply(&self, request: &Request, chaos: &mut dyn InnerObject) -> Result<FanoutReport> {
        let chaos = downcast_mut::<PodChaos>(chaos, KIND_POD_CHAOS)?;
        let uid = chaos.metadata.uid.clone().unwrap_or_default();
        let pods = self.context.selector.select_pods(&chaos.spec).await?;
        observe_selected(KIND_POD_CHAOS, pods.len());

        let store = self.context.store.as_ref();
        let (uid, pause_image) = (uid.as_str(), self.pause_image.as_str());
        let report = fan_out(
            self.context.fanout,
            pods,
            |pod: &Pod| object_name(&pod.metadata),
            |pod: Pod| async move {
                // Already failed by this experiment, the pause image is in
                // place and the annotation holds the real originals.
                if label(&pod) == Some(uid) {
                    return Ok(());
                }
                let patch = failure_patch(&pod, uid, pause_image)?;
                patch_pod(store, &pod, patch).await
            },
        )
        .await?;
        info!(request = %request, failed_pods = report.succeeded.len(), "pod failure applied");
        Ok(report)
    }

    async fn recover(&self, request: &Request, chaos: &mut dyn InnerObject) -> Result<FanoutReport> {
        let chaos = downcast_mut::<PodChaos>(chaos, KIND_POD_CHAOS)?;
        let uid = chaos.metadata.uid.clone().unwrap_or_default();

        let mut query = ListQuery::default().labels(&BTreeMap::from([(
            POD_FAILURE_LABEL_KEY.to_string(),
            uid,
        )]));
        query.namespace = self
            .context
            .selector
            .resolver()
            .scope()
            .list_namespace()
            .map(str::to_string);
        let store = self.context.store.as_ref();
        let pods: Vec<Pod> = list_typed(store, KIND_POD, &query).await?;

        let report = fan_out(
            self.context.fanout,
            pods,
            |pod: &Pod| object_name(&pod.metadata),
            |pod: Pod| async move {
                let patch = restore_patch(&pod)?;
                patch_pod(store, &pod, patch).await
            },
        )
        .await?;
        info!(request = %request, restored_pods = report.succeeded.len(), "pod failure recovered");
        Ok(report)
    }

    fn object(&self) -> Box<dyn InnerObject> {
        Box::new(PodChaos::prototype())
    }
}

fn label(pod: &Pod) -> Option<&str> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(POD_FAILURE_LABEL_KEY))
        .map(String::as_str)
}

async fn patch_pod(
    store: &dyn ObjectStore,
    pod: &Pod,
    patch: json_patch::Patch,
) -> std::result::Result<(), StoreError> {
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    store
        .patch(
            KIND_POD,
            pod.metadata.namespace.as_deref(),
            name,
            &Patch::Json(patch),
        )
        .await?;
    Ok(())
}

fn failure_patch(
    pod: &Pod,
    uid: &str,
    pause_image: &str,
) -> std::result::Result<json_patch::Patch, StoreError> {
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    let originals: BTreeMap<&str, &str> = containers
        .iter()
        .map(|container| {
            (
                container.name.as_str(),
                container.image.as_deref().unwrap_or_default(),
            )
        })
        .collect();

    let mut operations = vec![];
    if pod.metadata.labels.is_none() {
        operations.push(json!({"op": "add", "path": "/metadata/labels", "value": {}}));
    }
    operations.push(json!({
        "op": "add",
        "path": format!("/metadata/labels/{}", pointer_segment(POD_FAILURE_LABEL_KEY)),
        "value": uid,
    }));
    if pod.metadata.annotations.is_none() {
        operations.push(json!({"op": "add", "path": "/metadata/annotations", "value": {}}));
    }
    operations.push(json!({
        "op": "add",
        "path": format!(
            "/metadata/annotations/{}",
            pointer_segment(ORIGINAL_IMAGES_ANNOTATION_KEY)
        ),
        "value": serde_json::to_string(&originals)?,
    }));
    for index in 0..containers.len() {
        operations.push(json!({
            "op": "add",
            "path": format!("/spec/containers/{}/image", index),
            "value": pause_image,
        }));
    }
    Ok(serde_json::from_value(Value::Array(operations))?)
}

fn restore_patch(pod: &Pod) -> std::result::Result<json_patch::Patch, StoreError> {
    let annotations = pod.metadata.annotations.as_ref();
    let originals: BTreeMap<String, String> =
        match annotations.and_then(|annotations| annotations.get(ORIGINAL_IMAGES_ANNOTATION_KEY)) {
            Some(originals) => serde_json::from_str(originals)?,
            None => {
                warn!(
                    pod = %object_name(&pod.metadata),
                    "failed pod carries no original images, only dropping the label"
                );
                BTreeMap::new()
            },
        };

    let mut operations = vec![];
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    for (index, container) in containers.iter().enumerate() {
        if let Some(image) = originals.get(&container.name) {
            operations.push(json!({
                "op": "add",
                "path": format!("/spec/containers/{}/image", index),
                "value": image,
            }));
        }
    }
    operations.push(json!({
        "op": "remove",
        "path": format!("/metadata/labels/{}", pointer_segment(POD_FAILURE_LABEL_KEY)),
    }));
    if annotations.map_or(false, |annotations| {
        annotations.contains_key(ORIGINAL_IMAGES_ANNOTATION_KEY)
    }) {
        operations.push(json!({
            "op": "remove",
            "path": format!(
                "/metadata/annotations/{}",
                pointer_segment(ORIGINAL_IMAGES_ANNOTATION_KEY)
            ),
        }));
    }
    Ok(serde_json::from_value(Value::Array(operations))?)
}
