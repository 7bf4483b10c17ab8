// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Apply/Recover implementations of the built-in experiment kinds, and the
//! registrations that bind them to their kind names.

mod hello_world;
mod persistent_volume;
mod persistent_volume_claim;
mod pod_failure;
mod pod_kill;

pub use hello_world::HelloWorldEndpoint;
pub use persistent_volume::PersistentVolumeEndpoint;
pub use persistent_volume_claim::PersistentVolumeClaimEndpoint;
pub use pod_failure::{PodFailureEndpoint, ORIGINAL_IMAGES_ANNOTATION_KEY, POD_FAILURE_LABEL_KEY};
pub use pod_kill::PodKillEndpoint;

use crate::{config::ControllerConfig, counters::SELECTED_TARGETS};
use chaos_router::{accept_all, AcceptFn, Endpoint, EndpointContext, RegistryBuilder};
use chaos_store::{DeleteOptions, ObjectStore, Patch, StoreError};
use chaos_types::{
    kinds::{
        hello_world::KIND_HELLO_WORLD_CHAOS, persistent_volume::KIND_PERSISTENT_VOLUME_CHAOS,
        persistent_volume_claim::KIND_PERSISTENT_VOLUME_CLAIM_CHAOS, pod::KIND_POD_CHAOS,
    },
    HelloWorldChaos, InnerObject, PersistentVolumeChaos, PersistentVolumeClaimChaos, PodChaos,
    PodChaosAction, TypedKind,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;
use thiserror::Error;

/// Registers every built-in kind. `PodChaos` is registered twice, once per
/// action, and routed by the action of each object.
pub fn registry_builder(config: &ControllerConfig) -> RegistryBuilder {
    let pause_image = config.pause_image.clone();
    RegistryBuilder::new()
        .register(
            "hello-world",
            Arc::new(TypedKind::<HelloWorldChaos>::new(KIND_HELLO_WORLD_CHAOS)),
            accept_all(),
            Arc::new(|context: Arc<EndpointContext>| -> Arc<dyn Endpoint> {
                Arc::new(HelloWorldEndpoint::new(context))
            }),
        )
        .register(
            "pod-kill",
            Arc::new(TypedKind::<PodChaos>::new(KIND_POD_CHAOS)),
            accepts_pod_action(PodChaosAction::PodKill),
            Arc::new(|context: Arc<EndpointContext>| -> Arc<dyn Endpoint> {
                Arc::new(PodKillEndpoint::new(context))
            }),
        )
        .register(
            "pod-failure",
            Arc::new(TypedKind::<PodChaos>::new(KIND_POD_CHAOS)),
            accepts_pod_action(PodChaosAction::PodFailure),
            Arc::new(move |context: Arc<EndpointContext>| -> Arc<dyn Endpoint> {
                Arc::new(PodFailureEndpoint::new(context, pause_image.clone()))
            }),
        )
        .register(
            "persistent-volume",
            Arc::new(TypedKind::<PersistentVolumeChaos>::new(
                KIND_PERSISTENT_VOLUME_CHAOS,
            )),
            accept_all(),
            Arc::new(|context: Arc<EndpointContext>| -> Arc<dyn Endpoint> {
                Arc::new(PersistentVolumeEndpoint::new(context))
            }),
        )
        .register(
            "persistent-volume-claim",
            Arc::new(TypedKind::<PersistentVolumeClaimChaos>::new(
                KIND_PERSISTENT_VOLUME_CLAIM_CHAOS,
            )),
            accept_all(),
            Arc::new(|context: Arc<EndpointContext>| -> Arc<dyn Endpoint> {
                Arc::new(PersistentVolumeClaimEndpoint::new(context))
            }),
        )
}

fn accepts_pod_action(action: PodChaosAction) -> AcceptFn {
    let action = action.as_str();
    Arc::new(move |chaos: &dyn InnerObject| chaos.action().as_deref() == Some(action))
}

/// `namespace/name`, or just `name` for cluster scoped objects.
pub(crate) fn object_name(metadata: &ObjectMeta) -> String {
    let name = metadata.name.as_deref().unwrap_or_default();
    match metadata.namespace.as_deref() {
        Some(namespace) => format!("{}/{}", namespace, name),
        None => name.to_string(),
    }
}

pub(crate) fn observe_selected(kind: &str, count: usize) {
    SELECTED_TARGETS
        .with_label_values(&[kind])
        .inc_by(count as u64);
}

/// Escapes a map key for use as a JSON pointer segment.
pub(crate) fn pointer_segment(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Strips every finalizer of the patched object.
pub(crate) fn remove_finalizers_patch() -> Result<json_patch::Patch, serde_json::Error> {
    serde_json::from_value(serde_json::json!([
        {"op": "remove", "path": "/metadata/finalizers"}
    ]))
}

#[derive(Debug, Error)]
pub(crate) enum DeleteError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{delete}; removing finalizers also failed: {release}")]
    Both {
        delete: StoreError,
        release: StoreError,
    },
}

/// Deletes one object. With `remove_finalizers` set, an object holding
/// finalizers has them stripped as well, whether or not the delete went
/// through.
pub(crate) async fn delete_object(
    store: &dyn ObjectStore,
    kind: &str,
    metadata: &ObjectMeta,
    remove_finalizers: bool,
) -> Result<(), DeleteError> {
    let namespace = metadata.namespace.as_deref();
    let name = metadata.name.as_deref().unwrap_or_default();
    let deleted = store
        .delete(kind, namespace, name, &DeleteOptions::default())
        .await;

    let has_finalizers = metadata
        .finalizers
        .as_ref()
        .map_or(false, |finalizers| !finalizers.is_empty());
    let released = if remove_finalizers && has_finalizers {
        match remove_finalizers_patch() {
            Ok(patch) => store
                .patch(kind, namespace, name, &Patch::Json(patch))
                .await
                .map(|_| ()),
            Err(e) => Err(e.into()),
        }
    } else {
        Ok(())
    };

    match (deleted, released) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e.into()),
        (Err(delete), Err(release)) => Err(DeleteError::Both { delete, release }),
    }
}
