// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    object_key, DeleteOptions, ListQuery, ObjectStore, Patch, Result, StoreError, KIND_NODE,
    KIND_PERSISTENT_VOLUME, KIND_PERSISTENT_VOLUME_CLAIM, KIND_POD,
};
use async_trait::async_trait;
use chaos_types::{
    kinds::{
        hello_world::KIND_HELLO_WORLD_CHAOS, persistent_volume::KIND_PERSISTENT_VOLUME_CHAOS,
        persistent_volume_claim::KIND_PERSISTENT_VOLUME_CLAIM_CHAOS, pod::KIND_POD_CHAOS,
    },
    HelloWorldChaos, PersistentVolumeChaos, PersistentVolumeClaimChaos, PodChaos,
};
use k8s_openapi::api::core::v1::{Node, PersistentVolume, PersistentVolumeClaim, Pod};
use kube::{
    api::{Api, DeleteParams, DynamicObject, ListParams, PatchParams, PostParams},
    discovery::ApiResource,
    Client, Resource,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

struct Registered {
    resource: ApiResource,
    namespaced: bool,
}

/// Object store over the Kubernetes API. Every kind the controller touches
/// is registered up front, so no discovery round trip is needed.
pub struct K8sStore {
    client: Client,
    resources: HashMap<String, Registered>,
}

impl K8sStore {
    pub fn new(client: Client) -> Self {
        let mut store = Self {
            client,
            resources: HashMap::new(),
        };
        store.register::<Pod>(KIND_POD, true);
        store.register::<Node>(KIND_NODE, false);
        store.register::<PersistentVolume>(KIND_PERSISTENT_VOLUME, false);
        store.register::<PersistentVolumeClaim>(KIND_PERSISTENT_VOLUME_CLAIM, true);
        store.register::<HelloWorldChaos>(KIND_HELLO_WORLD_CHAOS, true);
        store.register::<PodChaos>(KIND_POD_CHAOS, true);
        store.register::<PersistentVolumeChaos>(KIND_PERSISTENT_VOLUME_CHAOS, true);
        store.register::<PersistentVolumeClaimChaos>(KIND_PERSISTENT_VOLUME_CLAIM_CHAOS, true);
        store
    }

    /// Connects with the ambient kubeconfig or in-cluster service account.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.map_err(|e| StoreError::Api {
            op: "connect",
            kind: String::new(),
            name: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self::new(client))
    }

    pub fn register<K: Resource<DynamicType = ()>>(&mut self, kind: &str, namespaced: bool) {
        self.resources.insert(kind.to_string(), Registered {
            resource: ApiResource::erase::<K>(&()),
            namespaced,
        });
    }

    fn api(&self, kind: &str, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let registered = self
            .resources
            .get(kind)
            .ok_or_else(|| StoreError::UnknownKind(kind.to_string()))?;
        let client = self.client.clone();
        Ok(match (registered.namespaced, namespace) {
            (true, Some(namespace)) => {
                Api::namespaced_with(client, namespace, &registered.resource)
            },
            _ => Api::all_with(client, &registered.resource),
        })
    }
}

fn api_error(op: &'static str, kind: &str, name: &str, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        err => StoreError::Api {
            op,
            kind: kind.to_string(),
            name: name.to_string(),
            message: err.to_string(),
        },
    }
}

fn kube_patch(patch: &Patch) -> kube::api::Patch<Value> {
    match patch {
        Patch::Merge(merge) => kube::api::Patch::Merge(merge.clone()),
        Patch::Json(json) => kube::api::Patch::Json(json.clone()),
    }
}

#[async_trait]
impl ObjectStore for K8sStore {
    async fn get(&self, kind: &str, namespace: Option<&str>, name: &str) -> Result<Value> {
        let object = self
            .api(kind, namespace)?
            .get(name)
            .await
            .map_err(|e| api_error("get", kind, name, e))?;
        Ok(serde_json::to_value(object)?)
    }

    async fn list(&self, kind: &str, query: &ListQuery) -> Result<Vec<Value>> {
        let mut params = ListParams::default();
        if let Some(labels) = &query.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &query.field_selector {
            params = params.fields(fields);
        }
        debug!(kind = %kind, query = ?query, "listing objects");
        let list = self
            .api(kind, query.namespace.as_deref())?
            .list(&params)
            .await
            .map_err(|e| api_error("list", kind, "", e))?;
        list.items
            .into_iter()
            .map(|object| serde_json::to_value(object).map_err(StoreError::from))
            .collect()
    }

    async fn patch(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        patch: &Patch,
    ) -> Result<Value> {
        let object = self
            .api(kind, namespace)?
            .patch(name, &PatchParams::default(), &kube_patch(patch))
            .await
            .map_err(|e| api_error("patch", kind, name, e))?;
        Ok(serde_json::to_value(object)?)
    }

    async fn patch_status(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        patch: &Patch,
    ) -> Result<Value> {
        let object = self
            .api(kind, namespace)?
            .patch_status(name, &PatchParams::default(), &kube_patch(patch))
            .await
            .map_err(|e| api_error("patch_status", kind, name, e))?;
        Ok(serde_json::to_value(object)?)
    }

    async fn delete(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<()> {
        let params = DeleteParams {
            grace_period_seconds: options.grace_period_seconds,
            ..Default::default()
        };
        self.api(kind, namespace)?
            .delete(name, &params)
            .await
            .map_err(|e| api_error("delete", kind, name, e))?;
        Ok(())
    }

    /// Writes the object, then its status through the status subresource,
    /// which a plain replace leaves untouched for custom resources.
    async fn update(&self, kind: &str, object: Value) -> Result<Value> {
        let (namespace, name) = object_key(&object);
        let status = object.get("status").cloned();
        let api = self.api(kind, namespace.as_deref())?;
        let replaced = api
            .replace(&name, &PostParams::default(), &serde_json::from_value::<DynamicObject>(object)?)
            .await
            .map_err(|e| api_error("update", kind, &name, e))?;
        let Some(status) = status else {
            return Ok(serde_json::to_value(replaced)?);
        };

        let mut object = serde_json::to_value(replaced)?;
        object["status"] = status;
        let replaced = api
            .replace_status(&name, &PostParams::default(), serde_json::to_vec(&object)?)
            .await
            .map_err(|e| api_error("update_status", kind, &name, e))?;
        Ok(serde_json::to_value(replaced)?)
    }
}
