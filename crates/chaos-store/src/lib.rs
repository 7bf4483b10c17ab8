// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! The object store capability the controller is built on: get, list,
//! patch, delete and update of cluster objects addressed by kind,
//! namespace and name. Objects travel as JSON values so one store serves
//! every kind; the `*_typed` helpers decode into concrete types.

mod error;
pub mod k8s;
pub mod memory;

pub use error::StoreError;
pub use k8s::K8sStore;
pub use memory::{MemoryStore, StoreOp, ANY_NAME};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type Result<T, E = StoreError> = ::std::result::Result<T, E>;

pub const KIND_POD: &str = "Pod";
pub const KIND_NODE: &str = "Node";
pub const KIND_PERSISTENT_VOLUME: &str = "PersistentVolume";
pub const KIND_PERSISTENT_VOLUME_CLAIM: &str = "PersistentVolumeClaim";

/// Filters applied by the store itself. Selectors use the Kubernetes
/// selector grammar, e.g. `app=web,tier=db`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl ListQuery {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn labels(mut self, selector: &BTreeMap<String, String>) -> Self {
        self.label_selector = non_empty(selector);
        self
    }

    pub fn fields(mut self, selector: &BTreeMap<String, String>) -> Self {
        self.field_selector = non_empty(selector);
        self
    }
}

fn non_empty(selector: &BTreeMap<String, String>) -> Option<String> {
    if selector.is_empty() {
        None
    } else {
        Some(chaos_types::labels::selector_from_set(selector))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Patch {
    /// RFC 7386 merge patch.
    Merge(Value),
    /// RFC 6902 JSON patch.
    Json(json_patch::Patch),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub grace_period_seconds: Option<u32>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fails with [`StoreError::NotFound`] when the object does not exist.
    async fn get(&self, kind: &str, namespace: Option<&str>, name: &str) -> Result<Value>;

    async fn list(&self, kind: &str, query: &ListQuery) -> Result<Vec<Value>>;

    async fn patch(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        patch: &Patch,
    ) -> Result<Value>;

    /// Patches only the status of the object. Stores that serve status
    /// through a separate subresource override this.
    async fn patch_status(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        patch: &Patch,
    ) -> Result<Value> {
        self.patch(kind, namespace, name, patch).await
    }

    async fn delete(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<()>;

    /// Replaces the stored object with `object`, addressed by its own
    /// metadata.
    async fn update(&self, kind: &str, object: Value) -> Result<Value>;
}

pub async fn get_typed<K: DeserializeOwned>(
    store: &dyn ObjectStore,
    kind: &str,
    namespace: Option<&str>,
    name: &str,
) -> Result<K> {
    let value = store.get(kind, namespace, name).await?;
    Ok(serde_json::from_value(value)?)
}

pub async fn list_typed<K: DeserializeOwned>(
    store: &dyn ObjectStore,
    kind: &str,
    query: &ListQuery,
) -> Result<Vec<K>> {
    store
        .list(kind, query)
        .await?
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(StoreError::from))
        .collect()
}

pub async fn update_typed<K: Serialize + DeserializeOwned>(
    store: &dyn ObjectStore,
    kind: &str,
    object: &K,
) -> Result<K> {
    let value = store.update(kind, serde_json::to_value(object)?).await?;
    Ok(serde_json::from_value(value)?)
}

/// Reads `metadata.namespace` and `metadata.name` off a raw object.
pub fn object_key(object: &Value) -> (Option<String>, String) {
    let metadata = &object["metadata"];
    (
        metadata["namespace"].as_str().map(str::to_string),
        metadata["name"].as_str().unwrap_or_default().to_string(),
    )
}
