// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! An in-process object store. Backs dry runs and every test that would
//! otherwise need a cluster.

use crate::{object_key, DeleteOptions, ListQuery, ObjectStore, Patch, Result, StoreError};
use async_trait::async_trait;
use chaos_types::labels;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Matches any object name in [`MemoryStore::fail_on`].
pub const ANY_NAME: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    List,
    Patch,
    Delete,
    Update,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Get => "get",
            StoreOp::List => "list",
            StoreOp::Patch => "patch",
            StoreOp::Delete => "delete",
            StoreOp::Update => "update",
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// (kind, namespace, name)
type ObjectKey = (String, Option<String>, String);

#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<ObjectKey, Value>>,
    failures: RwLock<HashSet<(StoreOp, String, String)>>,
    revision: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `object` as-is, stamping a uid and a creation timestamp when
    /// the object has none. Every write assigns a fresh resource version.
    pub fn insert(&self, kind: &str, mut object: Value) -> Result<()> {
        let (namespace, name) = object_key(&object);
        if name.is_empty() {
            return Err(StoreError::Api {
                op: StoreOp::Update.as_str(),
                kind: kind.to_string(),
                name,
                message: "object has no metadata.name".to_string(),
            });
        }
        let metadata = &mut object["metadata"];
        if metadata["uid"].is_null() {
            metadata["uid"] = Value::String(uuid::Uuid::new_v4().to_string());
        }
        if metadata["creationTimestamp"].is_null() {
            metadata["creationTimestamp"] = Value::String(now());
        }
        self.stamp(&mut object);
        self.objects
            .write()
            .insert((kind.to_string(), namespace, name), object);
        Ok(())
    }

    pub fn insert_typed<K: Serialize>(&self, kind: &str, object: &K) -> Result<()> {
        self.insert(kind, serde_json::to_value(object)?)
    }

    /// A copy of the stored object, if present.
    pub fn object(&self, kind: &str, namespace: Option<&str>, name: &str) -> Option<Value> {
        self.objects.read().get(&key(kind, namespace, name)).cloned()
    }

    pub fn contains(&self, kind: &str, namespace: Option<&str>, name: &str) -> bool {
        self.objects.read().contains_key(&key(kind, namespace, name))
    }

    pub fn count(&self, kind: &str) -> usize {
        self.objects
            .read()
            .keys()
            .filter(|(object_kind, ..)| object_kind == kind)
            .count()
    }

    /// Makes every subsequent `op` on the named object fail. Use
    /// [`ANY_NAME`] to fail the operation for every object of the kind.
    pub fn fail_on(&self, op: StoreOp, kind: &str, name: &str) {
        self.failures
            .write()
            .insert((op, kind.to_string(), name.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    fn stamp(&self, object: &mut Value) {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        object["metadata"]["resourceVersion"] = Value::String(revision.to_string());
    }

    fn check(&self, op: StoreOp, kind: &str, name: &str) -> Result<()> {
        let failures = self.failures.read();
        let scripted = |name: &str| failures.contains(&(op, kind.to_string(), name.to_string()));
        if scripted(name) || scripted(ANY_NAME) {
            return Err(StoreError::Api {
                op: op.as_str(),
                kind: kind.to_string(),
                name: name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    /// Writes `object` back, unless it is marked deleted and has no
    /// finalizers left, in which case it is dropped.
    fn settle(objects: &mut BTreeMap<ObjectKey, Value>, key: ObjectKey, object: Value) {
        let deleted = !object["metadata"]["deletionTimestamp"].is_null();
        if deleted && !has_finalizers(&object) {
            objects.remove(&key);
        } else {
            objects.insert(key, object);
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, kind: &str, namespace: Option<&str>, name: &str) -> Result<Value> {
        self.check(StoreOp::Get, kind, name)?;
        self.object(kind, namespace, name)
            .ok_or_else(|| not_found(kind, namespace, name))
    }

    async fn list(&self, kind: &str, query: &ListQuery) -> Result<Vec<Value>> {
        self.check(StoreOp::List, kind, ANY_NAME)?;
        let parse = |selector: &Option<String>| {
            labels::parse(selector.as_deref().unwrap_or_default()).map_err(|e| StoreError::Api {
                op: StoreOp::List.as_str(),
                kind: kind.to_string(),
                name: String::new(),
                message: e.to_string(),
            })
        };
        let label_requirements = parse(&query.label_selector)?;
        let field_requirements = parse(&query.field_selector)?;

        Ok(self
            .objects
            .read()
            .iter()
            .filter(|((object_kind, namespace, _), _)| {
                object_kind == kind
                    && query
                        .namespace
                        .as_ref()
                        .map_or(true, |wanted| namespace.as_ref() == Some(wanted))
            })
            .filter(|(_, object)| {
                labels::matches_all(&label_requirements, &string_map(&object["metadata"]["labels"]))
            })
            .filter(|(_, object)| {
                let fields = field_requirements
                    .iter()
                    .filter_map(|req| {
                        field_value(object, req.key()).map(|value| (req.key().to_string(), value))
                    })
                    .collect();
                labels::matches_all(&field_requirements, &fields)
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn patch(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        patch: &Patch,
    ) -> Result<Value> {
        self.check(StoreOp::Patch, kind, name)?;
        let key = key(kind, namespace, name);
        let mut objects = self.objects.write();
        let mut object = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(kind, namespace, name))?;
        match patch {
            Patch::Merge(merge) => {
                // A resource version in the patch is a precondition.
                check_version(kind, name, &object, &merge["metadata"]["resourceVersion"])?;
                json_patch::merge(&mut object, merge)
            },
            Patch::Json(json) => json_patch::patch(&mut object, &json.0)?,
        }
        self.stamp(&mut object);
        Self::settle(&mut objects, key, object.clone());
        Ok(object)
    }

    async fn delete(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        _options: &DeleteOptions,
    ) -> Result<()> {
        self.check(StoreOp::Delete, kind, name)?;
        let key = key(kind, namespace, name);
        let mut objects = self.objects.write();
        let mut object = objects
            .remove(&key)
            .ok_or_else(|| not_found(kind, namespace, name))?;
        if object["metadata"]["deletionTimestamp"].is_null() {
            object["metadata"]["deletionTimestamp"] = Value::String(now());
        }
        self.stamp(&mut object);
        Self::settle(&mut objects, key, object);
        Ok(())
    }

    /// Rejects the write with [`StoreError::Conflict`] when `object`
    /// carries a resource version other than the stored one.
    async fn update(&self, kind: &str, mut object: Value) -> Result<Value> {
        let (namespace, name) = object_key(&object);
        self.check(StoreOp::Update, kind, &name)?;
        let key = key(kind, namespace.as_deref(), &name);
        let mut objects = self.objects.write();
        let stored = objects
            .get(&key)
            .ok_or_else(|| not_found(kind, namespace.as_deref(), &name))?;
        check_version(kind, &name, stored, &object["metadata"]["resourceVersion"])?;
        self.stamp(&mut object);
        Self::settle(&mut objects, key, object.clone());
        Ok(object)
    }
}

fn key(kind: &str, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        kind.to_string(),
        namespace.map(str::to_string),
        name.to_string(),
    )
}

fn not_found(kind: &str, namespace: Option<&str>, name: &str) -> StoreError {
    StoreError::NotFound {
        kind: kind.to_string(),
        name: match namespace {
            Some(namespace) => format!("{}/{}", namespace, name),
            None => name.to_string(),
        },
    }
}

fn check_version(kind: &str, name: &str, stored: &Value, expected: &Value) -> Result<()> {
    match expected.as_str() {
        Some(expected) if stored["metadata"]["resourceVersion"].as_str() != Some(expected) => {
            Err(StoreError::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
            })
        },
        _ => Ok(()),
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn has_finalizers(object: &Value) -> bool {
    object["metadata"]["finalizers"]
        .as_array()
        .map_or(false, |finalizers| !finalizers.is_empty())
}

fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Resolves a dotted field path such as `spec.nodeName`.
fn field_value(object: &Value, path: &str) -> Option<String> {
    let pointer = format!("/{}", path.replace('.', "/"));
    object.pointer(&pointer).and_then(|value| match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}
