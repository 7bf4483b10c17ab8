// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Concrete experiment kinds and the prototype registry that lets callers
//! decode a kind-erased object by kind name.

use crate::{ChaosInstance, Error, InnerObject, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{collections::BTreeMap, marker::PhantomData, sync::Arc};

/// Implements the shared experiment accessors for a kube-derived kind.
/// Every spec is expected to carry `duration` and `scheduler` fields.
macro_rules! impl_inner_object {
    ($ty:ident, $kind:expr) => {
        impl $crate::InnerObject for $ty {
            fn kind(&self) -> &'static str {
                $kind
            }

            fn metadata(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(
                &mut self,
            ) -> &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &mut self.metadata
            }

            fn duration_spec(&self) -> Option<&str> {
                self.spec.duration.as_deref()
            }

            fn scheduler(&self) -> Option<&$crate::SchedulerSpec> {
                self.spec.scheduler.as_ref()
            }

            fn chaos_status(&self) -> Option<&$crate::ChaosStatus> {
                self.status.as_ref()
            }

            fn chaos_status_mut(&mut self) -> &mut $crate::ChaosStatus {
                self.status.get_or_insert_with(Default::default)
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }

            fn clone_object(&self) -> Box<dyn $crate::InnerObject> {
                Box::new(self.clone())
            }

            fn to_value(&self) -> $crate::Result<serde_json::Value> {
                serde_json::to_value(self).map_err(|source| $crate::Error::Encode {
                    kind: $kind.to_string(),
                    source,
                })
            }
        }

        impl $crate::kinds::Prototype for $ty {
            fn prototype() -> Self {
                Self::new("", Default::default())
            }
        }
    };
}

/// Implements [`crate::SelectSpec`] for a spec carrying `selector`, `mode`
/// and `value`.
macro_rules! impl_select_spec {
    ($ty:ident) => {
        impl $crate::SelectSpec for $ty {
            fn selector(&self) -> &$crate::SelectorSpec {
                &self.selector
            }

            fn mode(&self) -> $crate::Mode {
                self.mode
            }

            fn value(&self) -> &str {
                &self.value
            }
        }
    };
}

pub mod hello_world;
pub mod persistent_volume;
pub mod persistent_volume_claim;
pub mod pod;

/// An empty object of a kind.
pub trait Prototype: Sized {
    fn prototype() -> Self;
}

/// Kind-erased handle on one experiment kind: produces the empty object and
/// decodes single objects or lists of them.
pub trait ChaosKind: Send + Sync {
    fn kind(&self) -> &'static str;

    fn object(&self) -> Box<dyn InnerObject>;

    fn decode(&self, value: Value) -> Result<Box<dyn InnerObject>>;

    fn decode_list(&self, items: Vec<Value>) -> Result<Vec<Box<dyn InnerObject>>> {
        items.into_iter().map(|item| self.decode(item)).collect()
    }

    fn list_chaos(&self, items: Vec<Value>) -> Result<Vec<ChaosInstance>> {
        Ok(self
            .decode_list(items)?
            .iter()
            .map(|object| object.chaos_instance())
            .collect())
    }
}

pub struct TypedKind<K> {
    kind: &'static str,
    _marker: PhantomData<fn() -> K>,
}

impl<K> TypedKind<K> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            _marker: PhantomData,
        }
    }
}

impl<K> ChaosKind for TypedKind<K>
where
    K: InnerObject + Prototype + DeserializeOwned,
{
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn object(&self) -> Box<dyn InnerObject> {
        Box::new(K::prototype())
    }

    fn decode(&self, value: Value) -> Result<Box<dyn InnerObject>> {
        let object: K = serde_json::from_value(value).map_err(|source| Error::Decode {
            kind: self.kind.to_string(),
            source,
        })?;
        Ok(Box::new(object))
    }
}

/// Every experiment kind known to the process, keyed by lower-cased kind
/// name. Built once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct ChaosKinds {
    kinds: BTreeMap<String, Arc<dyn ChaosKind>>,
}

impl ChaosKinds {
    pub fn builtin() -> Self {
        let mut kinds = Self::default();
        kinds.register(Arc::new(TypedKind::<hello_world::HelloWorldChaos>::new(
            hello_world::KIND_HELLO_WORLD_CHAOS,
        )));
        kinds.register(Arc::new(TypedKind::<pod::PodChaos>::new(
            pod::KIND_POD_CHAOS,
        )));
        kinds.register(Arc::new(
            TypedKind::<persistent_volume::PersistentVolumeChaos>::new(
                persistent_volume::KIND_PERSISTENT_VOLUME_CHAOS,
            ),
        ));
        kinds.register(Arc::new(TypedKind::<
            persistent_volume_claim::PersistentVolumeClaimChaos,
        >::new(
            persistent_volume_claim::KIND_PERSISTENT_VOLUME_CLAIM_CHAOS,
        )));
        kinds
    }

    pub fn register(&mut self, kind: Arc<dyn ChaosKind>) {
        self.kinds.insert(kind.kind().to_ascii_lowercase(), kind);
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn ChaosKind>> {
        self.kinds.get(&kind.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ChaosKind>> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ExperimentPhase, HasAction, Mode, PodChaos, PodChaosAction, PodChaosSpec,
        PAUSE_ANNOTATION_KEY,
    };
    use chrono::{TimeZone, Utc};
    use claims::{assert_err, assert_none, assert_ok, assert_some_eq};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use maplit::btreemap;
    use serde_json::json;

    fn pod_chaos(duration: Option<&str>) -> PodChaos {
        let mut chaos = PodChaos::new("kill-one", PodChaosSpec {
            action: PodChaosAction::PodKill,
            mode: Mode::One,
            duration: duration.map(str::to_string),
            ..Default::default()
        });
        chaos.metadata.namespace = Some("chaos-testing".to_string());
        chaos.metadata.uid = Some("uid-1".to_string());
        chaos
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let kinds = ChaosKinds::builtin();
        assert_eq!(kinds.len(), 4);
        assert_eq!(kinds.get("podchaos").unwrap().kind(), "PodChaos");
        assert_eq!(kinds.get("PersistentVolumeChaos").unwrap().kind(), "PersistentVolumeChaos");
        assert!(kinds.get("timechaos").is_none());
    }

    #[test]
    fn test_decode_through_prototype() {
        let kinds = ChaosKinds::builtin();
        let value = assert_ok!(pod_chaos(Some("30s")).to_value());
        let object = assert_ok!(kinds.get("podchaos").unwrap().decode(value));
        let chaos = object.as_any().downcast_ref::<PodChaos>().unwrap();
        assert_eq!(chaos.spec.action, PodChaosAction::PodKill);
        assert_eq!(object.name(), "kill-one");

        let err = kinds
            .get("podchaos")
            .unwrap()
            .decode(json!({"spec": "nope"}))
            .unwrap_err();
        assert_eq!(err.get_label(), "decode");
    }

    #[test]
    fn test_duration_parse() {
        assert_some_eq!(
            pod_chaos(Some("1m30s")).duration().unwrap(),
            std::time::Duration::from_secs(90)
        );
        assert_none!(pod_chaos(None).duration().unwrap());
        assert_err!(pod_chaos(Some("soon")).duration());
    }

    #[test]
    fn test_pause_annotation() {
        let mut chaos = pod_chaos(None);
        assert!(!chaos.is_paused());
        chaos.metadata.annotations = Some(btreemap! {
            PAUSE_ANNOTATION_KEY.to_string() => "false".to_string(),
        });
        assert!(!chaos.is_paused());
        chaos.metadata.annotations = Some(btreemap! {
            PAUSE_ANNOTATION_KEY.to_string() => "true".to_string(),
        });
        assert!(chaos.is_paused());
    }

    #[test]
    fn test_next_times_clear_with_none() {
        let mut chaos = pod_chaos(None);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        chaos.set_next_start(Some(at));
        chaos.set_next_recover(Some(at));
        assert_some_eq!(chaos.next_start(), at);
        chaos.set_next_start(None);
        assert_none!(chaos.next_start());
        assert_some_eq!(chaos.next_recover(), at);

        let value = chaos.to_value().unwrap();
        assert!(value["status"]["scheduler"].get("nextStart").is_none());
    }

    #[test]
    fn test_chaos_instance_projection() {
        let mut chaos = pod_chaos(Some("10m"));
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        chaos.metadata.creation_timestamp = Some(Time(created));

        let instance = chaos.chaos_instance();
        assert_eq!(instance.kind, "PodChaos");
        assert_eq!(instance.action, "pod-kill");
        assert_eq!(instance.uid, "uid-1");
        assert_eq!(instance.duration, "10m");
        assert_eq!(instance.status, ExperimentPhase::Waiting);
        assert_some_eq!(instance.start_time, created);
        assert!(instance.is_active());

        let deleted = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        chaos.metadata.deletion_timestamp = Some(Time(deleted));
        assert!(chaos.is_deleted());
        assert_some_eq!(chaos.chaos_instance().end_time, deleted);
        assert_eq!(chaos.action(), Some("pod-kill".to_string()));
    }
}
