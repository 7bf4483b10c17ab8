// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{config::ControllerConfig, endpoints};
use chaos_router::{EndpointContext, FanoutPolicy, Registry};
use chaos_selector::{CandidateResolver, SelectionEngine};
use chaos_store::{
    MemoryStore, ObjectStore, KIND_PERSISTENT_VOLUME, KIND_PERSISTENT_VOLUME_CLAIM, KIND_POD,
};
use chaos_types::{Mode, PodChaos, PodChaosAction, PodChaosSpec, SchedulerSpec, SelectorSpec};
use chrono::{DateTime, TimeZone, Utc};
use maplit::btreemap;
use rand::{rngs::StdRng, SeedableRng};
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAMESPACE: &str = "chaos-testing";

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
}

pub fn pod(name: &str, app: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"namespace": "default", "name": name, "labels": {"app": app}},
        "spec": {
            "nodeName": "node-a",
            "containers": [
                {"name": "main", "image": format!("{}:1.0", app)},
                {"name": "sidecar", "image": "envoy:1.28"},
            ],
        },
        "status": {"phase": "Running"},
    })
}

/// Five `web` pods, two `db` pods, three volumes and two claims.
pub fn cluster() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for i in 0..5 {
        store.insert(KIND_POD, pod(&format!("web-{}", i), "web")).unwrap();
    }
    for i in 0..2 {
        store.insert(KIND_POD, pod(&format!("db-{}", i), "db")).unwrap();
    }
    for (name, finalizers) in [("pv-0", true), ("pv-1", false), ("pv-2", true)] {
        let mut volume = json!({"metadata": {"name": name, "labels": {"tier": "fast"}}});
        if finalizers {
            volume["metadata"]["finalizers"] = json!(["kubernetes.io/pv-protection"]);
        }
        store.insert(KIND_PERSISTENT_VOLUME, volume).unwrap();
    }
    for name in ["data-0", "data-1"] {
        store
            .insert(
                KIND_PERSISTENT_VOLUME_CLAIM,
                json!({"metadata": {
                    "namespace": "default",
                    "name": name,
                    "labels": {"app": "web"},
                    "finalizers": ["kubernetes.io/pvc-protection"],
                }}),
            )
            .unwrap();
    }
    Arc::new(store)
}

/// Endpoint context over `store` with a seeded sampler.
pub fn context(store: Arc<MemoryStore>, config: &ControllerConfig) -> Arc<EndpointContext> {
    let store = store as Arc<dyn ObjectStore>;
    let resolver = CandidateResolver::new(store.clone(), Arc::new(config.scope().unwrap()));
    Arc::new(EndpointContext::new(
        store,
        Arc::new(SelectionEngine::with_rng(resolver, StdRng::seed_from_u64(7))),
        config.fanout_policy,
    ))
}

pub fn registry_with(store: Arc<MemoryStore>, config: &ControllerConfig) -> Arc<Registry> {
    Arc::new(endpoints::registry_builder(config).build(context(store, config)))
}

pub fn registry(store: Arc<MemoryStore>, fanout: FanoutPolicy) -> Arc<Registry> {
    let config = ControllerConfig {
        fanout_policy: fanout,
        ..Default::default()
    };
    registry_with(store, &config)
}

pub fn web_selector() -> SelectorSpec {
    SelectorSpec {
        label_selectors: btreemap! { "app".to_string() => "web".to_string() },
        ..Default::default()
    }
}

pub fn pod_chaos(
    name: &str,
    action: PodChaosAction,
    mode: Mode,
    duration: Option<&str>,
    cron: Option<&str>,
) -> PodChaos {
    let mut chaos = PodChaos::new(name, PodChaosSpec {
        selector: web_selector(),
        action,
        mode,
        duration: duration.map(str::to_string),
        scheduler: cron.map(|cron| SchedulerSpec {
            cron: cron.to_string(),
        }),
        ..Default::default()
    });
    chaos.metadata.namespace = Some(NAMESPACE.to_string());
    chaos
}
