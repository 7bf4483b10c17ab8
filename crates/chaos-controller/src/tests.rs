// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::ControllerConfig,
    control::{ExperimentControl, ExperimentFilter, ExperimentState},
    driver::Driver,
    endpoints::{PodKillEndpoint, POD_FAILURE_LABEL_KEY},
    reconciler::{Outcome, Reconciler},
    test_utils::{at, cluster, context, pod_chaos, registry, NAMESPACE},
    Error,
};
use async_trait::async_trait;
use chaos_router::{
    accept_all, Endpoint, EndpointContext, FanoutPolicy, FanoutReport, RegistryBuilder, Request,
    RouterError,
};
use chaos_store::{MemoryStore, ObjectStore, StoreOp, ANY_NAME, KIND_POD};
use chaos_types::{
    kinds::pod::KIND_POD_CHAOS, ChaosKinds, ExperimentPhase, InnerObject, Mode, PodChaos,
    PodChaosAction, SelectorSpec, TypedKind, RECORDS_FINALIZER,
};
use chrono::Duration;
use claims::{assert_err, assert_matches, assert_none, assert_ok, assert_some_eq};
use std::sync::Arc;

fn setup(fanout: FanoutPolicy) -> (Arc<MemoryStore>, Reconciler, ExperimentControl) {
    let store = cluster();
    let reconciler = Reconciler::new(registry(store.clone(), fanout));
    let control = ExperimentControl::new(
        store.clone() as Arc<dyn ObjectStore>,
        ChaosKinds::builtin(),
    );
    (store, reconciler, control)
}

fn load(store: &MemoryStore, name: &str) -> Option<PodChaos> {
    store
        .object(KIND_POD_CHAOS, Some(NAMESPACE), name)
        .map(|value| serde_json::from_value(value).unwrap())
}

fn failed_pods(store: &MemoryStore) -> usize {
    (0..5)
        .filter(|i| {
            let pod = store
                .object(KIND_POD, Some("default"), &format!("web-{}", i))
                .unwrap();
            !pod["metadata"]["labels"][POD_FAILURE_LABEL_KEY].is_null()
        })
        .count()
}

fn live_web_pods(store: &MemoryStore) -> usize {
    (0..5)
        .filter(|i| store.contains(KIND_POD, Some("default"), &format!("web-{}", i)))
        .count()
}

async fn reconcile_at(
    reconciler: &Reconciler,
    name: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> crate::Result<Outcome> {
    reconciler
        .reconcile("PodChaos", &Request::new(NAMESPACE, name), now)
        .await
}

#[tokio::test]
async fn test_one_shot_experiment_lifecycle() {
    let (store, reconciler, _) = setup(FanoutPolicy::BestEffort);
    let chaos = pod_chaos("fail", PodChaosAction::PodFailure, Mode::All, Some("10m"), None);
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();

    let start = at(10, 0, 0);
    let recover = start + Duration::minutes(10);
    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", start).await),
        Outcome::RequeueAt(recover)
    );
    let chaos = load(&store, "fail").unwrap();
    assert!(chaos.has_finalizer(RECORDS_FINALIZER));
    assert_eq!(chaos.phase(), ExperimentPhase::Running);
    assert_some_eq!(chaos.next_recover(), recover);
    assert_none!(chaos.next_start());
    let status = chaos.status.as_ref().unwrap();
    assert_some_eq!(status.experiment.start_time, start);
    assert_eq!(status.experiment.duration.as_deref(), Some("10m"));
    assert_eq!(failed_pods(&store), 5);

    // not due yet, nothing changes
    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", start + Duration::minutes(5)).await),
        Outcome::RequeueAt(recover)
    );
    assert_eq!(failed_pods(&store), 5);

    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", recover).await),
        Outcome::Done
    );
    let chaos = load(&store, "fail").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Finished);
    assert_none!(chaos.next_recover());
    assert_eq!(failed_pods(&store), 0);

    // finished experiments stay finished
    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", recover + Duration::hours(1)).await),
        Outcome::Done
    );
    assert_eq!(failed_pods(&store), 0);
}

#[tokio::test]
async fn test_recurring_experiment() {
    let (store, reconciler, _) = setup(FanoutPolicy::BestEffort);
    let chaos = pod_chaos("kill", PodChaosAction::PodKill, Mode::One, Some("5m"), Some("0 * * * *"));
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();

    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "kill", at(10, 0, 0)).await),
        Outcome::RequeueAt(at(10, 5, 0))
    );
    assert_eq!(live_web_pods(&store), 4);
    let chaos = load(&store, "kill").unwrap();
    assert_some_eq!(chaos.next_start(), at(11, 0, 0));

    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "kill", at(10, 5, 0)).await),
        Outcome::RequeueAt(at(11, 0, 0))
    );
    let chaos = load(&store, "kill").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Waiting);
    assert_none!(chaos.next_recover());

    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "kill", at(11, 0, 0)).await),
        Outcome::RequeueAt(at(11, 5, 0))
    );
    let chaos = load(&store, "kill").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Running);
    assert_some_eq!(chaos.next_start(), at(12, 0, 0));
    assert_eq!(live_web_pods(&store), 3);
}

#[tokio::test]
async fn test_pause_skips_apply_and_resume_keeps_times() {
    let (store, reconciler, control) = setup(FanoutPolicy::BestEffort);
    let chaos = pod_chaos("fail", PodChaosAction::PodFailure, Mode::All, Some("10m"), None);
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();
    assert_ok!(reconcile_at(&reconciler, "fail", at(10, 0, 0)).await);
    assert_eq!(failed_pods(&store), 5);

    assert_ok!(control.pause_experiment("podchaos", NAMESPACE, "fail").await);
    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", at(10, 2, 0)).await),
        Outcome::Done
    );
    let chaos = load(&store, "fail").unwrap();
    assert!(chaos.is_paused());
    assert_eq!(chaos.phase(), ExperimentPhase::Paused);
    assert_some_eq!(chaos.next_recover(), at(10, 10, 0));
    assert_eq!(failed_pods(&store), 0);

    // still paused: no apply even though the experiment is active
    assert_ok!(reconcile_at(&reconciler, "fail", at(10, 3, 0)).await);
    assert_eq!(failed_pods(&store), 0);

    assert_ok!(control.start_experiment("PodChaos", NAMESPACE, "fail").await);
    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", at(10, 4, 0)).await),
        Outcome::RequeueAt(at(10, 10, 0))
    );
    let chaos = load(&store, "fail").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Running);
    assert_some_eq!(chaos.next_recover(), at(10, 10, 0));
    assert_eq!(failed_pods(&store), 5);
}

#[tokio::test]
async fn test_paused_before_start_never_applies() {
    let (store, reconciler, control) = setup(FanoutPolicy::BestEffort);
    let chaos = pod_chaos("kill", PodChaosAction::PodKill, Mode::All, None, None);
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();
    assert_ok!(control.pause_experiment("PodChaos", NAMESPACE, "kill").await);

    assert_ok!(reconcile_at(&reconciler, "kill", at(10, 0, 0)).await);
    assert_eq!(live_web_pods(&store), 5);
    assert_eq!(load(&store, "kill").unwrap().phase(), ExperimentPhase::Paused);

    assert_ok!(control.start_experiment("PodChaos", NAMESPACE, "kill").await);
    assert_ok!(reconcile_at(&reconciler, "kill", at(10, 1, 0)).await);
    assert_eq!(live_web_pods(&store), 0);
}

#[tokio::test]
async fn test_deletion_recovers_and_releases() {
    let (store, reconciler, control) = setup(FanoutPolicy::BestEffort);
    let chaos = pod_chaos("fail", PodChaosAction::PodFailure, Mode::All, None, None);
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();
    assert_ok!(reconcile_at(&reconciler, "fail", at(10, 0, 0)).await);
    assert_eq!(failed_pods(&store), 5);

    assert_ok!(control.delete_experiment("PodChaos", NAMESPACE, "fail", false).await);
    // held by the finalizer until recovered
    let chaos = load(&store, "fail").unwrap();
    assert!(chaos.is_deleted());

    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", at(10, 1, 0)).await),
        Outcome::Done
    );
    assert_eq!(failed_pods(&store), 0);
    assert_none!(load(&store, "fail"));

    // a vanished experiment is not an error
    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", at(10, 2, 0)).await),
        Outcome::Done
    );
}

#[tokio::test]
async fn test_forced_delete_releases_after_failed_recovery() {
    let (store, reconciler, control) = setup(FanoutPolicy::FailFast);
    let chaos = pod_chaos("fail", PodChaosAction::PodFailure, Mode::All, None, None);
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();
    assert_ok!(reconcile_at(&reconciler, "fail", at(10, 0, 0)).await);

    store.fail_on(StoreOp::List, KIND_POD, ANY_NAME);
    assert_ok!(control.delete_experiment("PodChaos", NAMESPACE, "fail", false).await);
    assert_err!(reconcile_at(&reconciler, "fail", at(10, 1, 0)).await);
    let chaos = load(&store, "fail").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Failed);
    assert!(chaos.has_finalizer(RECORDS_FINALIZER));

    assert_ok!(control.delete_experiment("PodChaos", NAMESPACE, "fail", true).await);
    assert!(load(&store, "fail").unwrap().is_forced_cleanup());
    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", at(10, 2, 0)).await),
        Outcome::Done
    );
    assert_none!(load(&store, "fail"));
}

#[tokio::test]
async fn test_deleting_after_partial_apply_recovers() {
    let (store, reconciler, control) = setup(FanoutPolicy::FailFast);
    store.fail_on(StoreOp::Patch, KIND_POD, "web-3");
    let chaos = pod_chaos("fail", PodChaosAction::PodFailure, Mode::All, None, None);
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();

    let err = reconcile_at(&reconciler, "fail", at(10, 0, 0))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1 of 5 targets failed"), "{}", err);
    assert_eq!(failed_pods(&store), 4);
    let chaos = load(&store, "fail").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Failed);
    assert!(chaos.has_finalizer(RECORDS_FINALIZER));

    assert_ok!(control.delete_experiment("PodChaos", NAMESPACE, "fail", false).await);
    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", at(10, 1, 0)).await),
        Outcome::Done
    );
    assert_eq!(failed_pods(&store), 0);
    assert_none!(load(&store, "fail"));
}

#[tokio::test]
async fn test_pausing_after_partial_apply_recovers() {
    let (store, reconciler, control) = setup(FanoutPolicy::FailFast);
    store.fail_on(StoreOp::Patch, KIND_POD, "web-3");
    let chaos = pod_chaos("fail", PodChaosAction::PodFailure, Mode::All, None, None);
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();
    assert_err!(reconcile_at(&reconciler, "fail", at(10, 0, 0)).await);
    assert_eq!(failed_pods(&store), 4);

    assert_ok!(control.pause_experiment("PodChaos", NAMESPACE, "fail").await);
    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "fail", at(10, 1, 0)).await),
        Outcome::Done
    );
    assert_eq!(load(&store, "fail").unwrap().phase(), ExperimentPhase::Paused);
    assert_eq!(failed_pods(&store), 0);

    // resuming applies again, in full this time
    store.clear_failures();
    assert_ok!(control.start_experiment("PodChaos", NAMESPACE, "fail").await);
    assert_ok!(reconcile_at(&reconciler, "fail", at(10, 2, 0)).await);
    let chaos = load(&store, "fail").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Running);
    assert_none!(chaos.status.unwrap().experiment.end_time);
    assert_eq!(failed_pods(&store), 5);
}

/// Kills pods, then has the experiment paused before the apply returns.
struct PausedDuringApply {
    inner: PodKillEndpoint,
    control: ExperimentControl,
}

#[async_trait]
impl Endpoint for PausedDuringApply {
    async fn apply(
        &self,
        request: &Request,
        chaos: &mut dyn InnerObject,
    ) -> chaos_router::Result<FanoutReport> {
        let report = self.inner.apply(request, chaos).await?;
        assert_ok!(
            self.control
                .pause_experiment(KIND_POD_CHAOS, &request.namespace, &request.name)
                .await
        );
        Ok(report)
    }

    async fn recover(
        &self,
        request: &Request,
        chaos: &mut dyn InnerObject,
    ) -> chaos_router::Result<FanoutReport> {
        self.inner.recover(request, chaos).await
    }

    fn object(&self) -> Box<dyn InnerObject> {
        self.inner.object()
    }
}

#[tokio::test]
async fn test_pause_during_apply_is_kept() {
    let store = cluster();
    let control = ExperimentControl::new(
        store.clone() as Arc<dyn ObjectStore>,
        ChaosKinds::builtin(),
    );
    let registry = RegistryBuilder::new()
        .register(
            "pod-kill",
            Arc::new(TypedKind::<PodChaos>::new(KIND_POD_CHAOS)),
            accept_all(),
            Arc::new(move |context: Arc<EndpointContext>| -> Arc<dyn Endpoint> {
                Arc::new(PausedDuringApply {
                    inner: PodKillEndpoint::new(context),
                    control: control.clone(),
                })
            }),
        )
        .build(context(store.clone(), &ControllerConfig::default()));
    let reconciler = Reconciler::new(Arc::new(registry));

    let chaos = pod_chaos("kill", PodChaosAction::PodKill, Mode::One, Some("10m"), None);
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();
    assert_ok!(reconcile_at(&reconciler, "kill", at(10, 0, 0)).await);
    assert_eq!(live_web_pods(&store), 4);

    // the status write after the apply leaves the pause in place
    let chaos = load(&store, "kill").unwrap();
    assert!(chaos.is_paused());
    assert_eq!(chaos.phase(), ExperimentPhase::Running);
    assert_some_eq!(chaos.next_recover(), at(10, 10, 0));

    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "kill", at(10, 1, 0)).await),
        Outcome::Done
    );
    assert_eq!(load(&store, "kill").unwrap().phase(), ExperimentPhase::Paused);
    assert_eq!(live_web_pods(&store), 4);
}

#[tokio::test]
async fn test_unsupported_kind() {
    let (store, reconciler, control) = setup(FanoutPolicy::BestEffort);
    store.fail_on(StoreOp::Get, "TimeChaos", ANY_NAME);
    let err = reconciler
        .reconcile("TimeChaos", &Request::new(NAMESPACE, "clock"), at(10, 0, 0))
        .await
        .unwrap_err();
    assert_matches!(err, Error::Router(RouterError::NotSupported(_)));
    assert_eq!(err.to_string(), "TimeChaos is not supported");

    let err = control
        .pause_experiment("TimeChaos", NAMESPACE, "clock")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "TimeChaos is not supported");
}

#[tokio::test]
async fn test_usage_errors_fail_the_experiment() {
    let (store, reconciler, _) = setup(FanoutPolicy::BestEffort);
    let mut chaos = pod_chaos("vague", PodChaosAction::PodKill, Mode::All, None, None);
    chaos.spec.selector = SelectorSpec::default();
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();

    let err = reconcile_at(&reconciler, "vague", at(10, 0, 0))
        .await
        .unwrap_err();
    assert_eq!(err.get_label(), "router");
    let chaos = load(&store, "vague").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Failed);
    let message = chaos.status.unwrap().failed_message.unwrap();
    assert!(message.contains("ambiguous"), "{}", message);
    assert_eq!(live_web_pods(&store), 5);
}

#[tokio::test]
async fn test_schedule_conflict() {
    let (store, reconciler, _) = setup(FanoutPolicy::BestEffort);
    let chaos = pod_chaos("long", PodChaosAction::PodKill, Mode::One, Some("2h"), Some("0 * * * *"));
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();

    assert_matches!(
        reconcile_at(&reconciler, "long", at(10, 0, 0)).await,
        Err(Error::ScheduleConflict)
    );
    let chaos = load(&store, "long").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Failed);
    assert_eq!(
        chaos.status.unwrap().failed_message.as_deref(),
        Some("nextRecover shouldn't be later than nextStart")
    );
    assert_eq!(live_web_pods(&store), 5);
}

#[tokio::test]
async fn test_best_effort_failures_are_recorded() {
    let (store, reconciler, _) = setup(FanoutPolicy::BestEffort);
    store.fail_on(StoreOp::Delete, KIND_POD, "web-3");
    let chaos = pod_chaos("kill", PodChaosAction::PodKill, Mode::All, None, None);
    store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();

    assert_eq!(
        assert_ok!(reconcile_at(&reconciler, "kill", at(10, 0, 0)).await),
        Outcome::Done
    );
    let chaos = load(&store, "kill").unwrap();
    assert_eq!(chaos.phase(), ExperimentPhase::Running);
    let message = chaos.status.unwrap().failed_message.unwrap();
    assert!(message.starts_with("1 of 5 targets failed: default/web-3"), "{}", message);
}

#[tokio::test]
async fn test_driver_pass() {
    let (store, reconciler, _) = setup(FanoutPolicy::BestEffort);
    for name in ["a", "b"] {
        let chaos = pod_chaos(name, PodChaosAction::PodKill, Mode::One, Some("1h"), None);
        store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();
    }
    let mut vague = pod_chaos("c", PodChaosAction::PodKill, Mode::All, None, None);
    vague.spec.selector = SelectorSpec::default();
    store.insert_typed(KIND_POD_CHAOS, &vague).unwrap();

    let driver = Driver::new(Arc::new(reconciler), std::time::Duration::from_secs(10), 2);
    let summary = assert_ok!(driver.run_once().await);
    assert_eq!(summary.reconciled, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);
    assert!(summary.next_wakeup.is_some());
    assert_eq!(load(&store, "a").unwrap().phase(), ExperimentPhase::Running);
    assert_eq!(load(&store, "b").unwrap().phase(), ExperimentPhase::Running);

    store.fail_on(StoreOp::List, KIND_POD_CHAOS, ANY_NAME);
    assert_err!(driver.run_once().await);
}

#[tokio::test]
async fn test_experiment_state_and_listing() {
    let (store, reconciler, control) = setup(FanoutPolicy::BestEffort);
    for name in ["a", "b", "c"] {
        let chaos = pod_chaos(name, PodChaosAction::PodFailure, Mode::All, None, None);
        store.insert_typed(KIND_POD_CHAOS, &chaos).unwrap();
    }
    let mut elsewhere = pod_chaos("d", PodChaosAction::PodKill, Mode::One, None, None);
    elsewhere.metadata.namespace = Some("other".to_string());
    store.insert_typed(KIND_POD_CHAOS, &elsewhere).unwrap();

    assert_ok!(reconcile_at(&reconciler, "a", at(10, 0, 0)).await);
    assert_ok!(control.pause_experiment("PodChaos", NAMESPACE, "b").await);
    assert_ok!(reconcile_at(&reconciler, "b", at(10, 0, 0)).await);

    let state = assert_ok!(control.experiment_state(None).await);
    assert_eq!(state, ExperimentState {
        running: 1,
        waiting: 2,
        paused: 1,
        total: 4,
        ..Default::default()
    });
    let state = assert_ok!(control.experiment_state(Some("other")).await);
    assert_eq!(state.total, 1);

    let running = assert_ok!(
        control
            .list_experiments(&ExperimentFilter {
                kind: Some("podchaos".to_string()),
                status: Some(ExperimentPhase::Running),
                ..Default::default()
            })
            .await
    );
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].name, "a");
    assert_eq!(running[0].action, "pod-failure");

    let all = assert_ok!(control.list_experiments(&ExperimentFilter::default()).await);
    let names: Vec<_> = all
        .iter()
        .map(|e| format!("{}/{}", e.namespace, e.name))
        .collect();
    assert_eq!(names, vec![
        "chaos-testing/a",
        "chaos-testing/b",
        "chaos-testing/c",
        "other/d"
    ]);

    let named = assert_ok!(
        control
            .list_experiments(&ExperimentFilter {
                name: Some("d".to_string()),
                namespace: Some("other".to_string()),
                ..Default::default()
            })
            .await
    );
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].kind, "PodChaos");
}
