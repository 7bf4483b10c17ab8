// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! One reconcile pass over one experiment: decides between apply, recover,
//! pause and waiting, dispatches to the routed endpoint and writes the
//! resulting status back.
//!
//! Status and finalizers are written with patches, never by replacing the
//! object, so edits made while an endpoint runs (a pause, say) survive.

use crate::{
    counters::{
        observe_dispatch, APPLY_LABEL, ERROR_LABEL, RECONCILE_RESULTS, RECOVER_LABEL,
        SUCCESS_LABEL,
    },
    scheduler::{NextTimes, Recurrence},
    Error, Result,
};
use chaos_router::{Endpoint, FanoutReport, KindEntry, Registry, Request};
use chaos_store::{ObjectStore, Patch, StoreError};
use chaos_types::{ChaosStatus, ExperimentPhase, InnerObject, RECORDS_FINALIZER};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::{fmt, sync::Arc};
use tracing::{debug, error, info, warn};

/// What the caller should do after a reconcile pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing is scheduled; wait for the next change.
    Done,
    RequeueAt(DateTime<Utc>),
}

impl Outcome {
    fn from_times(next_start: Option<DateTime<Utc>>, next_recover: Option<DateTime<Utc>>) -> Self {
        NextTimes {
            next_start,
            next_recover,
        }
        .earliest()
        .map_or(Outcome::Done, Outcome::RequeueAt)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Apply,
    Recover,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Apply => APPLY_LABEL,
            Operation::Recover => RECOVER_LABEL,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct Reconciler {
    registry: Arc<Registry>,
}

impl Reconciler {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn store(&self) -> &dyn ObjectStore {
        self.registry.context().store.as_ref()
    }

    /// Reconciles the experiment `request` of `kind` as of `now`. Unknown
    /// kinds fail before the store is touched.
    pub async fn reconcile(&self, kind: &str, request: &Request, now: DateTime<Utc>) -> Result<Outcome> {
        let entry = self.registry.lookup(kind)?;
        let result = self.reconcile_entry(entry, request, now).await;
        let label = match &result {
            Ok(_) => SUCCESS_LABEL,
            Err(e) => e.get_label(),
        };
        RECONCILE_RESULTS
            .with_label_values(&[entry.kind().kind(), label])
            .inc();
        result
    }

    async fn reconcile_entry(
        &self,
        entry: &KindEntry,
        request: &Request,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let kind = entry.kind().kind();
        let value = match self
            .store()
            .get(kind, Some(request.namespace.as_str()), &request.name)
            .await
        {
            Ok(value) => value,
            Err(e) if e.is_not_found() => {
                debug!(kind = kind, request = %request, "experiment is gone");
                return Ok(Outcome::Done);
            },
            Err(e) => return Err(e.into()),
        };
        let mut chaos = entry.kind().decode(value)?;
        let endpoint = entry.route(chaos.as_ref())?.endpoint().clone();

        if chaos.is_deleted() {
            return self.finalize(entry, &endpoint, request, chaos, now).await;
        }

        if chaos.is_paused() {
            return self.pause(entry, &endpoint, request, chaos, now).await;
        }

        // A paused run resumes while its recovery is still ahead, or
        // indefinitely for a one-shot experiment without a duration.
        let next_recover = chaos.next_recover();
        let recurring = chaos.scheduler().is_some();
        if chaos.phase() == ExperimentPhase::Paused
            && started(chaos.as_ref())
            && next_recover.map_or(!recurring, |at| at > now)
        {
            info!(kind = kind, request = %request, "resuming experiment");
            chaos = self.begin_apply(entry, chaos).await?;
            let report = match self
                .dispatch(Operation::Apply, &endpoint, request, chaos.as_mut())
                .await
            {
                Ok(report) => report,
                Err(e) => return self.fail(entry, chaos, e).await,
            };
            mark_running(chaos.as_mut(), now, &report);
            let chaos = self.write_status(entry, chaos.as_ref()).await?;
            return Ok(Outcome::from_times(chaos.next_start(), chaos.next_recover()));
        }

        if let Some(at) = next_recover.filter(|at| *at <= now) {
            debug!(kind = kind, request = %request, due = %at, "recovery is due");
            let mut report = FanoutReport::default();
            if injected(chaos.as_ref()) {
                report = match self
                    .dispatch(Operation::Recover, &endpoint, request, chaos.as_mut())
                    .await
                {
                    Ok(report) => report,
                    Err(e) => return self.fail(entry, chaos, e).await,
                };
            }
            let phase = if recurring {
                ExperimentPhase::Waiting
            } else {
                ExperimentPhase::Finished
            };
            chaos.set_next_recover(None);
            let status = chaos.chaos_status_mut();
            status.experiment.phase = phase;
            status.experiment.end_time = Some(now);
            status.failed_message = report.summary();
            let chaos = self.write_status(entry, chaos.as_ref()).await?;
            info!(kind = kind, request = %request, phase = %phase, "experiment recovered");
            return Ok(Outcome::from_times(chaos.next_start(), None));
        }

        let start_due = chaos.next_start().map_or(false, |at| at <= now);
        if !started(chaos.as_ref()) || (recurring && start_due) {
            return self.start(entry, &endpoint, request, chaos, now).await;
        }

        // Unpaused between two runs of a recurring experiment.
        if chaos.phase() == ExperimentPhase::Paused {
            chaos.chaos_status_mut().experiment.phase = ExperimentPhase::Waiting;
            chaos = self.write_status(entry, chaos.as_ref()).await?;
        }
        Ok(Outcome::from_times(chaos.next_start(), chaos.next_recover()))
    }

    /// Schedules the next times and injects.
    async fn start(
        &self,
        entry: &KindEntry,
        endpoint: &Arc<dyn Endpoint>,
        request: &Request,
        mut chaos: Box<dyn InnerObject>,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let times = match next_times(chaos.as_ref(), now) {
            Ok(times) => times,
            Err(e) => return self.fail(entry, chaos, e).await,
        };

        chaos = self.begin_apply(entry, chaos).await?;
        let report = match self
            .dispatch(Operation::Apply, endpoint, request, chaos.as_mut())
            .await
        {
            Ok(report) => report,
            Err(e) => return self.fail(entry, chaos, e).await,
        };
        chaos.set_next_start(times.next_start);
        chaos.set_next_recover(times.next_recover);
        mark_running(chaos.as_mut(), now, &report);
        self.write_status(entry, chaos.as_ref()).await?;
        info!(
            kind = entry.kind().kind(),
            request = %request,
            next_start = ?times.next_start,
            next_recover = ?times.next_recover,
            "experiment injected"
        );
        Ok(Outcome::from_times(times.next_start, times.next_recover))
    }

    /// Recovers a running experiment and holds it until resumed. The
    /// scheduled times are left untouched.
    async fn pause(
        &self,
        entry: &KindEntry,
        endpoint: &Arc<dyn Endpoint>,
        request: &Request,
        mut chaos: Box<dyn InnerObject>,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        if matches!(
            chaos.phase(),
            ExperimentPhase::Paused | ExperimentPhase::Finished
        ) {
            return Ok(Outcome::Done);
        }
        let mut report = FanoutReport::default();
        if injected(chaos.as_ref()) {
            report = match self
                .dispatch(Operation::Recover, endpoint, request, chaos.as_mut())
                .await
            {
                Ok(report) => report,
                Err(e) => return self.fail(entry, chaos, e).await,
            };
            chaos.chaos_status_mut().experiment.end_time = Some(now);
        }
        let status = chaos.chaos_status_mut();
        status.experiment.phase = ExperimentPhase::Paused;
        status.failed_message = report.summary();
        self.write_status(entry, chaos.as_ref()).await?;
        info!(kind = entry.kind().kind(), request = %request, "experiment paused");
        Ok(Outcome::Done)
    }

    /// Recovers a deleted experiment and releases it.
    async fn finalize(
        &self,
        entry: &KindEntry,
        endpoint: &Arc<dyn Endpoint>,
        request: &Request,
        mut chaos: Box<dyn InnerObject>,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        if !chaos.has_finalizer(RECORDS_FINALIZER) {
            return Ok(Outcome::Done);
        }

        if injected(chaos.as_ref()) {
            if let Err(e) = self
                .dispatch(Operation::Recover, endpoint, request, chaos.as_mut())
                .await
            {
                if !chaos.is_forced_cleanup() {
                    return self.fail(entry, chaos, e).await;
                }
                warn!(
                    kind = entry.kind().kind(),
                    request = %request,
                    error = %e,
                    "recovery failed, dropping the finalizer as forced"
                );
            }
        }

        chaos.set_next_start(None);
        chaos.set_next_recover(None);
        let status = chaos.chaos_status_mut();
        status.experiment.phase = ExperimentPhase::Finished;
        status.experiment.end_time.get_or_insert(now);
        let released = match self.write_status(entry, chaos.as_ref()).await {
            Ok(chaos) => self.remove_finalizer(entry, chaos.as_ref()).await,
            Err(e) => Err(e),
        };
        match released {
            Ok(()) => {},
            Err(Error::Store(e)) if e.is_not_found() => {},
            Err(e) => return Err(e),
        }
        info!(kind = entry.kind().kind(), request = %request, "experiment finalized");
        Ok(Outcome::Done)
    }

    async fn dispatch(
        &self,
        operation: Operation,
        endpoint: &Arc<dyn Endpoint>,
        request: &Request,
        chaos: &mut dyn InnerObject,
    ) -> Result<FanoutReport> {
        let kind = chaos.kind();
        let result = match operation {
            Operation::Apply => endpoint.apply(request, chaos).await,
            Operation::Recover => endpoint.recover(request, chaos).await,
        };
        match &result {
            Ok(report) => {
                observe_dispatch(kind, operation.as_str(), SUCCESS_LABEL, report.failed.len());
                if let Some(summary) = report.summary() {
                    warn!(kind = kind, request = %request, operation = %operation, "{}", summary);
                }
            },
            Err(_) => observe_dispatch(kind, operation.as_str(), ERROR_LABEL, 0),
        }
        Ok(result?)
    }

    /// Records `err` on the experiment and hands it back to the caller.
    async fn fail(&self, entry: &KindEntry, mut chaos: Box<dyn InnerObject>, err: Error) -> Result<Outcome> {
        error!(
            kind = entry.kind().kind(),
            namespace = chaos.namespace(),
            name = chaos.name(),
            error = %err,
            "reconcile failed"
        );
        let status = chaos.chaos_status_mut();
        status.experiment.phase = ExperimentPhase::Failed;
        status.failed_message = Some(err.to_string());
        if let Err(e) = self.write_status(entry, chaos.as_ref()).await {
            warn!(kind = entry.kind().kind(), error = %e, "failed to record the failure");
        }
        Err(err)
    }

    /// Holds the records finalizer and clears the end time of the last
    /// recovery before an apply starts, so that an apply failing part way
    /// still counts as injected.
    async fn begin_apply(
        &self,
        entry: &KindEntry,
        mut chaos: Box<dyn InnerObject>,
    ) -> Result<Box<dyn InnerObject>> {
        if !chaos.has_finalizer(RECORDS_FINALIZER) {
            let patch = match chaos.metadata().finalizers {
                Some(_) => json!([
                    {"op": "add", "path": "/metadata/finalizers/-", "value": RECORDS_FINALIZER}
                ]),
                None => json!([
                    {"op": "add", "path": "/metadata/finalizers", "value": [RECORDS_FINALIZER]}
                ]),
            };
            chaos = self.patch(entry, chaos.as_ref(), &json_operations(patch)?).await?;
        }
        let recovered = chaos
            .chaos_status()
            .map_or(false, |status| status.experiment.end_time.is_some());
        if recovered {
            let patch = Patch::Merge(json!({"status": {"experiment": {"endTime": null}}}));
            chaos = self.patch_status(entry, chaos.as_ref(), &patch).await?;
        }
        Ok(chaos)
    }

    /// Drops the records finalizer, failing if it moved since `chaos` was
    /// read.
    async fn remove_finalizer(&self, entry: &KindEntry, chaos: &dyn InnerObject) -> Result<()> {
        let position = chaos.metadata().finalizers.as_ref().and_then(|finalizers| {
            finalizers
                .iter()
                .position(|finalizer| finalizer == RECORDS_FINALIZER)
        });
        let Some(position) = position else {
            return Ok(());
        };
        let path = format!("/metadata/finalizers/{}", position);
        let patch = json_operations(json!([
            {"op": "test", "path": path, "value": RECORDS_FINALIZER},
            {"op": "remove", "path": path},
        ]))?;
        self.patch(entry, chaos, &patch).await?;
        Ok(())
    }

    /// Writes the whole status block and returns the stored object.
    async fn write_status(
        &self,
        entry: &KindEntry,
        chaos: &dyn InnerObject,
    ) -> Result<Box<dyn InnerObject>> {
        let status = chaos.chaos_status().cloned().unwrap_or_default();
        let patch = Patch::Merge(status_patch(&status));
        self.patch_status(entry, chaos, &patch).await
    }

    async fn patch(
        &self,
        entry: &KindEntry,
        chaos: &dyn InnerObject,
        patch: &Patch,
    ) -> Result<Box<dyn InnerObject>> {
        let value = self
            .store()
            .patch(entry.kind().kind(), Some(chaos.namespace()), chaos.name(), patch)
            .await?;
        Ok(entry.kind().decode(value)?)
    }

    async fn patch_status(
        &self,
        entry: &KindEntry,
        chaos: &dyn InnerObject,
        patch: &Patch,
    ) -> Result<Box<dyn InnerObject>> {
        let value = self
            .store()
            .patch_status(entry.kind().kind(), Some(chaos.namespace()), chaos.name(), patch)
            .await?;
        Ok(entry.kind().decode(value)?)
    }
}

fn json_operations(operations: Value) -> Result<Patch> {
    let patch = serde_json::from_value(operations).map_err(StoreError::from)?;
    Ok(Patch::Json(patch))
}

/// A merge patch replacing every status field; unset fields are sent as
/// null so they are cleared.
fn status_patch(status: &ChaosStatus) -> Value {
    json!({
        "status": {
            "experiment": {
                "phase": status.experiment.phase,
                "startTime": status.experiment.start_time,
                "endTime": status.experiment.end_time,
                "duration": status.experiment.duration,
            },
            "scheduler": {
                "nextStart": status.scheduler.next_start,
                "nextRecover": status.scheduler.next_recover,
            },
            "failedMessage": status.failed_message,
        }
    })
}

fn started(chaos: &dyn InnerObject) -> bool {
    chaos
        .chaos_status()
        .map_or(false, |status| status.experiment.start_time.is_some())
}

/// The fault may be in place: an apply began and nothing was recovered
/// since. This includes an apply that failed part way.
fn injected(chaos: &dyn InnerObject) -> bool {
    chaos.has_finalizer(RECORDS_FINALIZER)
        && chaos
            .chaos_status()
            .map_or(true, |status| status.experiment.end_time.is_none())
}

fn next_times(chaos: &dyn InnerObject, now: DateTime<Utc>) -> Result<NextTimes> {
    let duration = chaos.duration()?;
    let recurrence = chaos
        .scheduler()
        .map(|scheduler| Recurrence::parse(&scheduler.cron))
        .transpose()?;
    NextTimes::compute(now, duration, recurrence.as_ref())
}

fn mark_running(chaos: &mut dyn InnerObject, now: DateTime<Utc>, report: &FanoutReport) {
    let duration = chaos.duration_spec().map(str::to_string);
    let status = chaos.chaos_status_mut();
    status.experiment.phase = ExperimentPhase::Running;
    status.experiment.start_time = Some(now);
    status.experiment.end_time = None;
    status.experiment.duration = duration;
    status.failed_message = report.summary();
}
