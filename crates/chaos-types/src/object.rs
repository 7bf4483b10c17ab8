// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{ChaosInstance, ChaosStatus, Error, ExperimentPhase, Result, SchedulerSpec};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::{any::Any, fmt::Debug, time::Duration};

/// `"true"` pauses the experiment, any other value (or none) does not.
pub const PAUSE_ANNOTATION_KEY: &str = "experiment.chaos-mesh.org/pause";
/// Set to [`CLEAN_FINALIZER_FORCED`] to drop the records finalizer even when
/// recovery fails.
pub const CLEAN_FINALIZER_ANNOTATION_KEY: &str = "chaos-mesh.chaos-mesh.org/cleanFinalizer";
pub const CLEAN_FINALIZER_FORCED: &str = "forced";
/// Finalizer held on an experiment while its fault may still be in place.
pub const RECORDS_FINALIZER: &str = "chaos-mesh/records";

/// Per-kind accessor for the logical "action" of an experiment. Kinds
/// without an action return `None`.
pub trait HasAction {
    fn action(&self) -> Option<String>;
}

/// Common view over every experiment kind. Implemented once per kind by
/// `impl_inner_object!`, the provided methods hold the shared lifecycle
/// logic.
pub trait InnerObject: HasAction + Debug + Send + Sync + 'static {
    fn kind(&self) -> &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// The raw `duration` field, e.g. `"30s"`.
    fn duration_spec(&self) -> Option<&str>;

    fn scheduler(&self) -> Option<&SchedulerSpec>;

    fn chaos_status(&self) -> Option<&ChaosStatus>;

    /// Status block, created empty on first access.
    fn chaos_status_mut(&mut self) -> &mut ChaosStatus;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn clone_object(&self) -> Box<dyn InnerObject>;

    fn to_value(&self) -> Result<serde_json::Value>;

    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata()
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }

    /// Deleted as soon as the deletion timestamp is stamped, even though
    /// the object lingers until its finalizers are cleared.
    fn is_deleted(&self) -> bool {
        self.metadata().deletion_timestamp.is_some()
    }

    fn is_paused(&self) -> bool {
        self.annotation(PAUSE_ANNOTATION_KEY) == Some("true")
    }

    fn is_forced_cleanup(&self) -> bool {
        self.annotation(CLEAN_FINALIZER_ANNOTATION_KEY) == Some(CLEAN_FINALIZER_FORCED)
    }

    fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata()
            .finalizers
            .as_ref()
            .map_or(false, |finalizers| finalizers.iter().any(|f| f == finalizer))
    }

    /// Parses the duration string on every call; a malformed duration is an
    /// error rather than "no duration".
    fn duration(&self) -> Result<Option<Duration>> {
        self.duration_spec()
            .map(|duration| {
                humantime::parse_duration(duration)
                    .map_err(|e| Error::InvalidDuration(duration.to_string(), e))
            })
            .transpose()
    }

    fn next_start(&self) -> Option<DateTime<Utc>> {
        self.chaos_status()
            .and_then(|status| status.scheduler.next_start)
    }

    /// `None` clears the field.
    fn set_next_start(&mut self, next_start: Option<DateTime<Utc>>) {
        self.chaos_status_mut().scheduler.next_start = next_start;
    }

    fn next_recover(&self) -> Option<DateTime<Utc>> {
        self.chaos_status()
            .and_then(|status| status.scheduler.next_recover)
    }

    /// `None` clears the field.
    fn set_next_recover(&mut self, next_recover: Option<DateTime<Utc>>) {
        self.chaos_status_mut().scheduler.next_recover = next_recover;
    }

    fn phase(&self) -> ExperimentPhase {
        self.chaos_status()
            .map(|status| status.experiment.phase)
            .unwrap_or_default()
    }

    fn chaos_instance(&self) -> ChaosInstance {
        let metadata = self.metadata();
        ChaosInstance {
            name: self.name().to_string(),
            namespace: self.namespace().to_string(),
            kind: self.kind().to_string(),
            action: self.action().unwrap_or_default(),
            uid: metadata.uid.clone().unwrap_or_default(),
            start_time: metadata.creation_timestamp.as_ref().map(|time| time.0),
            end_time: metadata.deletion_timestamp.as_ref().map(|time| time.0),
            duration: self.duration_spec().unwrap_or_default().to_string(),
            status: self.phase(),
        }
    }
}
