// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ExperimentPhase {
    #[default]
    Waiting,
    Running,
    Paused,
    Failed,
    Finished,
}

impl ExperimentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentPhase::Waiting => "Waiting",
            ExperimentPhase::Running => "Running",
            ExperimentPhase::Paused => "Paused",
            ExperimentPhase::Failed => "Failed",
            ExperimentPhase::Finished => "Finished",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentPhase::Finished)
    }
}

impl fmt::Display for ExperimentPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recurrence rule of an experiment. `cron` accepts a five or six field
/// cron expression, or `@every <duration>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SchedulerSpec {
    pub cron: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentStatus {
    #[serde(default)]
    pub phase: ExperimentPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Persisted scheduling times; `None` means "not scheduled".
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_recover: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChaosStatus {
    #[serde(default)]
    pub experiment: ExperimentStatus,
    #[serde(default)]
    pub scheduler: ScheduleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_message: Option<String>,
}
