// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::ExperimentPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only summary of an experiment, recomputed from the object on every
/// read and used for listing and reporting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosInstance {
    pub name: String,
    pub namespace: String,
    pub kind: String,
    /// Logical action of the experiment, empty when the kind has none.
    pub action: String,
    pub uid: String,
    pub start_time: Option<DateTime<Utc>>,
    /// Set from the deletion timestamp; `None` while the experiment is
    /// still active.
    pub end_time: Option<DateTime<Utc>>,
    pub duration: String,
    pub status: ExperimentPhase,
}

impl ChaosInstance {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}
