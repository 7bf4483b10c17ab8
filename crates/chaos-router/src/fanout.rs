// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Concurrent per-target actions with an explicit failure policy.

use crate::{Result, RouterError};
use futures::{stream::FuturesUnordered, Future, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::error;

/// What a failing per-target action does to the Apply or Recover call
/// that spawned it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FanoutPolicy {
    /// Every target is attempted and failures are only reported.
    #[default]
    BestEffort,
    /// Every target is attempted, then any failure fails the call.
    FailFast,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<TargetFailure>,
}

impl FanoutReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn merge(&mut self, other: FanoutReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    /// One line naming every failed target, or `None` when nothing failed.
    pub fn summary(&self) -> Option<String> {
        if self.is_clean() {
            return None;
        }
        let failures = self
            .failed
            .iter()
            .map(|failure| format!("{}: {}", failure.target, failure.error))
            .collect::<Vec<_>>()
            .join("; ");
        Some(format!(
            "{} of {} targets failed: {}",
            self.failed.len(),
            self.total(),
            failures
        ))
    }
}

/// Runs `action` once per target, all concurrently, and waits for every
/// one of them.
pub async fn fan_out<T, F, Fut, E>(
    policy: FanoutPolicy,
    targets: Vec<T>,
    label: impl Fn(&T) -> String,
    action: F,
) -> Result<FanoutReport>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: Display,
{
    let mut pending: FuturesUnordered<_> = targets
        .into_iter()
        .map(|target| {
            let name = label(&target);
            let fut = action(target);
            async move { (name, fut.await) }
        })
        .collect();

    let mut report = FanoutReport::default();
    while let Some((target, result)) = pending.next().await {
        match result {
            Ok(()) => report.succeeded.push(target),
            Err(err) => {
                error!(object = %target, error = %err, "per-target action failed");
                report.failed.push(TargetFailure {
                    target,
                    error: err.to_string(),
                });
            },
        }
    }

    if policy == FanoutPolicy::FailFast {
        if let Some(first) = report.failed.first() {
            return Err(RouterError::PartialFailure {
                failed: report.failed.len(),
                total: report.total(),
                first: format!("{}: {}", first.target, first.error),
            });
        }
    }
    Ok(report)
}
