// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Periodic reconciliation of every experiment of every registered kind.

use crate::{
    reconciler::{Outcome, Reconciler},
    Result,
};
use chaos_router::Request;
use chaos_store::{object_key, ListQuery};
use chrono::{DateTime, Utc};
use futures::{stream, Future, StreamExt};
use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

type ObjectId = (String, Request);

/// Counts of one pass over the cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub reconciled: usize,
    pub failed: usize,
    /// Reconciles skipped because the same experiment was still in flight.
    pub skipped: usize,
    /// Earliest requeue time asked for by any experiment.
    pub next_wakeup: Option<DateTime<Utc>>,
}

impl PassSummary {
    fn observe(&mut self, outcome: Option<Result<Outcome>>) {
        match outcome {
            None => self.skipped += 1,
            Some(Ok(outcome)) => {
                self.reconciled += 1;
                if let Outcome::RequeueAt(at) = outcome {
                    self.next_wakeup = Some(self.next_wakeup.map_or(at, |next| next.min(at)));
                }
            },
            Some(Err(_)) => {
                self.reconciled += 1;
                self.failed += 1;
            },
        }
    }
}

pub struct Driver {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    max_concurrent: usize,
    in_flight: Mutex<HashSet<ObjectId>>,
}

/// Releases an object identity when its reconcile completes.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<ObjectId>>,
    id: Option<ObjectId>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.in_flight.lock().remove(&id);
        }
    }
}

impl Driver {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration, max_concurrent: usize) -> Self {
        Self {
            reconciler,
            interval,
            max_concurrent: max_concurrent.max(1),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, id: &ObjectId) -> Option<InFlightGuard<'_>> {
        if !self.in_flight.lock().insert(id.clone()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: &self.in_flight,
            id: Some(id.clone()),
        })
    }

    /// Every experiment currently stored, by kind name.
    async fn experiments(&self) -> Result<Vec<ObjectId>> {
        let registry = self.reconciler.registry();
        let context = registry.context();
        let query = ListQuery {
            namespace: context
                .selector
                .resolver()
                .scope()
                .list_namespace()
                .map(str::to_string),
            ..Default::default()
        };

        let mut ids = vec![];
        for entry in registry.kinds() {
            let kind = entry.kind().kind();
            for object in context.store.list(kind, &query).await? {
                let (namespace, name) = object_key(&object);
                ids.push((
                    kind.to_string(),
                    Request::new(namespace.unwrap_or_default(), name),
                ));
            }
        }
        Ok(ids)
    }

    /// Reconciles every experiment once, at most `max_concurrent` at a
    /// time. An experiment already being reconciled is skipped.
    pub async fn run_once(&self) -> Result<PassSummary> {
        let ids = self.experiments().await?;
        let outcomes = Mutex::new(PassSummary::default());

        stream::iter(ids)
            .for_each_concurrent(self.max_concurrent, |id| {
                let outcomes = &outcomes;
                async move {
                    let outcome = match self.claim(&id) {
                        Some(_guard) => {
                            let (kind, request) = &id;
                            let result = self.reconciler.reconcile(kind, request, Utc::now()).await;
                            if let Err(e) = &result {
                                error!(kind = %kind, request = %request, error = %e, "reconcile failed");
                            }
                            Some(result)
                        },
                        None => {
                            debug!(kind = %id.0, request = %id.1, "reconcile already in flight");
                            None
                        },
                    };
                    outcomes.lock().observe(outcome);
                }
            })
            .await;

        Ok(outcomes.into_inner())
    }

    /// Runs passes until `shutdown` resolves. Passes start every interval,
    /// or earlier when an experiment asked to be requeued sooner.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            let delay = match self.run_once().await {
                Ok(summary) => {
                    info!(
                        reconciled = summary.reconciled,
                        failed = summary.failed,
                        skipped = summary.skipped,
                        "reconcile pass done"
                    );
                    self.delay_until(summary.next_wakeup)
                },
                Err(e) => {
                    warn!(error = %e, "failed to list experiments");
                    self.interval
                },
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down the driver");
                    return;
                },
                _ = tokio::time::sleep(delay) => {},
            }
        }
    }

    fn delay_until(&self, wakeup: Option<DateTime<Utc>>) -> Duration {
        // A wakeup already in the past converts to an error, run at once.
        wakeup
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            .map_or(self.interval, |until| until.min(self.interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{at, cluster, registry};
    use chaos_router::FanoutPolicy;
    use claims::assert_some;

    fn driver(interval: u64) -> Driver {
        let reconciler = Reconciler::new(registry(cluster(), FanoutPolicy::BestEffort));
        Driver::new(Arc::new(reconciler), Duration::from_secs(interval), 4)
    }

    #[test]
    fn test_one_reconcile_per_object() {
        let driver = driver(10);
        let id = ("PodChaos".to_string(), Request::new("chaos-testing", "kill"));
        let guard = assert_some!(driver.claim(&id));
        assert!(driver.claim(&id).is_none());

        let other = ("PodChaos".to_string(), Request::new("chaos-testing", "fail"));
        assert_some!(driver.claim(&other));

        drop(guard);
        assert_some!(driver.claim(&id));
    }

    #[test]
    fn test_wakeup_is_capped_by_interval() {
        let driver = driver(10);
        assert_eq!(driver.delay_until(None), Duration::from_secs(10));
        assert_eq!(driver.delay_until(Some(at(10, 0, 0))), Duration::ZERO);
        let soon = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(driver.delay_until(Some(soon)), Duration::from_secs(10));
    }

    #[test]
    fn test_summary_keeps_earliest_wakeup() {
        let mut summary = PassSummary::default();
        summary.observe(Some(Ok(Outcome::RequeueAt(at(10, 5, 0)))));
        summary.observe(Some(Ok(Outcome::RequeueAt(at(10, 1, 0)))));
        summary.observe(Some(Ok(Outcome::Done)));
        summary.observe(None);
        assert_eq!(summary, PassSummary {
            reconciled: 3,
            failed: 0,
            skipped: 1,
            next_wakeup: Some(at(10, 1, 0)),
        });
    }
}
