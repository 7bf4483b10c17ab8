// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Operator verbs on experiments: pause, resume, delete, and the listing
//! and summary views a dashboard is built on.

use crate::Result;
use chaos_router::RouterError;
use chaos_store::{DeleteOptions, ListQuery, ObjectStore, Patch};
use chaos_types::{
    ChaosInstance, ChaosKind, ChaosKinds, ExperimentPhase, CLEAN_FINALIZER_ANNOTATION_KEY,
    CLEAN_FINALIZER_FORCED, PAUSE_ANNOTATION_KEY,
};
use futures::{stream::FuturesUnordered, TryStreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Experiment counts by phase, across every kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentState {
    pub running: usize,
    pub waiting: usize,
    pub paused: usize,
    pub failed: usize,
    pub finished: usize,
    pub total: usize,
}

impl ExperimentState {
    fn count(&mut self, phase: ExperimentPhase) {
        let counter = match phase {
            ExperimentPhase::Running => &mut self.running,
            ExperimentPhase::Waiting => &mut self.waiting,
            ExperimentPhase::Paused => &mut self.paused,
            ExperimentPhase::Failed => &mut self.failed,
            ExperimentPhase::Finished => &mut self.finished,
        };
        *counter += 1;
        self.total += 1;
    }
}

/// Every field left `None` matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExperimentFilter {
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub status: Option<ExperimentPhase>,
}

#[derive(Clone)]
pub struct ExperimentControl {
    store: Arc<dyn ObjectStore>,
    kinds: ChaosKinds,
}

impl ExperimentControl {
    pub fn new(store: Arc<dyn ObjectStore>, kinds: ChaosKinds) -> Self {
        Self { store, kinds }
    }

    fn kind(&self, kind: &str) -> Result<&Arc<dyn ChaosKind>> {
        Ok(self
            .kinds
            .get(kind)
            .ok_or_else(|| RouterError::NotSupported(kind.to_string()))?)
    }

    pub async fn pause_experiment(&self, kind: &str, namespace: &str, name: &str) -> Result<()> {
        self.annotate(kind, namespace, name, PAUSE_ANNOTATION_KEY, "true")
            .await?;
        info!(kind = kind, namespace = namespace, name = name, "experiment paused");
        Ok(())
    }

    pub async fn start_experiment(&self, kind: &str, namespace: &str, name: &str) -> Result<()> {
        self.annotate(kind, namespace, name, PAUSE_ANNOTATION_KEY, "false")
            .await?;
        info!(kind = kind, namespace = namespace, name = name, "experiment resumed");
        Ok(())
    }

    /// Deletes the experiment. A forced delete releases the experiment even
    /// when its recovery fails.
    pub async fn delete_experiment(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        force: bool,
    ) -> Result<()> {
        let kind = self.kind(kind)?.kind();
        if force {
            self.annotate(
                kind,
                namespace,
                name,
                CLEAN_FINALIZER_ANNOTATION_KEY,
                CLEAN_FINALIZER_FORCED,
            )
            .await?;
        }
        self.store
            .delete(kind, Some(namespace), name, &DeleteOptions::default())
            .await?;
        info!(kind = kind, namespace = namespace, name = name, force = force, "experiment deleted");
        Ok(())
    }

    /// Counts experiments by phase. Kinds are listed concurrently and fold
    /// into one shared summary.
    pub async fn experiment_state(&self, namespace: Option<&str>) -> Result<ExperimentState> {
        let state = Mutex::new(ExperimentState::default());
        let query = ListQuery {
            namespace: namespace.map(str::to_string),
            ..Default::default()
        };

        self.kinds
            .iter()
            .map(|kind| {
                let (state, query) = (&state, &query);
                async move {
                    let items = self.store.list(kind.kind(), query).await?;
                    let experiments = kind.list_chaos(items)?;
                    let mut state = state.lock();
                    for experiment in experiments {
                        state.count(experiment.status);
                    }
                    Ok::<_, crate::Error>(())
                }
            })
            .collect::<FuturesUnordered<_>>()
            .try_collect::<Vec<_>>()
            .await?;

        Ok(state.into_inner())
    }

    /// Summaries of the experiments matching `filter`, ordered by kind,
    /// namespace and name.
    pub async fn list_experiments(&self, filter: &ExperimentFilter) -> Result<Vec<ChaosInstance>> {
        let kinds = match &filter.kind {
            Some(kind) => vec![self.kind(kind)?.clone()],
            None => self.kinds.iter().cloned().collect(),
        };
        let query = ListQuery {
            namespace: filter.namespace.clone(),
            ..Default::default()
        };

        let mut experiments = vec![];
        for kind in kinds {
            let items = self.store.list(kind.kind(), &query).await?;
            experiments.extend(kind.list_chaos(items)?.into_iter().filter(|experiment| {
                filter.name.as_ref().map_or(true, |name| &experiment.name == name)
                    && filter.status.map_or(true, |status| experiment.status == status)
            }));
        }
        experiments.sort_by(|a, b| {
            (&a.kind, &a.namespace, &a.name).cmp(&(&b.kind, &b.namespace, &b.name))
        });
        Ok(experiments)
    }

    async fn annotate(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let kind = self.kind(kind)?.kind();
        let patch = Patch::Merge(json!({
            "metadata": {"annotations": {key: value}}
        }));
        self.store.patch(kind, Some(namespace), name, &patch).await?;
        Ok(())
    }
}
