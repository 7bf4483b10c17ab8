// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Turns a [`SelectorSpec`] into the full list of matching cluster objects.

use crate::{filter::ExpressionFilter, policy::Scope, Result, SelectorError};
use chaos_store::{
    get_typed, list_typed, ListQuery, ObjectStore, KIND_NODE,
    KIND_PERSISTENT_VOLUME, KIND_PERSISTENT_VOLUME_CLAIM, KIND_POD,
};
use chaos_types::{labels, SelectorSpec};
use k8s_openapi::api::core::v1::{Node, PersistentVolume, PersistentVolumeClaim, Pod};
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, collections::HashSet, sync::Arc};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CandidateResolver {
    store: Arc<dyn ObjectStore>,
    scope: Arc<Scope>,
}

impl CandidateResolver {
    pub fn new(store: Arc<dyn ObjectStore>, scope: Arc<Scope>) -> Self {
        Self { store, scope }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Resolves the pods a selector names or matches. Explicitly named pods
    /// bypass every other filter.
    pub async fn pods(&self, selector: &SelectorSpec) -> Result<Vec<Pod>> {
        if selector.has_explicit_pods() {
            return self.explicit_pods(selector).await;
        }

        if selector.label_selectors.is_empty() && selector.field_selectors.is_empty() {
            return Err(SelectorError::Ambiguous(
                "a label or field selector is required when no pods are named".to_string(),
            ));
        }
        self.check_namespace_scope(selector)?;

        let mut query = ListQuery::default()
            .labels(&selector.label_selectors)
            .fields(&selector.field_selectors);
        query.namespace = self.scope.list_namespace().map(str::to_string);
        let mut pods: Vec<Pod> = list_typed(self.store.as_ref(), KIND_POD, &query).await?;
        debug!(count = pods.len(), query = ?query, "listed candidate pods");

        if selector.has_node_filter() {
            let nodes = self.nodes(selector).await?;
            pods.retain(|pod| {
                pod.spec
                    .as_ref()
                    .and_then(|spec| spec.node_name.as_ref())
                    .map_or(false, |node| nodes.contains(node))
            });
        }

        pods.retain(|pod| {
            let allowed = self.scope.policy.is_allowed(namespace_of(pod));
            if !allowed {
                info!(
                    namespace = namespace_of(pod),
                    pod = name_of(pod),
                    "filter pod by namespaces"
                );
            }
            allowed
        });

        let filters = PodFilters::new(selector)?;
        pods.retain(|pod| filters.matches(pod));
        Ok(pods)
    }

    async fn explicit_pods(&self, selector: &SelectorSpec) -> Result<Vec<Pod>> {
        let mut pods = vec![];
        for (namespace, names) in &selector.pods {
            if !self.scope.in_scope(namespace) {
                info!(
                    namespace = %namespace,
                    "skip namespace because it is out of scope within namespace scoped mode"
                );
                continue;
            }
            if !self.scope.policy.is_allowed(namespace) {
                info!(namespace = %namespace, "filter pod by namespaces");
                continue;
            }
            for name in names {
                if let Some(pod) = self.lookup(KIND_POD, Some(namespace.as_str()), name).await? {
                    pods.push(pod);
                }
            }
        }
        Ok(pods)
    }

    /// Names of the nodes matched by name or by node label selector.
    async fn nodes(&self, selector: &SelectorSpec) -> Result<HashSet<String>> {
        let mut nodes = HashSet::new();
        for name in &selector.nodes {
            if let Some(node) = self.lookup::<Node>(KIND_NODE, None, name).await? {
                nodes.extend(node.metadata.name);
            }
        }
        if !selector.node_selectors.is_empty() {
            let query = ListQuery::default().labels(&selector.node_selectors);
            let matched: Vec<Node> = list_typed(self.store.as_ref(), KIND_NODE, &query).await?;
            nodes.extend(matched.into_iter().filter_map(|node| node.metadata.name));
        }
        Ok(nodes)
    }

    fn check_namespace_scope(&self, selector: &SelectorSpec) -> Result<()> {
        if self.scope.cluster_scoped {
            return Ok(());
        }
        match selector.namespaces.as_slice() {
            [] => Ok(()),
            [namespace] if *namespace == self.scope.target_namespace => Ok(()),
            [namespace] => Err(SelectorError::Usage(format!(
                "could NOT list pods from out of scoped namespace: {}",
                namespace
            ))),
            _ => Err(SelectorError::Usage(
                "could NOT use more than 1 namespace selector within namespace scoped mode"
                    .to_string(),
            )),
        }
    }

    /// Resolves persistent volumes. Only explicit names and label selection
    /// are supported for volumes.
    pub async fn persistent_volumes(&self, selector: &SelectorSpec) -> Result<Vec<PersistentVolume>> {
        if !selector.persistent_volumes.is_empty() {
            let mut volumes = vec![];
            for name in &selector.persistent_volumes {
                if let Some(volume) = self.lookup(KIND_PERSISTENT_VOLUME, None, name).await? {
                    volumes.push(volume);
                }
            }
            return Ok(volumes);
        }

        check_label_only(selector, "persistent volumes")?;
        let query = ListQuery::default().labels(&selector.label_selectors);
        Ok(list_typed(self.store.as_ref(), KIND_PERSISTENT_VOLUME, &query).await?)
    }

    /// Resolves persistent volume claims by explicit `namespace => names`
    /// or by label, within the deployment scope and namespace policy.
    pub async fn persistent_volume_claims(
        &self,
        selector: &SelectorSpec,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        let claims: Vec<PersistentVolumeClaim> = if selector
            .persistent_volume_claims
            .values()
            .any(|names| !names.is_empty())
        {
            let mut claims = vec![];
            for (namespace, names) in &selector.persistent_volume_claims {
                if !self.scope.in_scope(namespace) {
                    info!(namespace = %namespace, "skip claims out of scope");
                    continue;
                }
                for name in names {
                    if let Some(claim) = self
                        .lookup(KIND_PERSISTENT_VOLUME_CLAIM, Some(namespace.as_str()), name)
                        .await?
                    {
                        claims.push(claim);
                    }
                }
            }
            claims
        } else {
            check_label_only(selector, "persistent volume claims")?;
            let mut query = ListQuery::default().labels(&selector.label_selectors);
            query.namespace = self.scope.list_namespace().map(str::to_string);
            list_typed(self.store.as_ref(), KIND_PERSISTENT_VOLUME_CLAIM, &query).await?
        };

        Ok(claims
            .into_iter()
            .filter(|claim| {
                let namespace = claim.metadata.namespace.as_deref().unwrap_or_default();
                self.scope.policy.is_allowed(namespace)
            })
            .collect())
    }

    /// Fetches one object, treating "not found" as absent.
    async fn lookup<K: DeserializeOwned>(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>> {
        match get_typed(self.store.as_ref(), kind, namespace, name).await {
            Ok(object) => Ok(Some(object)),
            Err(err) if err.is_not_found() => {
                warn!(
                    kind = kind,
                    namespace = namespace.unwrap_or_default(),
                    name = name,
                    "{} is not found",
                    kind
                );
                Ok(None)
            },
            Err(err) => Err(SelectorError::Store(err)),
        }
    }
}

fn check_label_only(selector: &SelectorSpec, what: &str) -> Result<()> {
    if !selector.label_selectors.is_empty() {
        return Ok(());
    }
    let other_filters = !selector.field_selectors.is_empty()
        || !selector.namespaces.is_empty()
        || !selector.annotation_selectors.is_empty()
        || !selector.pod_phase_selectors.is_empty()
        || selector.has_node_filter();
    if other_filters {
        Err(SelectorError::Usage(format!(
            "at the moment only label selection is enabled for {}",
            what
        )))
    } else {
        Err(SelectorError::Ambiguous(format!(
            "a label selector is required when no {} are named",
            what
        )))
    }
}

/// The namespace, annotation and phase expression filters of a selector.
struct PodFilters {
    namespaces: ExpressionFilter,
    annotations: ExpressionFilter,
    phases: ExpressionFilter,
}

impl PodFilters {
    fn new(selector: &SelectorSpec) -> Result<Self> {
        Ok(Self {
            namespaces: ExpressionFilter::parse_existence(&selector.namespaces.join(","))?,
            annotations: ExpressionFilter::parse(&labels::selector_from_set(
                &selector.annotation_selectors,
            ))?,
            phases: ExpressionFilter::parse_existence(&selector.pod_phase_selectors.join(","))?,
        })
    }

    fn matches(&self, pod: &Pod) -> bool {
        let annotations_match = match &pod.metadata.annotations {
            Some(annotations) => self.annotations.matches(annotations),
            None => self.annotations.matches(&BTreeMap::new()),
        };
        self.namespaces.matches_key(namespace_of(pod))
            && annotations_match
            && self.phases.matches_key(phase_of(pod))
    }
}

/// Evaluates a single pod against a selector without listing the cluster.
/// Field selectors are not considered.
pub fn check_pod_meets_selector(pod: &Pod, selector: &SelectorSpec) -> Result<bool> {
    if selector.has_explicit_pods() {
        let named = selector
            .pods
            .get(namespace_of(pod))
            .map_or(false, |names| names.iter().any(|name| name == name_of(pod)));
        if !named {
            return Ok(false);
        }
    }

    if !selector.label_selectors.is_empty() {
        let requirements = labels::requirements_from_set(&selector.label_selectors);
        let pod_labels = pod.metadata.labels.clone().unwrap_or_default();
        if pod_labels.is_empty() || !labels::matches_all(&requirements, &pod_labels) {
            return Ok(false);
        }
    }

    Ok(PodFilters::new(selector)?.matches(pod))
}

fn namespace_of(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or_default()
}

fn name_of(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

fn phase_of(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or_default()
}
