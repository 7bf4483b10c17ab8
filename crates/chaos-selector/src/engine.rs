// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{resolver::CandidateResolver, sampler, Result, SelectorError};
use chaos_types::SelectSpec;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use tracing::debug;

/// Resolution followed by sampling, for any [`SelectSpec`]. The same engine
/// serves the subjects of an experiment and the remote targets of a
/// two-sided action.
pub struct SelectionEngine {
    resolver: CandidateResolver,
    rng: Mutex<StdRng>,
}

impl SelectionEngine {
    pub fn new(resolver: CandidateResolver) -> Self {
        Self::with_rng(resolver, StdRng::from_entropy())
    }

    pub fn with_rng(resolver: CandidateResolver, rng: StdRng) -> Self {
        Self {
            resolver,
            rng: Mutex::new(rng),
        }
    }

    pub fn resolver(&self) -> &CandidateResolver {
        &self.resolver
    }

    pub async fn select_pods<S: SelectSpec + Sync + ?Sized>(&self, spec: &S) -> Result<Vec<Pod>> {
        let pods = self.resolver.pods(spec.selector()).await?;
        self.sample(pods, spec, "pod")
    }

    pub async fn select_persistent_volumes<S: SelectSpec + Sync + ?Sized>(
        &self,
        spec: &S,
    ) -> Result<Vec<PersistentVolume>> {
        let volumes = self.resolver.persistent_volumes(spec.selector()).await?;
        self.sample(volumes, spec, "volume")
    }

    pub async fn select_persistent_volume_claims<S: SelectSpec + Sync + ?Sized>(
        &self,
        spec: &S,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        let claims = self.resolver.persistent_volume_claims(spec.selector()).await?;
        self.sample(claims, spec, "volume claim")
    }

    fn sample<T, S: SelectSpec + ?Sized>(
        &self,
        candidates: Vec<T>,
        spec: &S,
        noun: &'static str,
    ) -> Result<Vec<T>> {
        if candidates.is_empty() {
            return Err(SelectorError::NothingSelected(noun));
        }
        let resolved = candidates.len();
        let selected = sampler::sample(&mut *self.rng.lock(), candidates, spec.mode(), spec.value())?;
        debug!(
            kind = noun,
            mode = %spec.mode(),
            resolved = resolved,
            selected = selected.len(),
            "sampled targets"
        );
        Ok(selected)
    }
}
