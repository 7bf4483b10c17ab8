// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! The reconciliation side of the chaos controller: the driver that moves
//! experiments through their lifecycle, the endpoints of the built-in
//! kinds, and the control operations exposed to operators.

pub mod config;
pub mod control;
mod counters;
pub mod driver;
pub mod endpoints;
mod error;
pub mod logging;
pub mod reconciler;
pub mod scheduler;
#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

pub use error::Error;

use chaos_router::{EndpointContext, Registry};
use chaos_selector::{CandidateResolver, SelectionEngine};
use chaos_store::ObjectStore;
use config::ControllerConfig;
use std::sync::Arc;

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

/// Builds the kind registry once, with every endpoint sharing one context
/// over `store`.
pub fn build_registry(config: &ControllerConfig, store: Arc<dyn ObjectStore>) -> Result<Registry> {
    let resolver = CandidateResolver::new(store.clone(), Arc::new(config.scope()?));
    let context = EndpointContext::new(
        store,
        Arc::new(SelectionEngine::new(resolver)),
        config.fanout_policy,
    );
    Ok(endpoints::registry_builder(config).build(Arc::new(context)))
}
