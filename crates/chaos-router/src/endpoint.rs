// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{FanoutPolicy, FanoutReport, Result, RouterError};
use async_trait::async_trait;
use chaos_selector::SelectionEngine;
use chaos_store::ObjectStore;
use chaos_types::InnerObject;
use std::{any::Any, fmt, sync::Arc};

/// Identity of the experiment a reconcile was triggered for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Request {
    pub namespace: String,
    pub name: String,
}

impl Request {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Shared by every endpoint built from the same registry.
pub struct EndpointContext {
    pub store: Arc<dyn ObjectStore>,
    pub selector: Arc<SelectionEngine>,
    pub fanout: FanoutPolicy,
}

impl EndpointContext {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        selector: Arc<SelectionEngine>,
        fanout: FanoutPolicy,
    ) -> Self {
        Self {
            store,
            selector,
            fanout,
        }
    }
}

/// The Apply/Recover capability of one experiment kind.
///
/// Both operations receive the kind-erased object and must reject objects
/// of another kind with [`RouterError::KindMismatch`] (see [`downcast_mut`]).
/// The returned report lists per-target outcomes; under
/// [`FanoutPolicy::BestEffort`] failed targets do not fail the call.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn apply(&self, request: &Request, chaos: &mut dyn InnerObject) -> Result<FanoutReport>;

    async fn recover(&self, request: &Request, chaos: &mut dyn InnerObject)
        -> Result<FanoutReport>;

    /// An empty object of the kind this endpoint handles.
    fn object(&self) -> Box<dyn InnerObject>;
}

pub fn downcast_mut<'a, K: Any>(
    chaos: &'a mut dyn InnerObject,
    expected: &'static str,
) -> Result<&'a mut K> {
    let actual = chaos.kind();
    chaos
        .as_any_mut()
        .downcast_mut::<K>()
        .ok_or_else(|| RouterError::KindMismatch {
            expected,
            actual: actual.to_string(),
        })
}
