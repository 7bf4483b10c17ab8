// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The kind registry: built once at startup, then only read.

use crate::{Endpoint, EndpointContext, Result, RouterError};
use chaos_types::{ChaosKind, InnerObject};
use std::{collections::BTreeMap, sync::Arc};

pub type AcceptFn = Arc<dyn Fn(&dyn InnerObject) -> bool + Send + Sync>;
pub type EndpointFactory = Arc<dyn Fn(Arc<EndpointContext>) -> Arc<dyn Endpoint> + Send + Sync>;

/// Accepts every object; used for kinds with a single endpoint.
pub fn accept_all() -> AcceptFn {
    Arc::new(|_: &dyn InnerObject| true)
}

struct Registration {
    name: &'static str,
    kind: Arc<dyn ChaosKind>,
    accepts: AcceptFn,
    factory: EndpointFactory,
}

#[derive(Default)]
pub struct RegistryBuilder {
    registrations: Vec<Registration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint for `kind`. A kind may be registered several
    /// times with distinct predicates; the first registration accepting an
    /// object handles it.
    pub fn register(
        mut self,
        name: &'static str,
        kind: Arc<dyn ChaosKind>,
        accepts: AcceptFn,
        factory: EndpointFactory,
    ) -> Self {
        self.registrations.push(Registration {
            name,
            kind,
            accepts,
            factory,
        });
        self
    }

    /// Instantiates every endpoint against the shared context.
    pub fn build(self, context: Arc<EndpointContext>) -> Registry {
        let mut kinds: BTreeMap<String, KindEntry> = BTreeMap::new();
        for registration in self.registrations {
            let entry = kinds
                .entry(registration.kind.kind().to_ascii_lowercase())
                .or_insert_with(|| KindEntry {
                    kind: registration.kind.clone(),
                    endpoints: vec![],
                });
            entry.endpoints.push(RoutedEndpoint {
                name: registration.name,
                accepts: registration.accepts,
                endpoint: (registration.factory)(context.clone()),
            });
        }
        Registry { kinds, context }
    }
}

pub struct RoutedEndpoint {
    name: &'static str,
    accepts: AcceptFn,
    endpoint: Arc<dyn Endpoint>,
}

impl RoutedEndpoint {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn accepts(&self, chaos: &dyn InnerObject) -> bool {
        (self.accepts)(chaos)
    }

    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }
}

/// Everything registered under one kind name.
pub struct KindEntry {
    kind: Arc<dyn ChaosKind>,
    endpoints: Vec<RoutedEndpoint>,
}

impl KindEntry {
    /// Prototype and list decoding for the kind.
    pub fn kind(&self) -> &Arc<dyn ChaosKind> {
        &self.kind
    }

    pub fn endpoints(&self) -> &[RoutedEndpoint] {
        &self.endpoints
    }

    pub fn route(&self, chaos: &dyn InnerObject) -> Result<&RoutedEndpoint> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.accepts(chaos))
            .ok_or_else(|| RouterError::NoAcceptingEndpoint {
                kind: self.kind.kind().to_string(),
                name: chaos.name().to_string(),
            })
    }
}

pub struct Registry {
    kinds: BTreeMap<String, KindEntry>,
    context: Arc<EndpointContext>,
}

impl Registry {
    /// Kind names are matched case-insensitively.
    pub fn lookup(&self, kind: &str) -> Result<&KindEntry> {
        self.kinds
            .get(&kind.to_ascii_lowercase())
            .ok_or_else(|| RouterError::NotSupported(kind.to_string()))
    }

    pub fn route(&self, kind: &str, chaos: &dyn InnerObject) -> Result<&RoutedEndpoint> {
        self.lookup(kind)?.route(chaos)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &KindEntry> {
        self.kinds.values()
    }

    pub fn context(&self) -> &Arc<EndpointContext> {
        &self.context
    }
}
