// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use chaos_selector::SelectorError;
use chaos_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("{0} is not supported")]
    NotSupported(String),
    #[error("no endpoint of kind {kind} accepts {name}")]
    NoAcceptingEndpoint { kind: String, name: String },
    #[error("expected a {expected} object, got {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: String,
    },
    #[error("{failed} of {total} targets failed, first failure: {first}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first: String,
    },
    #[error("{0}")]
    Action(String),
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Object(#[from] chaos_types::Error),
}

impl RouterError {
    /// Returns a summary label for the error type
    pub fn get_label(&self) -> &'static str {
        match self {
            RouterError::NotSupported(_) => "not_supported",
            RouterError::NoAcceptingEndpoint { .. } => "no_accepting_endpoint",
            RouterError::KindMismatch { .. } => "kind_mismatch",
            RouterError::PartialFailure { .. } => "partial_failure",
            RouterError::Action(_) => "action",
            RouterError::Selector(_) => "selector",
            RouterError::Store(_) => "store",
            RouterError::Object(_) => "object",
        }
    }
}
