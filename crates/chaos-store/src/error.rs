// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },
    /// The write was based on a stale read.
    #[error("{kind} {name:?} was modified concurrently")]
    Conflict { kind: String, name: String },
    #[error("kind {0} is not known to the object store")]
    UnknownKind(String),
    #[error("{op} {kind} {name:?} failed: {message}")]
    Api {
        op: &'static str,
        kind: String,
        name: String,
        message: String,
    },
    #[error("malformed object: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("failed to apply json patch: {0}")]
    Patch(#[from] json_patch::PatchError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Returns a summary label for the error type
    pub fn get_label(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Conflict { .. } => "conflict",
            StoreError::UnknownKind(_) => "unknown_kind",
            StoreError::Api { .. } => "api",
            StoreError::Serde(_) => "serde",
            StoreError::Patch(_) => "patch",
        }
    }
}
