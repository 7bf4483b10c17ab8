// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use chaos_store::StoreError;
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("selection is ambiguous: {0}")]
    Ambiguous(String),
    #[error("{0}")]
    Usage(String),
    #[error("invalid mode value {value:?}: {source}")]
    InvalidModeValue {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("cannot generate targets from empty list")]
    EmptyCandidates,
    #[error("no {0} is selected")]
    NothingSelected(&'static str),
    #[error(transparent)]
    InvalidExpression(#[from] chaos_types::Error),
    #[error("invalid namespace pattern: {0}")]
    InvalidNamespacePattern(#[from] regex::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SelectorError {
    /// Returns a summary label for the error type
    pub fn get_label(&self) -> &'static str {
        match self {
            SelectorError::Ambiguous(_) => "ambiguous",
            SelectorError::Usage(_) => "usage",
            SelectorError::InvalidModeValue { .. } => "invalid_mode_value",
            SelectorError::EmptyCandidates => "empty_candidates",
            SelectorError::NothingSelected(_) => "nothing_selected",
            SelectorError::InvalidExpression(_) => "invalid_expression",
            SelectorError::InvalidNamespacePattern(_) => "invalid_namespace_pattern",
            SelectorError::Store(_) => "store",
        }
    }

    /// Usage errors are caused by the experiment definition itself and
    /// will not go away on retry.
    pub fn is_usage(&self) -> bool {
        !matches!(self, SelectorError::Store(_))
    }
}
