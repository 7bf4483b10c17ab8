// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("mode {0} not supported")]
    UnsupportedMode(String),
    #[error("failed to parse duration {0:?}: {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),
    #[error("unable to parse selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("failed to decode {kind} object: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {kind} object: {source}")]
    Encode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Returns a summary label for the error type
    pub fn get_label(&self) -> &'static str {
        match self {
            Error::UnsupportedMode(_) => "unsupported_mode",
            Error::InvalidDuration(..) => "invalid_duration",
            Error::InvalidSelector { .. } => "invalid_selector",
            Error::Decode { .. } => "decode",
            Error::Encode { .. } => "encode",
        }
    }
}
