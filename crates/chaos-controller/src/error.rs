// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use chaos_router::RouterError;
use chaos_selector::SelectorError;
use chaos_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Object(#[from] chaos_types::Error),
    #[error("invalid cron expression {0:?}: {1}")]
    Cron(String, String),
    #[error("nextRecover shouldn't be later than nextStart")]
    ScheduleConflict,
    #[error("Failed to sanitize the controller config! Sanitizer: {0}, Error: {1}")]
    ConfigSanitizerFailed(String, String),
    #[error("Error accessing {0}: {1}")]
    IO(String, #[source] std::io::Error),
    #[error("Error (de)serializing {0}: {1}")]
    Yaml(String, #[source] serde_yaml::Error),
}

impl Error {
    /// Returns a summary label for the error type
    pub fn get_label(&self) -> &'static str {
        match self {
            Error::Store(_) => "store",
            Error::Selector(_) => "selector",
            Error::Router(_) => "router",
            Error::Object(_) => "object",
            Error::Cron(..) => "cron",
            Error::ScheduleConflict => "schedule_conflict",
            Error::ConfigSanitizerFailed(..) => "config_sanitizer_failed",
            Error::IO(..) => "io",
            Error::Yaml(..) => "yaml",
        }
    }
}
