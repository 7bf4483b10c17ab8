// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Target selection: the candidate resolver lists what a selector matches,
//! the sampler narrows it down per mode, and the engine runs both.

mod engine;
mod error;
pub mod filter;
mod policy;
mod resolver;
pub mod sampler;

pub use engine::SelectionEngine;
pub use error::SelectorError;
pub use policy::{NamespacePolicy, Scope};
pub use resolver::{check_pod_meets_selector, CandidateResolver};

pub type Result<T, E = SelectorError> = ::std::result::Result<T, E>;
