// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Routes experiment objects to the endpoint of their kind.

mod endpoint;
mod error;
mod fanout;
mod registry;

pub use endpoint::{downcast_mut, Endpoint, EndpointContext, Request};
pub use error::RouterError;
pub use fanout::{fan_out, FanoutPolicy, FanoutReport, TargetFailure};
pub use registry::{
    accept_all, AcceptFn, EndpointFactory, KindEntry, Registry, RegistryBuilder, RoutedEndpoint,
};

pub type Result<T, E = RouterError> = ::std::result::Result<T, E>;
