// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Data model shared by the chaos controller: selection specifications,
//! target-count modes, experiment status, the `Chaos Instance` projection,
//! and one concrete experiment type per chaos kind.

mod error;
mod instance;
pub mod kinds;
pub mod labels;
mod mode;
mod object;
mod selector;
mod status;

pub use error::Error;
pub use instance::ChaosInstance;
pub use kinds::{
    hello_world::{HelloWorldChaos, HelloWorldChaosSpec},
    persistent_volume::{PersistentVolumeChaos, PersistentVolumeChaosSpec},
    persistent_volume_claim::{PersistentVolumeClaimChaos, PersistentVolumeClaimChaosSpec},
    pod::{PodChaos, PodChaosAction, PodChaosSpec},
    ChaosKind, ChaosKinds, Prototype, TypedKind,
};
pub use mode::Mode;
pub use object::{
    HasAction, InnerObject, CLEAN_FINALIZER_ANNOTATION_KEY, CLEAN_FINALIZER_FORCED,
    PAUSE_ANNOTATION_KEY, RECORDS_FINALIZER,
};
pub use selector::{SelectSpec, SelectorSpec};
pub use status::{ChaosStatus, ExperimentPhase, ExperimentStatus, ScheduleStatus, SchedulerSpec};

pub type Result<T, E = Error> = ::std::result::Result<T, E>;
