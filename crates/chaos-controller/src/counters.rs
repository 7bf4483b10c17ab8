// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

pub const APPLY_LABEL: &str = "apply";
pub const RECOVER_LABEL: &str = "recover";
pub const SUCCESS_LABEL: &str = "success";
pub const ERROR_LABEL: &str = "error";

/// Reconcile passes, by experiment kind and result
pub static RECONCILE_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chaos_controller_reconcile_results",
        "Counters for reconcile passes by kind and result",
        &["kind", "result"]
    )
    .unwrap()
});

/// Endpoint dispatches, by experiment kind, operation and result
pub static ENDPOINT_DISPATCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chaos_controller_endpoint_dispatches",
        "Counters for apply and recover calls by kind, operation and result",
        &["kind", "operation", "result"]
    )
    .unwrap()
});

/// Targets chosen by the selection engine, by experiment kind
pub static SELECTED_TARGETS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chaos_controller_selected_targets",
        "Number of targets selected for injection by kind",
        &["kind"]
    )
    .unwrap()
});

/// Per-target actions that failed inside a fan-out
pub static FANOUT_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chaos_controller_fanout_failures",
        "Per-target action failures by kind and operation",
        &["kind", "operation"]
    )
    .unwrap()
});

pub fn observe_dispatch(kind: &str, operation: &str, result: &str, failed_targets: usize) {
    ENDPOINT_DISPATCHES
        .with_label_values(&[kind, operation, result])
        .inc();
    if failed_targets > 0 {
        FANOUT_FAILURES
            .with_label_values(&[kind, operation])
            .inc_by(failed_targets as u64);
    }
}
