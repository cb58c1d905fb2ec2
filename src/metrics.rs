//! Metric helpers for `graphwire`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. Without the
//! `metrics` feature every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::{error::ErrorCategory, status::ResponseKind};

/// Name of the gauge tracking pending requests.
pub const REQUESTS_PENDING: &str = "graphwire_requests_pending";
/// Name of the counter tracking dispatched frames.
pub const FRAMES_DISPATCHED: &str = "graphwire_frames_dispatched_total";
/// Name of the counter tracking protocol anomalies.
pub const PROTOCOL_ANOMALIES: &str = "graphwire_protocol_anomalies_total";
/// Name of the counter tracking resubmissions.
pub const RETRIES_TOTAL: &str = "graphwire_retries_total";
/// Name of the counter tracking finalised requests.
pub const REQUESTS_FINALIZED: &str = "graphwire_requests_finalized_total";

/// Record a dispatched frame of the given kind.
#[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "no-op without metrics"))]
pub fn inc_frames(kind: ResponseKind) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_DISPATCHED, "kind" => kind.as_str()).increment(1);
}

/// Record a protocol anomaly.
pub fn inc_anomalies() {
    #[cfg(feature = "metrics")]
    counter!(PROTOCOL_ANOMALIES).increment(1);
}

/// Record a scheduled resubmission.
pub fn inc_retries() {
    #[cfg(feature = "metrics")]
    counter!(RETRIES_TOTAL).increment(1);
}

/// Record a finalised request; `None` denotes success.
#[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "no-op without metrics"))]
pub fn inc_finalized(category: Option<ErrorCategory>) {
    #[cfg(feature = "metrics")]
    counter!(
        REQUESTS_FINALIZED,
        "outcome" => category.map_or("success", ErrorCategory::as_str)
    )
    .increment(1);
}

/// Publish the number of pending requests.
#[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "no-op without metrics"))]
#[cfg_attr(feature = "metrics", expect(clippy::cast_precision_loss, reason = "gauge values are approximate"))]
pub fn set_pending(count: usize) {
    #[cfg(feature = "metrics")]
    gauge!(REQUESTS_PENDING).set(count as f64);
}
