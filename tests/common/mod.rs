//! Shared utilities for integration tests.
//!
//! Provides a driver wired to a [`RecordingTransport`] with deterministic
//! retry timing, and the result alias used across test binaries.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use graphwire::{Driver, DriverBuilder, ProtocolAnomaly, RetryPolicy};
use graphwire_testing::RecordingTransport;

/// Shared result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Retry policy without jitter so delays are predictable.
#[must_use]
pub fn deterministic_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        max_total_wait: Duration::from_secs(600),
        jitter: false,
        ..RetryPolicy::default()
    }
}

/// A driver under test with its recorded transport and anomalies.
pub struct TestDriver {
    pub driver: Driver,
    pub transport: RecordingTransport,
    pub anomalies: Arc<Mutex<Vec<ProtocolAnomaly>>>,
}

impl TestDriver {
    /// Build from `builder`, recording outbound frames and anomalies.
    pub fn build(builder: DriverBuilder) -> Self {
        let transport = RecordingTransport::new();
        let anomalies = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&anomalies);
        let driver = builder
            .on_anomaly(move |anomaly| {
                recorded
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(anomaly.clone());
            })
            .build(transport.clone().into_transport());
        Self {
            driver,
            transport,
            anomalies,
        }
    }

    /// Anomalies observed so far.
    pub fn anomalies(&self) -> Vec<ProtocolAnomaly> {
        self.anomalies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Driver with deterministic retries allowing `max_attempts` resubmissions.
#[must_use]
pub fn test_driver(max_attempts: u32) -> TestDriver {
    TestDriver::build(Driver::builder().retry_policy(deterministic_policy(max_attempts)))
}
