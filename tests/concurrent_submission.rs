//! Many callers sharing one connection on a multi-threaded runtime.
//!
//! Submitters run as independent tasks while a separate task feeds the
//! connection's frames to the driver, so table mutations from `submit`,
//! `cancel`, frame dispatch and delayed resubmissions genuinely overlap.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use graphwire::{
    BackoffConfig,
    Driver,
    DriverBuilder,
    OutboundFrame,
    ProtocolAnomaly,
    RequestError,
    ResponseFrame,
    RetryPolicy,
    framed_connection,
};
use graphwire_testing::{frames, spawn_scripted_server};
use rstest::rstest;
use tokio::{
    io::duplex,
    task::{JoinHandle, JoinSet},
};

mod common;
use common::TestResult;

const SUBMITTERS: u64 = 200;

/// Requests whose payload starts with `slow` are rate limited forever;
/// everything else is echoed back as a partial frame followed by `done`.
fn respond(frame: &OutboundFrame) -> Vec<ResponseFrame> {
    let id = frame.request_id;
    if frame.payload.starts_with(b"slow") {
        return vec![frames::error(id, 429, "slow down")];
    }
    vec![
        frames::partial(id, frame.payload.clone()),
        frames::success(id, "done"),
    ]
}

fn connect(builder: DriverBuilder) -> (Driver, JoinHandle<()>, JoinHandle<()>) {
    let (client_io, server_io) = duplex(64 * 1024);
    let server = spawn_scripted_server(server_io, respond);
    let (transport, responses) = framed_connection(client_io);
    let driver = builder.build(Arc::new(transport));
    let runner = tokio::spawn({
        let driver = driver.clone();
        async move { driver.run(responses).await }
    });
    (driver, server, runner)
}

async fn echoed(driver: Driver, n: u64) -> TestResult {
    let payload = Bytes::from(format!("g.V({n})"));
    let results = driver.submit(payload.clone()).await?.await?;
    assert_eq!(results, vec![payload, Bytes::from_static(b"done")]);
    Ok(())
}

/// Submit a request the server keeps rate limiting and cancel it while a
/// resubmission is pending or in flight.
async fn cancelled_during_backoff(driver: Driver, n: u64) -> TestResult {
    let handle = driver.submit(format!("slow {n}")).await?;
    tokio::time::sleep(Duration::from_millis(n % 7 * 3)).await;
    driver.cancel(handle.request_id())?;
    assert_eq!(handle.await, Err(RequestError::Cancelled));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_submitters_receive_their_own_results() -> TestResult {
    let (driver, server, runner) = connect(Driver::builder());

    let mut callers = JoinSet::new();
    for n in 0..SUBMITTERS {
        callers.spawn(echoed(driver.clone(), n));
    }
    while let Some(joined) = callers.join_next().await {
        joined??;
    }
    assert_eq!(driver.pending(), 0);

    driver.shutdown().await;
    runner.await?;
    server.abort();
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_races_backoff_resubmission() -> TestResult {
    let anomalies = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&anomalies);
    let builder = Driver::builder()
        .retry_policy(RetryPolicy {
            max_attempts: u32::MAX,
            max_total_wait: Duration::from_secs(3600),
            rate_limit: BackoffConfig {
                initial_delay: Duration::from_millis(2),
                max_delay: Duration::from_millis(10),
            },
            ..RetryPolicy::default()
        })
        .on_anomaly(move |anomaly: &ProtocolAnomaly| {
            recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(anomaly.clone());
        });
    let (driver, server, runner) = connect(builder);

    let mut callers = JoinSet::new();
    for n in 0..SUBMITTERS {
        let driver = driver.clone();
        if n % 2 == 0 {
            callers.spawn(echoed(driver, n));
        } else {
            callers.spawn(cancelled_during_backoff(driver, n));
        }
    }
    while let Some(joined) = callers.join_next().await {
        joined??;
    }
    assert_eq!(driver.pending(), 0);

    // Rate-limit frames or reroutes overtaken by a cancel surface as late
    // frames and nothing else.
    let seen = anomalies
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    for anomaly in seen {
        assert!(
            matches!(anomaly, ProtocolAnomaly::LateFrame {
                status_code: 429,
                ..
            }),
            "unexpected anomaly: {anomaly:?}"
        );
    }

    driver.shutdown().await;
    runner.await?;
    server.abort();
    Ok(())
}
