//! Caller-facing driver.
//!
//! A [`Driver`] owns the pending request table for one connection. Callers
//! [`submit`](Driver::submit) opaque request payloads and await the returned
//! [`ResponseHandle`]; a single task feeds the connection's frames to
//! [`run`](Driver::run).
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use graphwire::{client::Driver, transport::framed_connection};
//! use tokio::net::TcpStream;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:8182").await?;
//! let (transport, frames) = framed_connection(stream);
//! let driver = Driver::builder().build(Arc::new(transport));
//! tokio::spawn({
//!     let driver = driver.clone();
//!     async move { driver.run(frames).await }
//! });
//!
//! let results = driver.submit("g.V().count()").await?.await?;
//! println!("{} fragments", results.len());
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::time::sleep_until;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::debug;

use crate::{
    auth::{AuthChallengeHandler, CredentialsProvider},
    config::DriverConfig,
    dispatch::{AnomalyHook, ProtocolAnomaly, ResponseDispatcher},
    error::{RequestError, SubmitError, TableError},
    frame::{OutboundFrame, RequestId, RequestIdGenerator, ResponseFrame},
    pending::{PendingRequest, PendingRequestTable, ResponseHandle, result_channel},
    retry::{RetryCoordinator, RetryPolicy},
    transport::Transport,
};

/// Builder for [`Driver`].
#[must_use]
pub struct DriverBuilder {
    config: DriverConfig,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    on_anomaly: Option<AnomalyHook>,
    first_request_id: u64,
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self {
            config: DriverConfig::default(),
            credentials: None,
            on_anomaly: None,
            first_request_id: 1,
        }
    }
}

impl DriverBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Fail requests that see no frame for `timeout`.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Resubmission policy for retryable statuses.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Answer authentication challenges with `provider`.
    pub fn credentials(mut self, provider: impl CredentialsProvider + 'static) -> Self {
        self.credentials = Some(Arc::new(provider));
        self
    }

    /// Observe protocol anomalies.
    pub fn on_anomaly<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ProtocolAnomaly) + Send + Sync + 'static,
    {
        self.on_anomaly = Some(Arc::new(hook));
        self
    }

    /// First request id allocated by the driver.
    pub fn first_request_id(mut self, id: u64) -> Self {
        self.first_request_id = id;
        self
    }

    /// Build a driver sending through `transport`.
    pub fn build(self, transport: Arc<dyn Transport>) -> Driver {
        let config = self.config.normalized();
        let ids = Arc::new(RequestIdGenerator::starting_at(self.first_request_id));
        let table = Arc::new(PendingRequestTable::new());
        let tasks = TaskTracker::new();
        let shutdown = CancellationToken::new();
        let dispatcher = ResponseDispatcher::new(
            Arc::clone(&table),
            RetryCoordinator::new(config.retry, Arc::clone(&ids)),
            AuthChallengeHandler::new(self.credentials),
            Arc::clone(&transport),
            tasks.clone(),
            shutdown.clone(),
        )
        .with_anomaly_hook(self.on_anomaly);

        Driver {
            config,
            ids,
            table,
            dispatcher: Arc::new(dispatcher),
            transport,
            tasks,
            shutdown,
        }
    }
}

/// Correlates requests and responses on one connection.
///
/// Cloning a driver yields another handle to the same connection state.
#[derive(Clone)]
pub struct Driver {
    config: DriverConfig,
    ids: Arc<RequestIdGenerator>,
    table: Arc<PendingRequestTable>,
    dispatcher: Arc<ResponseDispatcher>,
    transport: Arc<dyn Transport>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("pending", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Start building a driver.
    pub fn builder() -> DriverBuilder { DriverBuilder::default() }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig { &self.config }

    /// Number of requests awaiting completion.
    #[must_use]
    pub fn pending(&self) -> usize { self.table.len() }

    /// Submit a request and return a handle resolving to its results.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Shutdown`] after [`shutdown`](Self::shutdown)
    /// and [`SubmitError::Io`] if the transport rejects the frame.
    pub async fn submit(&self, payload: impl Into<Bytes>) -> Result<ResponseHandle, SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::Shutdown);
        }
        let payload = payload.into();
        let request_id = self.ids.next_id();
        let (sink, handle) = result_channel(request_id);
        self.table
            .register(PendingRequest::new(request_id, payload.clone(), sink))?;
        self.spawn_timeout(request_id);

        if let Err(e) = self
            .transport
            .send(OutboundFrame::request(request_id, payload))
            .await
        {
            self.table.remove(request_id);
            return Err(e.into());
        }
        debug!(%request_id, "request submitted");
        Ok(handle)
    }

    /// Cancel a pending request; its handle resolves to
    /// [`RequestError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if the request already finished.
    pub fn cancel(&self, request_id: RequestId) -> Result<(), TableError> {
        self.table.fail_logical(request_id, RequestError::Cancelled)?;
        debug!(%request_id, "request cancelled");
        Ok(())
    }

    /// Apply a single frame. Frames must be applied in arrival order.
    pub fn dispatch(&self, frame: ResponseFrame) { self.dispatcher.on_frame(frame); }

    /// Consume `frames` until the stream ends or the driver shuts down.
    ///
    /// When the stream ends every pending request fails with
    /// [`RequestError::ConnectionClosed`].
    pub async fn run<S>(&self, frames: S)
    where
        S: Stream<Item = ResponseFrame> + Unpin,
    {
        let mut frames = frames;
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return,
                next = frames.next() => match next {
                    Some(frame) => self.dispatch(frame),
                    None => break,
                },
            }
        }
        let failed = self
            .table
            .fail_all(&RequestError::ConnectionClosed("frame stream ended".into()));
        debug!(failed, "frame stream ended");
    }

    /// Stop background work and fail every pending request.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.table
            .fail_all(&RequestError::ConnectionClosed("driver shut down".into()));
    }

    fn spawn_timeout(&self, request_id: RequestId) {
        let table = Arc::clone(&self.table);
        let timeout = self.config.request_timeout;
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            while let Some(deadline) = table.idle_deadline(request_id, timeout) {
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = sleep_until(deadline) => {}
                }
                if table.expire_idle(request_id, timeout) {
                    debug!(%request_id, "request timed out");
                    return;
                }
            }
        });
    }
}
