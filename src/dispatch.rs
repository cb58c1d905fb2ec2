//! Per-frame response state machine.
//!
//! [`ResponseDispatcher`] consumes frames in arrival order, classifies each
//! status code, and advances the owning request: accumulating partial
//! results, completing or failing it, handing retryable statuses to the
//! [`RetryCoordinator`], and challenges to the [`AuthChallengeHandler`].
//!
//! Frame handling never blocks. Sends required by retries and challenges run
//! on tracked background tasks so a slow resubmission cannot stall frames for
//! other requests. Malformed or late frames are reported as
//! [`ProtocolAnomaly`] events and only ever affect the request they name.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthChallengeHandler, ChallengeAction},
    error::{RequestError, TableError},
    frame::{OutboundFrame, RequestId, ResponseFrame},
    metrics,
    pending::PendingRequestTable,
    retry::{Decision, RetryCoordinator},
    status::{ResponseKind, ResponseStatusCode, UnknownStatusCode, classify_frame},
    transport::Transport,
};

/// Irregular frame observed on the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolAnomaly {
    /// A frame carried a status code outside the defined set.
    UnknownStatus {
        /// Wire id on the frame.
        request_id: RequestId,
        /// The unrecognised code.
        status_code: u16,
    },
    /// A frame arrived for an id that is not pending, e.g. after completion,
    /// cancellation, timeout, or resubmission under a new id.
    LateFrame {
        /// Wire id on the frame.
        request_id: RequestId,
        /// Status code on the frame.
        status_code: u16,
    },
}

/// Callback observing every [`ProtocolAnomaly`].
pub type AnomalyHook = Arc<dyn Fn(&ProtocolAnomaly) + Send + Sync>;

/// Drives pending requests from incoming frames.
pub struct ResponseDispatcher {
    table: Arc<PendingRequestTable>,
    retry: RetryCoordinator,
    auth: AuthChallengeHandler,
    transport: Arc<dyn Transport>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    on_anomaly: Option<AnomalyHook>,
}

impl std::fmt::Debug for ResponseDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseDispatcher")
            .field("pending", &self.table.len())
            .field("retry", &self.retry)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl ResponseDispatcher {
    /// Assemble a dispatcher over `table`, sending through `transport`.
    ///
    /// Background sends are spawned on `tasks` and abandoned once
    /// `shutdown` is cancelled.
    #[must_use]
    pub fn new(
        table: Arc<PendingRequestTable>,
        retry: RetryCoordinator,
        auth: AuthChallengeHandler,
        transport: Arc<dyn Transport>,
        tasks: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            table,
            retry,
            auth,
            transport,
            tasks,
            shutdown,
            on_anomaly: None,
        }
    }

    /// Observe protocol anomalies with `hook`.
    #[must_use]
    pub fn with_anomaly_hook(mut self, hook: Option<AnomalyHook>) -> Self {
        self.on_anomaly = hook;
        self
    }

    /// Process one frame.
    ///
    /// Must be called from within a Tokio runtime and from a single task per
    /// connection so frames are applied in arrival order.
    pub fn on_frame(&self, frame: ResponseFrame) {
        let classification = match classify_frame(frame.status_code, frame.has_payload()) {
            Ok(classification) => classification,
            Err(unknown) => {
                self.on_unknown_status(frame.request_id, unknown);
                return;
            }
        };
        metrics::inc_frames(classification.kind);

        let request_id = frame.request_id;
        let status_code = frame.status_code;
        let handled = match classification.kind {
            ResponseKind::PartialSuccess => self.table.with_entry(request_id, |entry| {
                entry.append(frame.payload);
                debug!(%request_id, fragments = entry.accumulated().len(), "partial result appended");
            }),
            ResponseKind::TerminalSuccessEmpty => {
                if frame.has_payload() {
                    debug!(%request_id, status = status_code, "payload on empty terminal frame ignored");
                }
                self.table.complete(request_id, None).inspect(|()| {
                    debug!(%request_id, status = status_code, "request completed");
                })
            }
            ResponseKind::TerminalSuccessWithData => {
                self.table.complete(request_id, frame.payload).inspect(|()| {
                    debug!(%request_id, status = status_code, "request completed");
                })
            }
            ResponseKind::AuthChallenge => self.on_challenge(&frame),
            ResponseKind::RetryableError => self.on_retryable(frame, classification.status),
            ResponseKind::FatalError => self.table.fail(request_id, RequestError::Server {
                status: status_code,
                message: frame.status_message,
                payload: frame.payload,
            }),
        };

        if let Err(TableError::NotFound(_)) = handled {
            self.report(&ProtocolAnomaly::LateFrame {
                request_id,
                status_code,
            });
        }
    }

    fn on_unknown_status(&self, request_id: RequestId, unknown: UnknownStatusCode) {
        self.report(&ProtocolAnomaly::UnknownStatus {
            request_id,
            status_code: unknown.0,
        });
        // The owning request, if any, cannot be trusted to make progress.
        let _ = self.table.fail(request_id, RequestError::Protocol(unknown));
    }

    fn on_challenge(&self, frame: &ResponseFrame) -> Result<(), TableError> {
        let action = self.auth.on_challenge(
            &self.table,
            frame.request_id,
            frame.status_code,
            &frame.status_message,
        )?;
        match action {
            ChallengeAction::Respond(credentials) => {
                info!(request_id = %frame.request_id, "sending credentials");
                self.spawn_send(credentials, Duration::ZERO);
            }
            ChallengeAction::Rejected => {
                warn!(request_id = %frame.request_id, "authentication rejected");
            }
        }
        Ok(())
    }

    fn on_retryable(
        &self,
        frame: ResponseFrame,
        status: ResponseStatusCode,
    ) -> Result<(), TableError> {
        let request_id = frame.request_id;
        let (decision, attempts) = self.table.with_entry(request_id, |entry| {
            let decision = self.retry.on_retryable(entry.retry_mut(), status);
            (decision, entry.retry().attempt + 1)
        })?;

        match decision {
            Decision::Resubmit {
                request_id: next,
                delay,
            } => {
                let payload = self.table.reroute(request_id, next)?;
                metrics::inc_retries();
                debug!(
                    %request_id,
                    next_request_id = %next,
                    status = status.as_u16(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "resubmission scheduled"
                );
                self.spawn_send(OutboundFrame::request(next, payload), delay);
                Ok(())
            }
            Decision::GiveUp => {
                debug!(%request_id, attempts, "retry budget exhausted");
                self.table.fail(request_id, RequestError::RetriesExhausted {
                    status: status.as_u16(),
                    message: frame.status_message,
                    attempts,
                })
            }
        }
    }

    /// Send `frame` after `delay` unless the request has been finalised or
    /// the driver shut down in the meantime.
    fn spawn_send(&self, frame: OutboundFrame, delay: Duration) {
        let table = Arc::clone(&self.table);
        let transport = Arc::clone(&self.transport);
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = sleep(delay) => {}
                }
            }
            let request_id = frame.request_id;
            if table.route(request_id).is_err() {
                debug!(%request_id, "request finalised before send");
                return;
            }
            if let Err(e) = transport.send(frame).await {
                warn!(%request_id, error = %e, "send failed");
                let _ = table.fail(request_id, RequestError::send_failed(&e));
            }
        });
    }

    fn report(&self, anomaly: &ProtocolAnomaly) {
        metrics::inc_anomalies();
        match anomaly {
            ProtocolAnomaly::UnknownStatus {
                request_id,
                status_code,
            } => warn!(%request_id, status = status_code, "unknown status code"),
            ProtocolAnomaly::LateFrame {
                request_id,
                status_code,
            } => warn!(%request_id, status = status_code, "frame for request that is not pending"),
        }
        if let Some(hook) = &self.on_anomaly {
            hook(anomaly);
        }
    }
}
