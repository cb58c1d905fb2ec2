//! Table of in-flight requests and their result sinks.
//!
//! [`PendingRequestTable`] is the single source of truth for which requests
//! are still awaiting frames. Entries are keyed by the logical request id
//! returned to the caller; a separate route map resolves the wire id of the
//! current attempt to that logical id so resubmissions can change wire ids
//! without moving the entry. Removing an entry is the only way to reach its
//! [`ResultSink`], so each sink is finalised at most once.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use dashmap::{
    DashMap,
    mapref::{entry::Entry, one::Ref},
};
use tokio::{sync::oneshot, time::Instant};
use tracing::debug;

use crate::{
    error::{RequestError, TableError},
    frame::RequestId,
    metrics,
    retry::RetryState,
};

/// Final value delivered to a caller.
pub type Outcome = Result<Vec<Bytes>, RequestError>;

/// Lifecycle state of a pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Submitted; no result fragment received yet.
    Awaiting,
    /// At least one partial frame has been received.
    Accumulating,
    /// Finalised successfully. Reported when the entry leaves the table.
    Completed,
    /// Finalised with an error. Reported when the entry leaves the table.
    Failed,
}

/// Sending half of a caller's result slot.
#[derive(Debug)]
pub struct ResultSink(oneshot::Sender<Outcome>);

impl ResultSink {
    /// Deliver the outcome. Returns `false` if the caller stopped waiting.
    pub fn resolve(self, outcome: Outcome) -> bool { self.0.send(outcome).is_ok() }
}

/// Caller-side future resolving to the request's outcome.
#[derive(Debug)]
pub struct ResponseHandle {
    request_id: RequestId,
    rx: oneshot::Receiver<Outcome>,
}

impl ResponseHandle {
    /// Logical identifier of the request; pass it to
    /// [`Driver::cancel`](crate::client::Driver::cancel).
    #[must_use]
    pub fn request_id(&self) -> RequestId { self.request_id }
}

impl Future for ResponseHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(RequestError::ConnectionClosed(
                    "driver dropped the request".into(),
                ))
            })
        })
    }
}

/// Create a linked sink and handle for `request_id`.
#[must_use]
pub fn result_channel(request_id: RequestId) -> (ResultSink, ResponseHandle) {
    let (tx, rx) = oneshot::channel();
    (ResultSink(tx), ResponseHandle { request_id, rx })
}

/// Bookkeeping for one in-flight logical request.
#[derive(Debug)]
pub struct PendingRequest {
    request_id: RequestId,
    wire_id: RequestId,
    payload: Bytes,
    sink: ResultSink,
    accumulated: Vec<Bytes>,
    retry: RetryState,
    challenged: bool,
    state: RequestState,
    last_activity: Instant,
}

impl PendingRequest {
    /// Create an entry for a freshly submitted request.
    #[must_use]
    pub fn new(request_id: RequestId, payload: Bytes, sink: ResultSink) -> Self {
        Self {
            request_id,
            wire_id: request_id,
            payload,
            sink,
            accumulated: Vec::new(),
            retry: RetryState::default(),
            challenged: false,
            state: RequestState::Awaiting,
            last_activity: Instant::now(),
        }
    }

    /// Logical identifier returned to the caller.
    #[must_use]
    pub fn request_id(&self) -> RequestId { self.request_id }

    /// Wire identifier of the current attempt.
    #[must_use]
    pub fn wire_id(&self) -> RequestId { self.wire_id }

    /// Original request body, resent verbatim on retry.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Result fragments received so far, in arrival order.
    #[must_use]
    pub fn accumulated(&self) -> &[Bytes] { &self.accumulated }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RequestState { self.state }

    /// Retry bookkeeping.
    #[must_use]
    pub fn retry(&self) -> &RetryState { &self.retry }

    pub(crate) fn retry_mut(&mut self) -> &mut RetryState { &mut self.retry }

    /// Whether credentials have already been sent for this request.
    #[must_use]
    pub fn challenged(&self) -> bool { self.challenged }

    pub(crate) fn mark_challenged(&mut self) {
        self.challenged = true;
        self.state = RequestState::Awaiting;
        self.touch();
    }

    pub(crate) fn append(&mut self, fragment: Option<Bytes>) {
        if let Some(fragment) = fragment {
            self.accumulated.push(fragment);
        }
        self.state = RequestState::Accumulating;
        self.touch();
    }

    fn touch(&mut self) { self.last_activity = Instant::now(); }

    /// Deliver the outcome and consume the entry.
    ///
    /// Terminal states are never stored: a finished request is represented
    /// by its absence from the table.
    fn finish(self, outcome: Outcome) -> bool {
        let state = if outcome.is_ok() {
            RequestState::Completed
        } else {
            RequestState::Failed
        };
        debug!(request_id = %self.request_id, ?state, "request finalised");
        metrics::inc_finalized(outcome.as_ref().err().map(RequestError::category));
        self.sink.resolve(outcome)
    }
}

/// Concurrent map of pending requests.
///
/// Lock order is entries before routes; no method holds a route guard while
/// acquiring an entry.
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    entries: DashMap<RequestId, PendingRequest>,
    routes: DashMap<RequestId, RequestId>,
}

impl PendingRequestTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether no request is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Insert a newly submitted request.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::DuplicateRequestId`] if the id is already
    /// pending or routed.
    pub fn register(&self, request: PendingRequest) -> Result<(), TableError> {
        let id = request.request_id;
        if self.routes.contains_key(&id) {
            return Err(TableError::DuplicateRequestId(id));
        }
        match self.entries.entry(id) {
            Entry::Occupied(_) => return Err(TableError::DuplicateRequestId(id)),
            Entry::Vacant(slot) => {
                slot.insert(request);
                self.routes.insert(id, id);
            }
        }
        metrics::set_pending(self.entries.len());
        Ok(())
    }

    /// Resolve the wire id of an incoming frame to its logical id.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if no current attempt uses `wire_id`.
    pub fn route(&self, wire_id: RequestId) -> Result<RequestId, TableError> {
        self.routes
            .get(&wire_id)
            .map(|logical| *logical)
            .ok_or(TableError::NotFound(wire_id))
    }

    /// Borrow the entry whose current attempt uses `wire_id`.
    ///
    /// The returned guard blocks writers to the entry's shard; drop it
    /// promptly.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if `wire_id` is not current.
    pub fn lookup(
        &self,
        wire_id: RequestId,
    ) -> Result<Ref<'_, RequestId, PendingRequest>, TableError> {
        let logical = self.route(wire_id)?;
        self.entries
            .get(&logical)
            .filter(|entry| entry.wire_id == wire_id)
            .ok_or(TableError::NotFound(wire_id))
    }

    /// Mutate the entry whose current attempt uses `wire_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if `wire_id` is not current.
    pub fn with_entry<R>(
        &self,
        wire_id: RequestId,
        f: impl FnOnce(&mut PendingRequest) -> R,
    ) -> Result<R, TableError> {
        let logical = self.route(wire_id)?;
        let mut entry = self
            .entries
            .get_mut(&logical)
            .filter(|entry| entry.wire_id == wire_id)
            .ok_or(TableError::NotFound(wire_id))?;
        Ok(f(&mut entry))
    }

    /// Move the entry currently routed by `old` to `new`.
    ///
    /// The route for `old` is dropped while the entry is locked, so a late
    /// frame on `old` is reported as stale instead of being applied.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if `old` is not current, or
    /// [`TableError::DuplicateRequestId`] if `new` is already routed.
    pub fn reroute(&self, old: RequestId, new: RequestId) -> Result<Bytes, TableError> {
        if self.routes.contains_key(&new) {
            return Err(TableError::DuplicateRequestId(new));
        }
        let logical = self.route(old)?;
        let mut entry = self
            .entries
            .get_mut(&logical)
            .filter(|entry| entry.wire_id == old)
            .ok_or(TableError::NotFound(old))?;
        self.routes.remove(&old);
        self.routes.insert(new, logical);
        entry.wire_id = new;
        entry.state = RequestState::Awaiting;
        entry.touch();
        Ok(entry.payload.clone())
    }

    /// Remove the entry for `request_id` (a logical id) without resolving it.
    pub fn remove(&self, request_id: RequestId) -> Option<PendingRequest> {
        let (_, entry) = self.entries.remove(&request_id)?;
        self.routes.remove(&entry.wire_id);
        metrics::set_pending(self.entries.len());
        Some(entry)
    }

    /// Finish the request currently routed by `wire_id` successfully,
    /// appending `last` to its fragments.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if `wire_id` is not current.
    pub fn complete(&self, wire_id: RequestId, last: Option<Bytes>) -> Result<(), TableError> {
        let mut entry = self.take_routed(wire_id)?;
        if let Some(last) = last {
            entry.accumulated.push(last);
        }
        let results = std::mem::take(&mut entry.accumulated);
        entry.finish(Ok(results));
        Ok(())
    }

    /// Fail the request currently routed by `wire_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if `wire_id` is not current.
    pub fn fail(&self, wire_id: RequestId, error: RequestError) -> Result<(), TableError> {
        let entry = self.take_routed(wire_id)?;
        entry.finish(Err(error));
        Ok(())
    }

    /// Fail the request with logical id `request_id`, regardless of which
    /// attempt is current.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if the request is no longer pending.
    pub fn fail_logical(&self, request_id: RequestId, error: RequestError) -> Result<(), TableError> {
        let entry = self
            .remove(request_id)
            .ok_or(TableError::NotFound(request_id))?;
        entry.finish(Err(error));
        Ok(())
    }

    /// Instant after which `request_id` expires unless it makes progress.
    ///
    /// Returns `None` if the request is not pending or if `timeout` is too
    /// large to be represented, in which case the request never expires.
    #[must_use]
    pub fn idle_deadline(&self, request_id: RequestId, timeout: Duration) -> Option<Instant> {
        self.entries
            .get(&request_id)
            .and_then(|entry| entry.last_activity.checked_add(timeout))
    }

    /// Fail `request_id` with [`RequestError::Timeout`] if it has been idle
    /// for at least `timeout`. Returns whether it expired.
    pub fn expire_idle(&self, request_id: RequestId, timeout: Duration) -> bool {
        let now = Instant::now();
        let Some((_, entry)) = self
            .entries
            .remove_if(&request_id, |_, entry| {
                entry
                    .last_activity
                    .checked_add(timeout)
                    .is_some_and(|deadline| deadline <= now)
            })
        else {
            return false;
        };
        self.routes.remove(&entry.wire_id);
        metrics::set_pending(self.entries.len());
        entry.finish(Err(RequestError::Timeout));
        true
    }

    /// Fail every pending request with a clone of `error`.
    pub fn fail_all(&self, error: &RequestError) -> usize {
        let ids: Vec<RequestId> = self.entries.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.fail_logical(*id, error.clone()).is_ok())
            .count()
    }

    fn take_routed(&self, wire_id: RequestId) -> Result<PendingRequest, TableError> {
        let logical = self.route(wire_id)?;
        let (_, entry) = self
            .entries
            .remove_if(&logical, |_, entry| entry.wire_id == wire_id)
            .ok_or(TableError::NotFound(wire_id))?;
        self.routes.remove(&wire_id);
        metrics::set_pending(self.entries.len());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests;
