//! Frame types exchanged with the server.
//!
//! Inbound [`ResponseFrame`]s arrive in order on a connection but may
//! interleave arbitrarily across requests. Outbound [`OutboundFrame`]s are
//! handed to the [`Transport`](crate::transport::Transport) for submission,
//! resubmission and credential responses.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;

/// Identifier correlating every frame that belongs to one request attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl From<u64> for RequestId {
    fn from(value: u64) -> Self { Self(value) }
}

impl RequestId {
    /// Create a new [`RequestId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "RequestId({})", self.0) }
}

/// Monotonic source of request identifiers for a single connection.
#[derive(Debug)]
pub struct RequestIdGenerator(AtomicU64);

impl Default for RequestIdGenerator {
    fn default() -> Self { Self::starting_at(1) }
}

impl RequestIdGenerator {
    /// Create a generator whose first identifier is `first`.
    #[must_use]
    pub fn starting_at(first: u64) -> Self { Self(AtomicU64::new(first)) }

    /// Allocate the next identifier.
    pub fn next_id(&self) -> RequestId { RequestId(self.0.fetch_add(1, Ordering::Relaxed)) }
}

/// One server-to-client response unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Request the frame belongs to.
    pub request_id: RequestId,
    /// Numeric status code as sent by the server.
    pub status_code: u16,
    /// Human-readable status message; typically set on errors.
    pub status_message: String,
    /// Result fragment, if any.
    pub payload: Option<Bytes>,
}

impl ResponseFrame {
    /// Build a frame carrying no payload or message.
    #[must_use]
    pub fn new(request_id: RequestId, status_code: u16) -> Self {
        Self {
            request_id,
            status_code,
            status_message: String::new(),
            payload: None,
        }
    }

    /// Attach a result fragment.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Attach a status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = message.into();
        self
    }

    /// Whether the frame carries a result fragment.
    #[must_use]
    pub fn has_payload(&self) -> bool { self.payload.is_some() }
}

/// Purpose of an outbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboundKind {
    /// A request submission or resubmission.
    Request,
    /// A credentials response to an authentication challenge.
    Authentication,
}

/// A client-to-server frame handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Identifier the server will echo on every response frame.
    pub request_id: RequestId,
    /// What this frame carries.
    pub kind: OutboundKind,
    /// Opaque request body or credentials.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Build a request frame.
    #[must_use]
    pub fn request(request_id: RequestId, payload: Bytes) -> Self {
        Self {
            request_id,
            kind: OutboundKind::Request,
            payload,
        }
    }

    /// Build a credentials frame answering a challenge on `request_id`.
    #[must_use]
    pub fn authentication(request_id: RequestId, payload: Bytes) -> Self {
        Self {
            request_id,
            kind: OutboundKind::Authentication,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_yields_unique_ids() {
        let ids = RequestIdGenerator::default();
        let first = ids.next_id();
        let second = ids.next_id();
        assert_eq!(first, RequestId::new(1));
        assert_eq!(second, RequestId::new(2));
    }

    #[test]
    fn builder_methods_set_fields() {
        let frame = ResponseFrame::new(RequestId::new(3), 500)
            .with_message("boom")
            .with_payload(&b"x"[..]);
        assert!(frame.has_payload());
        assert_eq!(frame.status_message, "boom");
    }
}
