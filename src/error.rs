//! Error types surfaced to callers and raised by the pending request table.
//!
//! [`RequestError`] is the typed failure a caller receives when its request
//! does not complete successfully. Every variant reports an
//! [`ErrorCategory`] so callers can distinguish exhausted retries from fatal
//! server errors without inspecting messages.

use std::io;

use thiserror::Error;

use crate::{frame::RequestId, status::UnknownStatusCode};

/// Coarse failure category reported alongside every [`RequestError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unknown status code or otherwise malformed frame.
    Protocol,
    /// Credentials were rejected.
    AuthenticationFailed,
    /// Transient failures persisted past the retry budget.
    RetriesExhausted,
    /// No frame arrived within the configured inactivity window.
    Timeout,
    /// The caller cancelled the request.
    Cancelled,
    /// The server reported a fatal status.
    Server,
    /// The connection went away while the request was pending.
    ConnectionClosed,
}

impl ErrorCategory {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::AuthenticationFailed => "authentication_failed",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Server => "server",
            Self::ConnectionClosed => "connection_closed",
        }
    }
}

/// Failure delivered to the caller that owns a request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// A frame for this request carried an unknown status code.
    #[error("protocol error: {0}")]
    Protocol(#[from] UnknownStatusCode),
    /// The server challenged the request again after credentials were sent.
    #[error("authentication failed with status {status}: {message}")]
    AuthenticationFailed {
        /// Status code of the rejecting frame.
        status: u16,
        /// Server-provided message.
        message: String,
    },
    /// Every permitted attempt returned a retryable status.
    #[error("retries exhausted after {attempts} attempts; last status {status}: {message}")]
    RetriesExhausted {
        /// Last observed status code.
        status: u16,
        /// Last server-provided message.
        message: String,
        /// Number of attempts made, including the first submission.
        attempts: u32,
    },
    /// The request saw no progress within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
    /// The server returned a fatal status.
    #[error("server error {status}: {message}")]
    Server {
        /// Status code reported by the server.
        status: u16,
        /// Server-provided message.
        message: String,
        /// Result fragments delivered with the failing frame, if any.
        payload: Option<bytes::Bytes>,
    },
    /// The frame stream ended or a send failed while the request was pending.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

impl RequestError {
    /// Category used for metrics and caller branching.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::AuthenticationFailed { .. } => ErrorCategory::AuthenticationFailed,
            Self::RetriesExhausted { .. } => ErrorCategory::RetriesExhausted,
            Self::Timeout => ErrorCategory::Timeout,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Server { .. } => ErrorCategory::Server,
            Self::ConnectionClosed(_) => ErrorCategory::ConnectionClosed,
        }
    }

    /// Status code associated with the failure, if one was observed.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Protocol(UnknownStatusCode(code)) => Some(*code),
            Self::AuthenticationFailed { status, .. }
            | Self::RetriesExhausted { status, .. }
            | Self::Server { status, .. } => Some(*status),
            Self::Timeout | Self::Cancelled | Self::ConnectionClosed(_) => None,
        }
    }

    /// Message supplied by the server, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::AuthenticationFailed { message, .. }
            | Self::RetriesExhausted { message, .. }
            | Self::Server { message, .. } => Some(message),
            Self::Protocol(_) | Self::Timeout | Self::Cancelled | Self::ConnectionClosed(_) => None,
        }
    }

    pub(crate) fn send_failed(error: &io::Error) -> Self {
        Self::ConnectionClosed(format!("send failed: {error}"))
    }
}

/// Errors raised by [`PendingRequestTable`](crate::pending::PendingRequestTable).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// A request with this identifier is already pending.
    #[error("request id {0} is already pending")]
    DuplicateRequestId(RequestId),
    /// No pending request is routed under this identifier.
    #[error("request id {0} is not pending")]
    NotFound(RequestId),
}

/// Errors returned by [`Driver::submit`](crate::client::Driver::submit).
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The transport rejected the initial submission.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The identifier was already pending.
    #[error(transparent)]
    Table(#[from] TableError),
    /// The driver has been shut down.
    #[error("driver is shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(RequestError::Protocol(UnknownStatusCode(418)), ErrorCategory::Protocol, Some(418))]
    #[case(RequestError::Timeout, ErrorCategory::Timeout, None)]
    #[case(RequestError::Cancelled, ErrorCategory::Cancelled, None)]
    #[case(
        RequestError::RetriesExhausted { status: 429, message: String::new(), attempts: 3 },
        ErrorCategory::RetriesExhausted,
        Some(429)
    )]
    fn reports_category_and_status(
        #[case] error: RequestError,
        #[case] category: ErrorCategory,
        #[case] status: Option<u16>,
    ) {
        assert_eq!(error.category(), category);
        assert_eq!(error.status_code(), status);
    }

    #[test]
    fn server_error_exposes_message() {
        let error = RequestError::Server {
            status: 597,
            message: "no such property".into(),
            payload: None,
        };
        assert_eq!(error.server_message(), Some("no such property"));
        assert_eq!(error.to_string(), "server error 597: no such property");
    }
}
