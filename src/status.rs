//! Status codes returned by the graph server and their classification.
//!
//! Every response frame carries a numeric status code. [`classify`] maps the
//! closed set of codes the server emits onto a [`ResponseKind`] which the
//! dispatcher uses to decide whether a response stream continues, completes,
//! must be retried, requires authentication, or has failed.

use std::fmt;

use thiserror::Error;

/// Raised when a frame carries a status code outside the known set.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("unknown response status code {0}")]
pub struct UnknownStatusCode(pub u16);

/// Status codes emitted by the server.
///
/// The discriminants are the values sent on the wire and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseStatusCode {
    /// The request completed and no further frames follow.
    Success = 200,
    /// The request completed without producing any result.
    NoContent = 204,
    /// Part of the result; more frames follow for the same request.
    PartialContent = 206,
    /// The caller may not access the requested resources.
    Unauthorized = 401,
    /// The request was authenticated but is not permitted.
    Forbidden = 403,
    /// The server asks the client to authenticate the request.
    Authenticate = 407,
    /// Too many requests were sent in a given amount of time.
    TooManyRequests = 429,
    /// The request contained objects the client could not serialize.
    ClientSerializationError = 497,
    /// The request could not be parsed or routed.
    MalformedRequest = 498,
    /// The request arguments were conflicting or incomplete.
    InvalidRequestArguments = 499,
    /// A general server failure.
    ServerError = 500,
    /// The traversal triggered a `fail()` step.
    ServerErrorFailStep = 595,
    /// A transient failure such as a lock conflict; the request may succeed later.
    ServerErrorTemporary = 596,
    /// The submitted traversal failed during evaluation.
    ServerEvaluationError = 597,
    /// The server exceeded a timeout while processing the request.
    ServerTimeout = 598,
    /// The server could not serialize a result.
    ServerSerializationError = 599,
}

impl ResponseStatusCode {
    /// Every defined status code in ascending wire order.
    pub const ALL: [ResponseStatusCode; 16] = [
        Self::Success,
        Self::NoContent,
        Self::PartialContent,
        Self::Unauthorized,
        Self::Forbidden,
        Self::Authenticate,
        Self::TooManyRequests,
        Self::ClientSerializationError,
        Self::MalformedRequest,
        Self::InvalidRequestArguments,
        Self::ServerError,
        Self::ServerErrorFailStep,
        Self::ServerErrorTemporary,
        Self::ServerEvaluationError,
        Self::ServerTimeout,
        Self::ServerSerializationError,
    ];

    /// Return the numeric wire value.
    #[must_use]
    pub fn as_u16(self) -> u16 { self as u16 }

    /// Whether the code signals an error.
    ///
    /// The authentication challenge is not an error: it is a control signal
    /// routed to the challenge handler.
    #[must_use]
    pub fn indicates_error(self) -> bool {
        match self {
            Self::Success | Self::NoContent | Self::PartialContent | Self::Authenticate => false,
            Self::Unauthorized
            | Self::Forbidden
            | Self::TooManyRequests
            | Self::ClientSerializationError
            | Self::MalformedRequest
            | Self::InvalidRequestArguments
            | Self::ServerError
            | Self::ServerErrorFailStep
            | Self::ServerErrorTemporary
            | Self::ServerEvaluationError
            | Self::ServerTimeout
            | Self::ServerSerializationError => true,
        }
    }
}

impl TryFrom<u16> for ResponseStatusCode {
    type Error = UnknownStatusCode;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_u16() == code)
            .ok_or(UnknownStatusCode(code))
    }
}

impl From<ResponseStatusCode> for u16 {
    fn from(status: ResponseStatusCode) -> Self { status.as_u16() }
}

impl fmt::Display for ResponseStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({self:?})", self.as_u16())
    }
}

/// How a response frame affects its request's lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// Final frame; no results are carried.
    TerminalSuccessEmpty,
    /// Final frame carrying a result fragment.
    TerminalSuccessWithData,
    /// Intermediate frame; more frames follow.
    PartialSuccess,
    /// The server requests credentials before continuing.
    AuthChallenge,
    /// The attempt failed but may be resubmitted.
    RetryableError,
    /// The request failed and must be surfaced to the caller.
    FatalError,
}

impl ResponseKind {
    /// Whether frames of this kind finish a request successfully.
    #[must_use]
    pub fn is_terminal_success(self) -> bool {
        matches!(self, Self::TerminalSuccessEmpty | Self::TerminalSuccessWithData)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::TerminalSuccessEmpty => "terminal_empty",
            Self::TerminalSuccessWithData => "terminal_data",
            Self::PartialSuccess => "partial",
            Self::AuthChallenge => "challenge",
            Self::RetryableError => "retryable",
            Self::FatalError => "fatal",
        }
    }
}

/// Result of classifying a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    /// The decoded status code.
    pub status: ResponseStatusCode,
    /// Lifecycle effect of the frame.
    pub kind: ResponseKind,
    /// Mirrors [`ResponseStatusCode::indicates_error`].
    pub is_error: bool,
}

/// Classify a status code without considering any payload.
///
/// `200` classifies as [`ResponseKind::TerminalSuccessWithData`]; use
/// [`classify_frame`] when the payload presence is known.
///
/// # Errors
///
/// Returns [`UnknownStatusCode`] for codes outside the defined set.
///
/// # Examples
///
/// ```
/// use graphwire::status::{ResponseKind, classify};
///
/// let c = classify(206).expect("206 is defined");
/// assert_eq!(c.kind, ResponseKind::PartialSuccess);
/// assert!(!c.is_error);
/// assert!(classify(418).is_err());
/// ```
pub fn classify(code: u16) -> Result<Classification, UnknownStatusCode> {
    classify_frame(code, true)
}

/// Classify a status code, using `has_payload` to split a `200` into its
/// empty and data-carrying variants.
///
/// # Errors
///
/// Returns [`UnknownStatusCode`] for codes outside the defined set.
pub fn classify_frame(code: u16, has_payload: bool) -> Result<Classification, UnknownStatusCode> {
    use ResponseStatusCode as S;

    let status = S::try_from(code)?;
    let kind = match status {
        S::Success if has_payload => ResponseKind::TerminalSuccessWithData,
        S::Success | S::NoContent => ResponseKind::TerminalSuccessEmpty,
        S::PartialContent => ResponseKind::PartialSuccess,
        S::Authenticate => ResponseKind::AuthChallenge,
        S::TooManyRequests | S::ServerErrorTemporary => ResponseKind::RetryableError,
        S::Unauthorized
        | S::Forbidden
        | S::ClientSerializationError
        | S::MalformedRequest
        | S::InvalidRequestArguments
        | S::ServerError
        | S::ServerErrorFailStep
        | S::ServerEvaluationError
        | S::ServerTimeout
        | S::ServerSerializationError => ResponseKind::FatalError,
    };
    Ok(Classification {
        status,
        kind,
        is_error: status.indicates_error(),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(200, ResponseKind::TerminalSuccessWithData, false)]
    #[case(204, ResponseKind::TerminalSuccessEmpty, false)]
    #[case(206, ResponseKind::PartialSuccess, false)]
    #[case(401, ResponseKind::FatalError, true)]
    #[case(403, ResponseKind::FatalError, true)]
    #[case(407, ResponseKind::AuthChallenge, false)]
    #[case(429, ResponseKind::RetryableError, true)]
    #[case(497, ResponseKind::FatalError, true)]
    #[case(498, ResponseKind::FatalError, true)]
    #[case(499, ResponseKind::FatalError, true)]
    #[case(500, ResponseKind::FatalError, true)]
    #[case(595, ResponseKind::FatalError, true)]
    #[case(596, ResponseKind::RetryableError, true)]
    #[case(597, ResponseKind::FatalError, true)]
    #[case(598, ResponseKind::FatalError, true)]
    #[case(599, ResponseKind::FatalError, true)]
    fn classifies_defined_codes(
        #[case] code: u16,
        #[case] kind: ResponseKind,
        #[case] is_error: bool,
    ) {
        let c = classify(code).expect("defined code");
        assert_eq!(c.kind, kind);
        assert_eq!(c.is_error, is_error);
        assert_eq!(c.status.as_u16(), code);
    }

    #[rstest]
    #[case(0)]
    #[case(100)]
    #[case(201)]
    #[case(404)]
    #[case(501)]
    #[case(600)]
    #[case(u16::MAX)]
    fn rejects_unknown_codes(#[case] code: u16) {
        assert_eq!(classify(code), Err(UnknownStatusCode(code)));
    }

    #[test]
    fn success_without_payload_is_empty() {
        let c = classify_frame(200, false).expect("defined code");
        assert_eq!(c.kind, ResponseKind::TerminalSuccessEmpty);
    }

    #[test]
    fn no_content_ignores_payload_presence() {
        let c = classify_frame(204, true).expect("defined code");
        assert_eq!(c.kind, ResponseKind::TerminalSuccessEmpty);
    }

    #[test]
    fn all_lists_every_code_once_in_order() {
        let codes: Vec<u16> = ResponseStatusCode::ALL.iter().map(|s| s.as_u16()).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(codes, sorted);
    }

    #[test]
    fn display_includes_value_and_name() {
        assert_eq!(
            ResponseStatusCode::ServerErrorTemporary.to_string(),
            "596 (ServerErrorTemporary)"
        );
    }
}
