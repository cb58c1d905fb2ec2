//! Shorthand constructors for response frames.

use bytes::Bytes;
use graphwire::{RequestId, ResponseFrame};

/// A frame with `code` and no payload.
#[must_use]
pub fn status(id: RequestId, code: u16) -> ResponseFrame { ResponseFrame::new(id, code) }

/// A `206 Partial Content` frame carrying `payload`.
#[must_use]
pub fn partial(id: RequestId, payload: impl Into<Bytes>) -> ResponseFrame {
    ResponseFrame::new(id, 206).with_payload(payload)
}

/// A final `200 Success` frame carrying `payload`.
#[must_use]
pub fn success(id: RequestId, payload: impl Into<Bytes>) -> ResponseFrame {
    ResponseFrame::new(id, 200).with_payload(payload)
}

/// A final `204 No Content` frame.
#[must_use]
pub fn no_content(id: RequestId) -> ResponseFrame { ResponseFrame::new(id, 204) }

/// A frame with error `code` and a server message.
#[must_use]
pub fn error(id: RequestId, code: u16, message: &str) -> ResponseFrame {
    ResponseFrame::new(id, code).with_message(message)
}
