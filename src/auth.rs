//! Handling of server authentication challenges.
//!
//! When the server answers a request with `407 Authenticate`, the client
//! replies with a credentials frame carrying the same request id and keeps
//! waiting for the original response. A second challenge on the same request
//! means the credentials were rejected; the request then fails with
//! [`RequestError::AuthenticationFailed`] instead of looping.

use std::{fmt, sync::Arc};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    error::{RequestError, TableError},
    frame::{OutboundFrame, RequestId},
    pending::PendingRequestTable,
};

/// Source of the credentials sent in reply to a challenge.
pub trait CredentialsProvider: Send + Sync {
    /// Build the credentials payload for the challenged request.
    fn credentials(&self, request_id: RequestId) -> Bytes;
}

/// Username and password sent as a SASL `PLAIN` message.
#[derive(Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    /// Create credentials for `username` authenticating with `password`.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl CredentialsProvider for StaticCredentials {
    fn credentials(&self, _request_id: RequestId) -> Bytes {
        // authzid NUL authcid NUL passwd, with an empty authzid
        let mut buf = BytesMut::with_capacity(self.username.len() + self.password.len() + 2);
        buf.put_u8(0);
        buf.put_slice(self.username.as_bytes());
        buf.put_u8(0);
        buf.put_slice(self.password.as_bytes());
        buf.freeze()
    }
}

/// What the dispatcher must do after a challenge.
#[derive(Debug, PartialEq, Eq)]
pub enum ChallengeAction {
    /// Send this credentials frame; the request stays pending.
    Respond(OutboundFrame),
    /// The request has been failed with `AuthenticationFailed`.
    Rejected,
}

/// Replies to authentication challenges, at most once per request.
#[derive(Clone, Default)]
pub struct AuthChallengeHandler {
    credentials: Option<Arc<dyn CredentialsProvider>>,
}

impl fmt::Debug for AuthChallengeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthChallengeHandler")
            .field("has_credentials", &self.credentials.is_some())
            .finish()
    }
}

impl AuthChallengeHandler {
    /// Create a handler answering challenges with `credentials`.
    ///
    /// Without credentials every challenge fails its request.
    #[must_use]
    pub fn new(credentials: Option<Arc<dyn CredentialsProvider>>) -> Self { Self { credentials } }

    /// Handle a challenge received on `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::NotFound`] if the request is not pending.
    pub fn on_challenge(
        &self,
        table: &PendingRequestTable,
        request_id: RequestId,
        status: u16,
        message: &str,
    ) -> Result<ChallengeAction, TableError> {
        let first = table.with_entry(request_id, |entry| {
            if entry.challenged() || self.credentials.is_none() {
                false
            } else {
                entry.mark_challenged();
                true
            }
        })?;

        match (&self.credentials, first) {
            (Some(credentials), true) => Ok(ChallengeAction::Respond(OutboundFrame::authentication(
                request_id,
                credentials.credentials(request_id),
            ))),
            (None, _) => {
                table.fail(request_id, RequestError::AuthenticationFailed {
                    status,
                    message: "server requested authentication but no credentials are configured"
                        .into(),
                })?;
                Ok(ChallengeAction::Rejected)
            }
            (Some(_), false) => {
                table.fail(request_id, RequestError::AuthenticationFailed {
                    status,
                    message: message.to_owned(),
                })?;
                Ok(ChallengeAction::Rejected)
            }
        }
    }
}
