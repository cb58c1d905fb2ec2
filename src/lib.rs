#![doc(html_root_url = "https://docs.rs/graphwire/latest")]
//! Public API for the `graphwire` library.
//!
//! This crate correlates responses with requests on a multiplexed graph
//! server connection. Each response frame carries a status code; the
//! [`dispatch`] state machine uses [`status::classify`] to decide whether a
//! request's response stream continues, completes, is retried under
//! back-off, answers an authentication challenge, or fails.

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod pending;
pub mod retry;
pub mod status;
pub mod transport;

pub use auth::{AuthChallengeHandler, CredentialsProvider, StaticCredentials};
pub use client::{Driver, DriverBuilder};
pub use config::DriverConfig;
pub use dispatch::{AnomalyHook, ProtocolAnomaly, ResponseDispatcher};
pub use error::{ErrorCategory, RequestError, SubmitError, TableError};
pub use frame::{OutboundFrame, OutboundKind, RequestId, ResponseFrame};
pub use pending::{PendingRequestTable, RequestState, ResponseHandle};
pub use retry::{BackoffConfig, Decision, RetryCoordinator, RetryPolicy};
pub use status::{Classification, ResponseKind, ResponseStatusCode, UnknownStatusCode, classify};
pub use transport::{ChannelTransport, FramedTransport, Transport, framed_connection};
