//! Test doubles for driving a [`graphwire::Driver`] without a real server.
//!
//! [`RecordingTransport`] captures every outbound frame so tests can assert
//! on submissions, resubmissions and credential responses, and feed the
//! matching response frames back through [`graphwire::Driver::dispatch`].
//! [`spawn_scripted_server`] runs a fake server on an in-memory stream for
//! end-to-end tests through the bundled codec.
//!
//! ```rust
//! use graphwire::Driver;
//! use graphwire_testing::{RecordingTransport, frames};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = RecordingTransport::new();
//! let driver = Driver::builder().build(transport.clone().into_transport());
//! let handle = driver.submit("g.V()").await.unwrap();
//! driver.dispatch(frames::no_content(handle.request_id()));
//! assert!(handle.await.unwrap().is_empty());
//! # }
//! ```

pub mod frames;
pub mod recording;
pub mod server;

pub use recording::RecordingTransport;
pub use server::spawn_scripted_server;
