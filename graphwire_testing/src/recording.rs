//! Transport that records outbound frames.

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use graphwire::{OutboundFrame, Transport};
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    sent: Mutex<Vec<OutboundFrame>>,
    notify: Notify,
    failing: AtomicBool,
}

/// Cloneable transport capturing every frame sent through it.
#[derive(Clone, Default)]
pub struct RecordingTransport(Arc<Inner>);

impl RecordingTransport {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Share this recorder as a driver transport.
    #[must_use]
    pub fn into_transport(self) -> Arc<dyn Transport> { Arc::new(self) }

    /// Make subsequent sends fail with `BrokenPipe` (or succeed again).
    pub fn fail_sends(&self, failing: bool) { self.0.failing.store(failing, Ordering::SeqCst); }

    /// Snapshot of every frame sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundFrame> { self.lock().clone() }

    /// Wait until at least `count` frames have been sent and return them.
    pub async fn wait_for(&self, count: usize) -> Vec<OutboundFrame> {
        loop {
            let notified = self.0.notify.notified();
            {
                let sent = self.lock();
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutboundFrame>> {
        self.0
            .sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, frame: OutboundFrame) -> io::Result<()> {
        if self.0.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport closed"));
        }
        self.lock().push(frame);
        self.0.notify.notify_waiters();
        Ok(())
    }
}
