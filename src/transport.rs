//! Outbound send primitive and adapters.
//!
//! [`Transport`] is the narrow interface the driver uses to submit requests,
//! resubmit them after retryable failures, and answer authentication
//! challenges. Connection establishment and reconnection live outside this
//! crate; [`framed_connection`] attaches the bundled [`FrameCodec`] to an
//! already-connected byte stream.

use std::{future, io};

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use log::warn;
use tokio::{
    io::{AsyncRead, AsyncWrite, WriteHalf},
    sync::{Mutex, mpsc},
};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::{
    codec::{CodecError, FrameCodec},
    frame::{OutboundFrame, ResponseFrame},
};

/// Sends frames to the server on behalf of the driver.
///
/// Implementations must be safe to call concurrently; the driver issues
/// sends from background tasks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one frame.
    async fn send(&self, frame: OutboundFrame) -> io::Result<()>;
}

/// Transport forwarding frames into a Tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelTransport(mpsc::Sender<OutboundFrame>);

impl ChannelTransport {
    /// Create a transport and the receiver observing its frames.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self(tx), rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: OutboundFrame) -> io::Result<()> {
        self.0
            .send(frame)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "outbound channel closed"))
    }
}

/// Transport writing length-delimited frames to a byte stream.
#[derive(Debug)]
pub struct FramedTransport<W> {
    sink: Mutex<FramedWrite<W, FrameCodec<OutboundFrame>>>,
}

impl<W: AsyncWrite + Unpin> FramedTransport<W> {
    /// Wrap the write half of a connection.
    #[must_use]
    pub fn new(write: W) -> Self {
        Self {
            sink: Mutex::new(FramedWrite::new(write, FrameCodec::default())),
        }
    }
}

#[async_trait]
impl<W> Transport for FramedTransport<W>
where
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn send(&self, frame: OutboundFrame) -> io::Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(frame).await.map_err(|e| match e {
            CodecError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })
    }
}

/// Split `io` into a [`FramedTransport`] and the ordered stream of response
/// frames read from it.
///
/// The response stream ends at EOF or at the first undecodable frame; the
/// latter is logged because the framing can no longer be trusted.
pub fn framed_connection<T>(
    io: T,
) -> (
    FramedTransport<WriteHalf<T>>,
    impl Stream<Item = ResponseFrame> + Send + Unpin,
)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read, write) = tokio::io::split(io);
    let frames = FramedRead::new(read, FrameCodec::<ResponseFrame>::default())
        .take_while(|item| {
            if let Err(e) = item {
                warn!("closing response stream after codec error: {e}");
            }
            future::ready(item.is_ok())
        })
        .filter_map(|item| future::ready(item.ok()));
    (FramedTransport::new(write), Box::pin(frames))
}
