//! Scripted server speaking the bundled frame codec.

use futures::{SinkExt, StreamExt};
use graphwire::{OutboundFrame, ResponseFrame, codec::FrameCodec};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};
use tokio_util::codec::{FramedRead, FramedWrite};

/// Serve `io`, answering each inbound frame with the frames `script`
/// returns for it, in order.
///
/// The task ends when the client closes the stream, a frame fails to decode,
/// or a write fails.
pub fn spawn_scripted_server<T, F>(io: T, mut script: F) -> JoinHandle<()>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
    F: FnMut(&OutboundFrame) -> Vec<ResponseFrame> + Send + 'static,
{
    tokio::spawn(async move {
        let (read, write) = tokio::io::split(io);
        let mut inbound = FramedRead::new(read, FrameCodec::<OutboundFrame>::default());
        let mut outbound = FramedWrite::new(write, FrameCodec::<ResponseFrame>::default());
        while let Some(Ok(frame)) = inbound.next().await {
            for response in script(&frame) {
                if outbound.send(response).await.is_err() {
                    return;
                }
            }
        }
    })
}
