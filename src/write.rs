//! The write half of a connection: serializes frames through the codec and
//! flushes them to the transport, one frame at a time under the caller's lock.

use bytes::BytesMut;
use tokio::io::{AsyncWriteExt, WriteHalf};

use crate::codec::FrameCodec;
use crate::error::Error;
use crate::frame::{Frame, Role};
use crate::stream::SocketFlowStream;

pub struct Writer {
    write_half: WriteHalf<SocketFlowStream>,
    codec: FrameCodec,
    scratch: BytesMut,
}

impl Writer {
    pub fn new(write_half: WriteHalf<SocketFlowStream>, role: Role, max_frame_size: usize, permessage_deflate: bool) -> Self {
        Self {
            write_half,
            codec: FrameCodec::new(role, max_frame_size, permessage_deflate),
            scratch: BytesMut::new(),
        }
    }

    /// Encodes `frame` and writes it to the socket, flushing so the peer sees
    /// it without waiting for a future write to fill a larger buffer.
    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), Error> {
        self.scratch.clear();
        self.codec.encode(&frame, &mut self.scratch)?;
        self.write_half.write_all(&self.scratch).await?;
        self.write_half.flush().await?;
        Ok(())
    }

    pub async fn write_frames(&mut self, frames: Vec<Frame>) -> Result<(), Error> {
        for frame in frames {
            self.write_frame(frame).await?;
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.write_half.shutdown().await?;
        Ok(())
    }
}
