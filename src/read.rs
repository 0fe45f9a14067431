//! The read half of a connection: fills a buffer from the transport, decodes
//! frames through the codec, reassembles fragmented messages, and emits
//! `Message`s (or handles control frames) to the owner.

use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, warn};
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;

use crate::aggregator::{Aggregated, Aggregator, AggregatorLimits};
use crate::codec::{Decoded, FrameCodec};
use crate::compression::Inflater;
use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::frame::{Frame, OpCode, Role};
use crate::liveness::Liveness;
use crate::message::Message;
use crate::stream::SocketFlowStream;
use crate::write::Writer;

/// What the read loop hands back to whoever consumes the channel: a decoded
/// message, or a control-frame notification the owner may want to surface
/// (the engine already auto-replies to pings and clears liveness on pongs —
/// this is purely informational).
pub enum ReadSignal {
    Message(Message),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

pub struct ReadStream {
    read_half: ReadHalf<SocketFlowStream>,
    buf: BytesMut,
    codec: FrameCodec,
    aggregator: Aggregator,
    inflater: Option<Inflater>,
    max_message_size: Option<usize>,
    read_tx: Sender<Result<ReadSignal, Error>>,
    writer: Arc<Mutex<Writer>>,
    liveness: Arc<Liveness>,
}

impl ReadStream {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        read_half: ReadHalf<SocketFlowStream>,
        role: Role,
        config: &WebSocketConfig,
        inflater: Option<Inflater>,
        read_tx: Sender<Result<ReadSignal, Error>>,
        writer: Arc<Mutex<Writer>>,
        liveness: Arc<Liveness>,
    ) -> Self {
        let permessage_deflate = config.permessage_deflate.is_some();
        Self {
            read_half,
            buf: BytesMut::with_capacity(4096),
            codec: FrameCodec::new(role, config.max_frame_size, permessage_deflate),
            aggregator: Aggregator::new(AggregatorLimits::from(&config.aggregator_limits)),
            inflater,
            max_message_size: config.max_message_size,
            read_tx,
            writer,
            liveness,
        }
    }

    /// Drives the read loop until the peer closes the connection, a protocol
    /// error occurs, or the owner drops the message channel's other half.
    /// A protocol error is reported to the channel as the final item before
    /// this returns, mirroring how a disconnect is reported by the channel
    /// simply closing.
    pub async fn poll_messages(&mut self) -> Result<(), Error> {
        if let Err(err) = self.run().await {
            let _ = self.read_tx.send(Err(err)).await;
        }
        Ok(())
    }

    async fn run(&mut self) -> Result<(), Error> {
        loop {
            let frame = match self.next_frame().await? {
                Some(frame) => frame,
                None => {
                    self.liveness.mark_closed(crate::error::close_code::ABNORMAL);
                    return Ok(());
                }
            };

            if frame.opcode.is_control() {
                frame.validate_control()?;
                match frame.opcode {
                    OpCode::Close => {
                        self.handle_close(frame).await?;
                        return Ok(());
                    }
                    OpCode::Ping => {
                        self.writer
                            .lock()
                            .await
                            .write_frame(Frame::control(OpCode::Pong, frame.payload.clone()))
                            .await?;
                        if self.read_tx.send(Ok(ReadSignal::Ping(frame.payload))).await.is_err() {
                            return Ok(());
                        }
                    }
                    OpCode::Pong => {
                        self.liveness.record_pong();
                        if self.read_tx.send(Ok(ReadSignal::Pong(frame.payload))).await.is_err() {
                            return Ok(());
                        }
                    }
                    _ => unreachable!(),
                }
                continue;
            }

            match self.aggregator.feed(frame) {
                Ok(Aggregated::Pending) => {}
                Ok(Aggregated::Complete(reassembled)) => {
                    if let Some(max) = self.max_message_size {
                        if reassembled.payload.len() > max && !reassembled.compressed {
                            return Err(Error::MaxMessageSize);
                        }
                    }

                    let payload = if reassembled.compressed {
                        let inflater = self
                            .inflater
                            .as_mut()
                            .ok_or_else(|| Error::CompressionError("no extension negotiated".into()))?;
                        let decompressed = inflater.decompress(&reassembled.payload)?;
                        if let Some(max) = self.max_message_size {
                            if decompressed.len() > max {
                                return Err(Error::MaxMessageSize);
                            }
                        }
                        decompressed
                    } else {
                        reassembled.payload
                    };

                    let message = Message::from_parts(reassembled.opcode, payload)?;
                    if self.read_tx.send(Ok(ReadSignal::Message(message))).await.is_err() {
                        debug!("message receiver dropped, stopping read loop");
                        return Ok(());
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Pulls bytes off the socket until the codec can produce a frame, or the
    /// peer closes the connection cleanly between frames (`Ok(None)`).
    async fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            match self.codec.decode(&mut self.buf)? {
                Decoded::Frame(frame) => return Ok(Some(frame)),
                Decoded::NeedMore(hint) => {
                    self.buf.reserve(hint);
                    let n = self.read_half.read_buf(&mut self.buf).await?;
                    if n == 0 {
                        if self.buf.is_empty() {
                            return Ok(None);
                        }
                        return Err(Error::IOError {
                            source: std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
                        });
                    }
                }
            }
        }
    }

    async fn handle_close(&mut self, frame: Frame) -> Result<(), Error> {
        let code = frame.close_status_code().unwrap_or(crate::error::close_code::NO_STATUS);
        let reason = frame.close_reason();
        if code != crate::error::close_code::NO_STATUS {
            debug!("peer closed with code {code}: {reason}");
        }
        self.liveness.mark_closed(code);

        // 1005/1006 are synthetic and must never appear on the wire (RFC 6455 §7.4.1).
        let wire_code = match code {
            crate::error::close_code::NO_STATUS | crate::error::close_code::ABNORMAL => {
                crate::error::close_code::NORMAL
            }
            code => code,
        };

        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.write_frame(Frame::close(wire_code, "")).await {
            warn!("failed echoing close frame: {err}");
        }
        Ok(())
    }
}
