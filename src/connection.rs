//! Wires the read half, write half, and liveness scheduler of one accepted or
//! connected socket into a single `Connection`, the shared construction path
//! behind both [`crate::server`] and [`crate::client`].

use std::sync::Arc;

use tokio::io::split;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use crate::compression::{build_codec_pair, DecompressionLimit};
use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::extensions::Extensions;
use crate::frame::Role;
use crate::liveness::Liveness;
use crate::read::{ReadSignal, ReadStream};
use crate::split::{WSReader, WSWriter};
use crate::stream::SocketFlowStream;
use crate::write::Writer;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// An established WebSocket connection, already past the HTTP upgrade.
/// `split()` hands the reader and writer halves to the caller; the read loop
/// and liveness scheduler run as background tasks from that point on.
pub struct Connection {
    read_rx: mpsc::Receiver<Result<ReadSignal, Error>>,
    writer: WSWriter,
    liveness: Arc<Liveness>,
}

impl Connection {
    /// Builds a `Connection` from an already-upgraded socket. `is_server`
    /// picks the masking direction and which side of the negotiated
    /// permessage-deflate parameters this end compresses/decompresses with.
    pub fn new(
        stream: SocketFlowStream,
        role: Role,
        config: WebSocketConfig,
        negotiated_extensions: Option<Extensions>,
    ) -> Self {
        let (read_half, write_half) = split(stream);
        let is_server = role == Role::Server;

        let permessage_deflate = config.permessage_deflate.is_some() && negotiated_extensions.is_some();
        let (compressor, inflater) = match (&negotiated_extensions, permessage_deflate) {
            (Some(extensions), true) => {
                let (compressor, inflater) =
                    build_codec_pair(extensions, is_server, DecompressionLimit::None);
                (Some(compressor), Some(inflater))
            }
            _ => (None, None),
        };

        let writer = Arc::new(Mutex::new(Writer::new(
            write_half,
            role,
            config.max_frame_size,
            permessage_deflate,
        )));

        let liveness = Liveness::new();
        let (read_tx, read_rx) = mpsc::channel::<Result<ReadSignal, Error>>(EVENT_CHANNEL_CAPACITY);

        let mut read_stream = ReadStream::new(
            read_half,
            role,
            &config,
            inflater,
            read_tx,
            writer.clone(),
            liveness.clone(),
        );

        let (force_close_tx, force_close_rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::select! {
                result = read_stream.poll_messages() => {
                    if let Err(err) = result {
                        log::warn!("read loop ended with error: {err}");
                    }
                }
                _ = force_close_rx => {
                    log::warn!("liveness scheduler forced connection closed");
                }
            }
        });

        if let Some(interval) = config.ping_interval {
            liveness.clone().spawn_scheduler(writer.clone(), interval, force_close_tx);
        }

        let wswriter_compressor = compressor.map(|c| Arc::new(Mutex::new(c)));
        let writer_handle = WSWriter::new(writer, config, wswriter_compressor);

        Self {
            read_rx,
            writer: writer_handle,
            liveness,
        }
    }

    /// Splits into a message-only reader stream and a sendable writer handle.
    /// Ping/pong control signals are consumed silently by the reader; use
    /// [`Connection::into_signals`] when those need to be observed.
    pub fn split(self) -> (WSReader, WSWriter) {
        let reader = WSReader::new(ReceiverStream::new(self.read_rx));
        (reader, self.writer)
    }

    /// Splits into the raw signal stream (messages and ping/pong
    /// notifications) and a sendable writer handle, for callers such as
    /// [`crate::server`] that surface every signal as an `Event`.
    pub fn into_signals(self) -> (ReceiverStream<Result<ReadSignal, Error>>, WSWriter) {
        (ReceiverStream::new(self.read_rx), self.writer)
    }

    pub fn is_closed(&self) -> bool {
        self.liveness.is_closed()
    }

    pub fn close_code(&self) -> u16 {
        self.liveness.close_code()
    }
}

/// Server-side: runs the accept handshake over `stream` and builds the
/// resulting `Connection`.
pub async fn accept_async_with_config(
    mut stream: SocketFlowStream,
    config: WebSocketConfig,
) -> Result<Connection, Error> {
    let accepted = crate::handshake::accept(&mut stream, &config).await?;
    Ok(Connection::new(stream, Role::Server, config, accepted.extensions))
}

#[cfg(test)]
mod tests {
    // `Connection::new` needs a live socket pair and background tasks, so it
    // is exercised by the loopback integration tests instead of here.
}
