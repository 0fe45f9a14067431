use std::io;
use std::string::FromUtf8Error;

use httparse::Error as HttpParseError;
use pki_types::InvalidDnsNameError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio::time::error::Elapsed;
use url::ParseError;

use crate::event::Event;

/// Close codes defined by RFC 6455 §7.4 that this crate sends or reports.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const NO_STATUS: u16 = 1005;
    pub const ABNORMAL: u16 = 1006;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

#[derive(Error, Debug)]
pub enum Error {
    // Sender / Receiver Errors
    #[error("{source}")]
    SendError {
        #[from]
        source: SendError<Event>,
    },

    #[error("channel communication error")]
    CommunicationError,

    // General Errors
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO Error happened: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    // Handshake Errors
    #[error("Invalid handshake request method and version")]
    InvalidHTTPHandshake,

    #[error("Connection: Upgrade header missing in the request")]
    NoConnectionHeaderPresent,

    #[error("Upgrade: websocket header missing in the request")]
    NoUpgradeHeaderPresent,

    #[error("Host header missing in the request")]
    NoHostHeaderPresent,

    #[error("Couldn't find Sec-WebSocket-Key header in the request")]
    NoSecWebsocketKey,

    #[error("Server didn't upgrade the connection")]
    NoUpgrade,

    #[error("server responded with an unexpected HTTP status: {0}")]
    InvalidResponseStatus(String),

    #[error("Server didn't send a valid Sec-WebSocket-Accept key")]
    InvalidAcceptKey,

    // Framing Errors
    #[error("RSV bit set without a negotiated extension enabling it")]
    RSVNotZero,

    #[error("frame mask bit does not match the direction expected for this role")]
    InvalidMaskDirection,

    #[error("Control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("Control frame with invalid payload size, can't be greater than 125")]
    ControlFramePayloadSize,

    #[error("fragment_size: `{0}` can't be greater than max_frame_size: `{1}`")]
    CustomFragmentSizeExceeded(usize, usize),

    #[error("Max frame size reached")]
    MaxFrameSize,

    #[error("Max message size reached")]
    MaxMessageSize,

    #[error("payload length field's high bit must be zero")]
    InvalidPayloadLength,

    #[error("non-final fragment smaller than the configured minimum")]
    FragmentTooSmall,

    // Fragmentation Errors
    #[error("Invalid frame while there is a fragmented message in progress")]
    InvalidFrameFragmentation,

    #[error("Incoming fragmented message but there is one already in progress")]
    FragmentedInProgress,

    #[error("Invalid continuation frame: no fragmented message to continue")]
    InvalidContinuationFrame,

    #[error("Invalid Opcode")]
    InvalidOpcode,

    #[error("text frame payload is not valid UTF-8")]
    InvalidUtf8,

    // HTTP Errors
    #[error("{source}")]
    URLParseError {
        #[from]
        source: ParseError,
    },

    #[error("Invalid scheme in WebSocket URL")]
    InvalidSchemeURL,

    #[error("URL has no host")]
    URLNoHost,

    #[error("URL has no port")]
    URLNoPort,

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: HttpParseError,
    },

    #[error("Incomplete HTTP request")]
    IncompleteHTTPRequest,

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    // Domain addr parsing error
    #[error("{source}")]
    DomainError {
        #[from]
        source: InvalidDnsNameError,
    },

    #[error("use_tls = `{0}` argument does not match the passed URL scheme: `{1}`")]
    SchemeAgainstTlsConfig(bool, String),

    // Compression / Decompression Errors
    #[error("max_window_bits should be a value between 9 and 15")]
    InvalidMaxWindowBits,

    #[error("permessage-deflate failure: {0}")]
    CompressionError(String),

    #[error("decompressed payload exceeded the configured decompression limit")]
    DecompressionLimitExceeded,

    #[error("unknown permessage-deflate extension parameter: {0}")]
    UnknownExtensionParameter(String),

    // Proxy errors
    #[error("HTTP proxy CONNECT failed with status: {0}")]
    ProxyConnectFailed(String),

    // TLS errors
    #[error("TLS configuration error: {0}")]
    TlsConfigError(String),

    // Lifecycle errors
    #[error("event loop group was already shut down")]
    AlreadyShutDown,

    #[error("connection is already closed")]
    AlreadyClosed,
}

impl Error {
    /// The wire close code this error should be reported/closed with, per the
    /// error taxonomy: protocol violations close with 1002, size violations with
    /// 1009, invalid UTF-8 with 1007, and everything else falls back to 1002 or
    /// 1006 depending on whether it originated from the transport.
    pub fn close_code(&self) -> u16 {
        match self {
            Error::MaxFrameSize | Error::MaxMessageSize | Error::DecompressionLimitExceeded => {
                close_code::MESSAGE_TOO_BIG
            }
            Error::InvalidUtf8 | Error::FromUtf8Error { .. } => close_code::INVALID_PAYLOAD,
            Error::IOError { .. } | Error::Timeout { .. } => close_code::ABNORMAL,
            _ => close_code::PROTOCOL_ERROR,
        }
    }
}
