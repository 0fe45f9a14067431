//! permessage-deflate payload compression/decompression (RFC 7692 §7).
//!
//! A compressed frame's payload is raw DEFLATE data with the trailing
//! `00 00 FF FF` sync-flush marker stripped on the wire; the receiver appends
//! it back before inflating. Context takeover is independent per direction:
//! a `..._no_context_takeover` parameter resets that side's window after every
//! message instead of carrying dictionary state forward.

use bytes::BytesMut;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::Error;
use crate::extensions::Extensions;

const SYNC_FLUSH_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

fn buffer_size_for(payload_size: usize) -> usize {
    if payload_size <= 4096 {
        4096
    } else if payload_size <= 65536 {
        16384
    } else {
        65536
    }
}

/// Bounds how large a decompressed message may grow, guarding against a
/// decompression bomb carried over a small compressed frame.
#[derive(Debug, Clone, Copy)]
pub enum DecompressionLimit {
    /// No limit beyond the frame/message size limits already enforced.
    None,
    /// Absolute cap on the decompressed size, in bytes.
    Absolute(usize),
    /// Cap expressed as a multiple of the compressed input size (e.g. `40.0`
    /// permits decompressed output up to 40x the wire size).
    Ratio(f64),
}

impl DecompressionLimit {
    fn check(&self, compressed_len: usize, decompressed_len: usize) -> Result<(), Error> {
        let exceeded = match self {
            DecompressionLimit::None => false,
            DecompressionLimit::Absolute(max) => decompressed_len > *max,
            DecompressionLimit::Ratio(ratio) => {
                decompressed_len as f64 > compressed_len as f64 * ratio
            }
        };
        if exceeded {
            Err(Error::DecompressionLimitExceeded)
        } else {
            Ok(())
        }
    }
}

pub struct Compressor {
    compressor: Compress,
    no_context_takeover: bool,
}

impl Compressor {
    pub fn new(window_bits: u8, no_context_takeover: bool) -> Self {
        Self {
            compressor: Compress::new_with_window_bits(Compression::default(), false, window_bits),
            no_context_takeover,
        }
    }

    /// Compresses `payload`, returning the DEFLATE stream with the trailing
    /// sync-flush marker already stripped, as RFC 7692 §7.2.1 requires.
    pub fn compress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let buffer_size = buffer_size_for(payload.len());
        let mut output = Vec::with_capacity(buffer_size);

        self.compressor
            .compress_vec(payload, &mut output, FlushCompress::Sync)
            .map_err(|e| Error::CompressionError(e.to_string()))?;

        debug_assert!(
            output.ends_with(&SYNC_FLUSH_TRAILER),
            "flate2's Sync flush must end in the 00 00 FF FF marker"
        );
        output.truncate(output.len().saturating_sub(SYNC_FLUSH_TRAILER.len()));

        if self.no_context_takeover {
            self.compressor.reset();
        }

        Ok(output)
    }
}

pub struct Inflater {
    decompressor: Decompress,
    no_context_takeover: bool,
    limit: DecompressionLimit,
}

impl Inflater {
    pub fn new(window_bits: u8, no_context_takeover: bool, limit: DecompressionLimit) -> Self {
        Self {
            decompressor: Decompress::new_with_window_bits(false, window_bits),
            no_context_takeover,
            limit,
        }
    }

    /// Appends the sync-flush trailer back onto `payload` and inflates it,
    /// enforcing the configured decompression limit as output accumulates.
    pub fn decompress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        if self.no_context_takeover {
            self.decompressor.reset(false);
        }

        let mut input = BytesMut::with_capacity(payload.len() + SYNC_FLUSH_TRAILER.len());
        input.extend_from_slice(payload);
        input.extend_from_slice(&SYNC_FLUSH_TRAILER);

        let buffer_size = buffer_size_for(payload.len());
        let mut output = Vec::with_capacity(buffer_size);
        let mut chunk = vec![0u8; buffer_size];

        let before_in = self.decompressor.total_in();
        let before_out = self.decompressor.total_out() as usize;
        loop {
            let consumed_so_far = (self.decompressor.total_in() - before_in) as usize;
            if consumed_so_far >= input.len() {
                break;
            }
            let remaining = &input[consumed_so_far..];

            let status = self
                .decompressor
                .decompress(remaining, &mut chunk, FlushDecompress::Sync)
                .map_err(|e| Error::CompressionError(e.to_string()))?;

            let produced = self.decompressor.total_out() as usize - before_out - output.len();
            output.extend_from_slice(&chunk[..produced]);
            self.limit.check(payload.len(), output.len())?;

            if status == Status::StreamEnd {
                break;
            }
        }

        Ok(output)
    }
}

/// Builds the compressor/inflater pair for a connection from the negotiated
/// extension parameters, picking the window bits and context-takeover
/// direction that apply to this side of the connection.
pub fn build_codec_pair(
    extensions: &Extensions,
    is_server: bool,
    limit: DecompressionLimit,
) -> (Compressor, Inflater) {
    let (send_window, send_no_takeover, recv_window, recv_no_takeover) = if is_server {
        (
            extensions.server_max_window_bits.unwrap_or(15),
            extensions.server_no_context_takeover.unwrap_or(false),
            extensions.client_max_window_bits.unwrap_or(15),
            extensions.client_no_context_takeover.unwrap_or(false),
        )
    } else {
        (
            extensions.client_max_window_bits.unwrap_or(15),
            extensions.client_no_context_takeover.unwrap_or(false),
            extensions.server_max_window_bits.unwrap_or(15),
            extensions.server_no_context_takeover.unwrap_or(false),
        )
    };

    (
        Compressor::new(send_window, send_no_takeover),
        Inflater::new(recv_window, recv_no_takeover, limit),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_then_decompress_roundtrips() {
        let mut compressor = Compressor::new(15, false);
        let mut inflater = Inflater::new(15, false, DecompressionLimit::None);

        let original = b"Hello! Vapor rules. Hello! Vapor rules. Hello! Vapor rules.".to_vec();
        let compressed = compressor.compress(&original).unwrap();
        let decompressed = inflater.decompress(&compressed).unwrap();

        assert_eq!(decompressed, original);
    }

    #[test]
    fn context_takeover_across_multiple_messages_roundtrips() {
        let mut compressor = Compressor::new(15, false);
        let mut inflater = Inflater::new(15, false, DecompressionLimit::None);

        for message in ["first message", "second message", "third message, a bit longer"] {
            let compressed = compressor.compress(message.as_bytes()).unwrap();
            let decompressed = inflater.decompress(&compressed).unwrap();
            assert_eq!(decompressed, message.as_bytes());
        }
    }

    #[test]
    fn no_context_takeover_resets_between_messages_and_still_roundtrips() {
        let mut compressor = Compressor::new(15, true);
        let mut inflater = Inflater::new(15, true, DecompressionLimit::None);

        for message in ["alpha", "beta", "gamma"] {
            let compressed = compressor.compress(message.as_bytes()).unwrap();
            let decompressed = inflater.decompress(&compressed).unwrap();
            assert_eq!(decompressed, message.as_bytes());
        }
    }

    #[test]
    fn absolute_decompression_limit_is_enforced() {
        let mut compressor = Compressor::new(15, false);
        let mut inflater = Inflater::new(15, false, DecompressionLimit::Absolute(4));

        let compressed = compressor.compress(b"this payload is longer than four bytes").unwrap();
        assert!(matches!(
            inflater.decompress(&compressed),
            Err(Error::DecompressionLimitExceeded)
        ));
    }

    #[test]
    fn ratio_decompression_limit_is_enforced() {
        let mut compressor = Compressor::new(15, false);
        let mut inflater = Inflater::new(15, false, DecompressionLimit::Ratio(0.01));

        let payload = vec![b'a'; 2000];
        let compressed = compressor.compress(&payload).unwrap();
        assert!(matches!(
            inflater.decompress(&compressed),
            Err(Error::DecompressionLimitExceeded)
        ));
    }

    #[test]
    fn build_codec_pair_picks_window_bits_by_role() {
        let extensions = Extensions {
            permessage_deflate: true,
            client_max_window_bits: Some(10),
            server_max_window_bits: Some(12),
            ..Default::default()
        };

        let (server_compressor, _) = build_codec_pair(&extensions, true, DecompressionLimit::None);
        let (client_compressor, _) = build_codec_pair(&extensions, false, DecompressionLimit::None);

        let mut server_compressor = server_compressor;
        let mut client_compressor = client_compressor;
        assert!(server_compressor.compress(b"data").is_ok());
        assert!(client_compressor.compress(b"data").is_ok());
    }
}
