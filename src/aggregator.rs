//! Reassembles a sequence of data frames into a single logical payload,
//! enforcing the fragmentation policy: control frames never fragment, a
//! continuation frame must follow an in-progress data message, and a new
//! data frame must not start while one is already in progress.
//!
//! Reassembly yields raw bytes rather than a [`crate::message::Message`]
//! because a compressed message must be inflated before its opcode and
//! payload can be turned into text/binary — that decompression step lives
//! in the read loop, which owns the per-connection [`crate::compression::Inflater`].

use crate::error::Error;
use crate::frame::{Frame, OpCode};

#[derive(Clone)]
struct Pending {
    opcode: OpCode,
    payload: Vec<u8>,
    compressed: bool,
    frame_count: usize,
}

pub struct AggregatorLimits {
    pub min_non_final_fragment_size: usize,
    pub max_accumulated_frame_count: Option<usize>,
    pub max_accumulated_frame_size: Option<usize>,
}

impl Default for AggregatorLimits {
    fn default() -> Self {
        Self {
            min_non_final_fragment_size: 0,
            max_accumulated_frame_count: None,
            max_accumulated_frame_size: None,
        }
    }
}

/// A fully reassembled payload, still carrying whether it needs to be run
/// through the permessage-deflate inflater before becoming a `Message`.
pub struct Reassembled {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
    pub compressed: bool,
}

/// Outcome of feeding one data frame (never a control frame) to the aggregator.
pub enum Aggregated {
    /// The frame started or continued a fragmented message; nothing to deliver yet.
    Pending,
    /// A complete payload is ready for delivery.
    Complete(Reassembled),
}

pub struct Aggregator {
    pending: Option<Pending>,
    limits: AggregatorLimits,
}

impl Aggregator {
    pub fn new(limits: AggregatorLimits) -> Self {
        Self {
            pending: None,
            limits,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feeds a single text/binary/continuation frame through the reassembly
    /// table described by the fragmentation policy. Control frames must be
    /// handled by the caller before reaching this method. Per the "RSV1 only
    /// on the first fragment" convention, `frame.rsv1` is only consulted on
    /// the frame that starts a message (single-frame or first-of-fragments).
    pub fn feed(&mut self, frame: Frame) -> Result<Aggregated, Error> {
        debug_assert!(!frame.opcode.is_control());

        match frame.opcode {
            OpCode::Text | OpCode::Binary => {
                if self.pending.is_some() {
                    return Err(Error::InvalidFrameFragmentation);
                }

                if frame.fin {
                    self.check_frame_size(frame.payload.len())?;
                    Ok(Aggregated::Complete(Reassembled {
                        opcode: frame.opcode,
                        payload: frame.payload,
                        compressed: frame.rsv1,
                    }))
                } else {
                    self.check_non_final_size(frame.payload.len())?;
                    self.check_frame_size(frame.payload.len())?;
                    self.pending = Some(Pending {
                        opcode: frame.opcode,
                        payload: frame.payload,
                        compressed: frame.rsv1,
                        frame_count: 1,
                    });
                    Ok(Aggregated::Pending)
                }
            }
            OpCode::Continue => {
                let min_non_final_fragment_size = self.limits.min_non_final_fragment_size;
                let pending = self
                    .pending
                    .as_mut()
                    .ok_or(Error::InvalidContinuationFrame)?;

                if !frame.fin && frame.payload.len() < min_non_final_fragment_size {
                    return Err(Error::FragmentTooSmall);
                }

                pending.frame_count += 1;
                if let Some(max_frames) = self.limits.max_accumulated_frame_count {
                    if pending.frame_count > max_frames {
                        self.pending = None;
                        return Err(Error::MaxMessageSize);
                    }
                }

                pending.payload.extend_from_slice(&frame.payload);
                if let Some(max_size) = self.limits.max_accumulated_frame_size {
                    if pending.payload.len() > max_size {
                        self.pending = None;
                        return Err(Error::MaxMessageSize);
                    }
                }

                if frame.fin {
                    let pending = self.pending.take().expect("checked above");
                    Ok(Aggregated::Complete(Reassembled {
                        opcode: pending.opcode,
                        payload: pending.payload,
                        compressed: pending.compressed,
                    }))
                } else {
                    Ok(Aggregated::Pending)
                }
            }
            _ => unreachable!("control frames must be filtered out before calling feed"),
        }
    }

    fn check_non_final_size(&self, len: usize) -> Result<(), Error> {
        if len < self.limits.min_non_final_fragment_size {
            return Err(Error::FragmentTooSmall);
        }
        Ok(())
    }

    fn check_frame_size(&self, len: usize) -> Result<(), Error> {
        if let Some(max_size) = self.limits.max_accumulated_frame_size {
            if len > max_size {
                return Err(Error::MaxMessageSize);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(fin: bool, opcode: OpCode, payload: &[u8]) -> Frame {
        Frame::new(fin, opcode, payload.to_vec())
    }

    #[test]
    fn single_frame_message_is_delivered_immediately() {
        let mut agg = Aggregator::new(AggregatorLimits::default());
        match agg.feed(frame(true, OpCode::Text, b"hello")).unwrap() {
            Aggregated::Complete(reassembled) => {
                assert_eq!(reassembled.payload, b"hello");
                assert!(!reassembled.compressed);
            }
            _ => panic!("expected an immediate message"),
        }
        assert!(!agg.has_pending());
    }

    #[test]
    fn fragmented_message_reassembles_in_order() {
        let mut agg = Aggregator::new(AggregatorLimits::default());
        assert!(matches!(
            agg.feed(frame(false, OpCode::Text, b"Hel")).unwrap(),
            Aggregated::Pending
        ));
        assert!(agg.has_pending());
        assert!(matches!(
            agg.feed(frame(false, OpCode::Continue, b"lo! Vapor r")).unwrap(),
            Aggregated::Pending
        ));
        match agg.feed(frame(true, OpCode::Continue, b"ules")).unwrap() {
            Aggregated::Complete(reassembled) => {
                assert_eq!(reassembled.payload, b"Hello! Vapor rules");
            }
            _ => panic!("expected assembled message"),
        }
        assert!(!agg.has_pending());
    }

    #[test]
    fn compressed_flag_is_taken_from_the_first_fragment() {
        let mut agg = Aggregator::new(AggregatorLimits::default());
        let mut first = frame(false, OpCode::Binary, b"a");
        first.rsv1 = true;
        agg.feed(first).unwrap();

        match agg.feed(frame(true, OpCode::Continue, b"b")).unwrap() {
            Aggregated::Complete(reassembled) => assert!(reassembled.compressed),
            _ => panic!("expected assembled message"),
        }
    }

    #[test]
    fn new_data_frame_while_pending_is_rejected() {
        let mut agg = Aggregator::new(AggregatorLimits::default());
        agg.feed(frame(false, OpCode::Text, b"a")).unwrap();
        assert!(matches!(
            agg.feed(frame(true, OpCode::Binary, b"b")),
            Err(Error::InvalidFrameFragmentation)
        ));
    }

    #[test]
    fn continuation_without_prefix_is_rejected() {
        let mut agg = Aggregator::new(AggregatorLimits::default());
        assert!(matches!(
            agg.feed(frame(true, OpCode::Continue, b"x")),
            Err(Error::InvalidContinuationFrame)
        ));
    }

    #[test]
    fn min_non_final_fragment_size_is_enforced() {
        let mut agg = Aggregator::new(AggregatorLimits {
            min_non_final_fragment_size: 4,
            ..AggregatorLimits::default()
        });
        assert!(matches!(
            agg.feed(frame(false, OpCode::Text, b"ab")),
            Err(Error::FragmentTooSmall)
        ));
        assert!(agg.feed(frame(false, OpCode::Text, b"abcd")).is_ok());
    }

    #[test]
    fn max_accumulated_frame_count_is_enforced() {
        let mut agg = Aggregator::new(AggregatorLimits {
            max_accumulated_frame_count: Some(2),
            ..AggregatorLimits::default()
        });
        agg.feed(frame(false, OpCode::Text, b"a")).unwrap();
        agg.feed(frame(false, OpCode::Continue, b"b")).unwrap();
        assert!(matches!(
            agg.feed(frame(true, OpCode::Continue, b"c")),
            Err(Error::MaxMessageSize)
        ));
        assert!(!agg.has_pending());
    }

    #[test]
    fn max_accumulated_frame_size_is_enforced() {
        let mut agg = Aggregator::new(AggregatorLimits {
            max_accumulated_frame_size: Some(4),
            ..AggregatorLimits::default()
        });
        agg.feed(frame(false, OpCode::Text, b"ab")).unwrap();
        assert!(matches!(
            agg.feed(frame(true, OpCode::Continue, b"cdef")),
            Err(Error::MaxMessageSize)
        ));
    }
}
