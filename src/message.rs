//! The user-facing message type: a complete text or binary payload, already
//! reassembled from whatever number of fragments it arrived in.

use crate::error::Error;
use crate::frame::{Frame, OpCode};

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    /// Builds a message from a reassembled opcode/payload pair. Text messages
    /// are validated as strict UTF-8 here, the single point where that check
    /// happens regardless of whether the message arrived as one frame or many.
    pub fn from_parts(opcode: OpCode, payload: Vec<u8>) -> Result<Self, Error> {
        match opcode {
            OpCode::Text => {
                let text = String::from_utf8(payload).map_err(|_| Error::InvalidUtf8)?;
                Ok(Message::Text(text))
            }
            OpCode::Binary => Ok(Message::Binary(payload)),
            _ => unreachable!("only text/binary opcodes produce a Message"),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Message::Text(text) => text.len(),
            Message::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits a message into one or more frames no larger than `fragment_size`,
    /// marking only the last as `fin`. A `fragment_size` of 0 or a payload that
    /// already fits in one frame produces a single, unfragmented frame.
    pub fn to_frames(self, fragment_size: usize) -> Vec<Frame> {
        let opcode = match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        };
        let payload = self.into_payload();

        if fragment_size == 0 || payload.len() <= fragment_size {
            return vec![Frame::new(true, opcode, payload)];
        }

        let mut frames = Vec::new();
        let mut chunks = payload.chunks(fragment_size).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let is_last = chunks.peek().is_none();
            let chunk_opcode = if first { opcode } else { OpCode::Continue };
            frames.push(Frame::new(is_last, chunk_opcode, chunk.to_vec()));
            first = false;
        }
        frames
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data)
    }
}
