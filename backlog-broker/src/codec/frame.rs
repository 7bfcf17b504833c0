/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Length-prefixed framing of [`BackLogMessage`] records.
//!
//! Layout: `u32` BE length of the remainder, `u8` type, `i64` BE timestamp,
//! payload.

use crate::message::{BackLogMessage, MessageType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Type byte plus timestamp.
pub const FRAME_HEADER_LEN: usize = 1 + 8;

/// Upper bound for a single frame body.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

const LENGTH_PREFIX_LEN: usize = 4;

/// Framing failures. Any of them invalidates the byte stream.
#[derive(Debug, Eq, PartialEq)]
pub enum FrameError {
    TooShort(usize),
    TooLarge(usize),
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::TooShort(len) => {
                write!(f, "frame of {len} bytes is shorter than the {FRAME_HEADER_LEN} byte header")
            }
            FrameError::TooLarge(len) => {
                write!(f, "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit")
            }
        }
    }
}

impl Error for FrameError {}

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    ReadingLength,
    ReadingBody {
        length: usize,
    },
}

/// Incremental decoder; feed it whatever the socket produced.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    state: DecodeState,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(None)` when `buf` does not hold a complete frame yet.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<BackLogMessage>, FrameError> {
        loop {
            match self.state {
                DecodeState::ReadingLength => {
                    if buf.len() < LENGTH_PREFIX_LEN {
                        return Ok(None);
                    }
                    let length = buf.get_u32() as usize;
                    if length < FRAME_HEADER_LEN {
                        return Err(FrameError::TooShort(length));
                    }
                    if length > MAX_FRAME_LEN {
                        return Err(FrameError::TooLarge(length));
                    }
                    buf.reserve(length);
                    self.state = DecodeState::ReadingBody { length };
                }
                DecodeState::ReadingBody { length } => {
                    if buf.len() < length {
                        return Ok(None);
                    }
                    let mut body = buf.split_to(length);
                    self.state = DecodeState::ReadingLength;

                    let message_type = MessageType(body.get_u8());
                    let timestamp = body.get_i64();
                    return Ok(Some(BackLogMessage {
                        message_type,
                        timestamp,
                        payload: body.freeze(),
                    }));
                }
            }
        }
    }
}

/// Appends one encoded frame to `buf`.
pub fn encode_frame(message: &BackLogMessage, buf: &mut BytesMut) -> Result<(), FrameError> {
    let length = FRAME_HEADER_LEN + message.payload.len();
    if length > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(length));
    }
    buf.reserve(LENGTH_PREFIX_LEN + length);
    buf.put_u32(length as u32);
    buf.put_u8(message.message_type.as_u8());
    buf.put_i64(message.timestamp);
    buf.put_slice(&message.payload);
    Ok(())
}

pub fn encode_frame_to_bytes(message: &BackLogMessage) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::new();
    encode_frame(message, &mut buf)?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::{encode_frame, encode_frame_to_bytes, FrameDecoder, FrameError, MAX_FRAME_LEN};
    use crate::message::{BackLogMessage, MessageType};
    use bytes::{BufMut, BytesMut};

    #[test]
    fn decoder_waits_for_split_frames() {
        let message = BackLogMessage::new(MessageType::MIG, 1_000, vec![7u8; 12]);
        let encoded = encode_frame_to_bytes(&message).expect("frame should encode");
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&encoded[..3]);
        assert_eq!(decoder.decode(&mut buf), Ok(None));
        buf.extend_from_slice(&encoded[3..10]);
        assert_eq!(decoder.decode(&mut buf), Ok(None));
        buf.extend_from_slice(&encoded[10..]);

        assert_eq!(decoder.decode(&mut buf), Ok(Some(message)));
        assert!(buf.is_empty());
    }

    #[test]
    fn decoder_yields_back_to_back_frames_in_order() {
        let first = BackLogMessage::new(MessageType(7), 1_000, vec![1u8]);
        let second = BackLogMessage::new(MessageType(9), 1_001, Vec::<u8>::new());
        let mut buf = BytesMut::new();
        encode_frame(&first, &mut buf).expect("first frame");
        encode_frame(&second, &mut buf).expect("second frame");

        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.decode(&mut buf), Ok(Some(first)));
        assert_eq!(decoder.decode(&mut buf), Ok(Some(second)));
        assert_eq!(decoder.decode(&mut buf), Ok(None));
    }

    #[test]
    fn decoder_rejects_frames_without_header() {
        let mut buf = BytesMut::new();
        buf.put_u32(4);
        buf.put_u32(0);

        assert_eq!(
            FrameDecoder::new().decode(&mut buf),
            Err(FrameError::TooShort(4))
        );
    }

    #[test]
    fn decoder_rejects_oversized_frames() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_LEN + 1) as u32);

        assert_eq!(
            FrameDecoder::new().decode(&mut buf),
            Err(FrameError::TooLarge(MAX_FRAME_LEN + 1))
        );
    }
}
