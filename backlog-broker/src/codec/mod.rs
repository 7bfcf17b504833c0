//! Wire codec layer.
//!
//! Frames [`BackLogMessage`](crate::BackLogMessage) records on the deployment
//! channel and encodes the per-type acknowledgment payload.
//!
//! ```
//! use backlog_broker::codec::{encode_frame_to_bytes, FrameDecoder};
//! use backlog_broker::{BackLogMessage, MessageType};
//! use bytes::BytesMut;
//!
//! let message = BackLogMessage::new(MessageType::MIG, 1_000, vec![1u8, 2, 3]);
//! let mut buf = BytesMut::from(&encode_frame_to_bytes(&message).unwrap()[..]);
//!
//! let decoded = FrameDecoder::new().decode(&mut buf).unwrap();
//! assert_eq!(decoded, Some(message));
//! ```

mod ack;
mod frame;

pub use ack::Acknowledgment;
pub use frame::{
    encode_frame, encode_frame_to_bytes, FrameDecoder, FrameError, FRAME_HEADER_LEN, MAX_FRAME_LEN,
};
