//! Channel-tagged message framing for chanmux.
//!
//! Every message on the wire is:
//! - a varint frame length (covering everything after it)
//! - a varint channel id
//! - the payload bytes
//!
//! Varints are protobuf-style base-128, least-significant group first.
//! [`FrameCodec`] plugs this into `tokio_util::codec` so callers always see
//! whole frames.

pub mod channel;
pub mod codec;
pub mod error;
pub mod varint;

pub use channel::{ChannelId, InvalidChannelId, MAX_CHANNEL_ID_WIDTH, MAX_SAFE_INTEGER};
pub use codec::{encode_frame, Frame, FrameCodec, DEFAULT_MAX_FRAME_SIZE};
pub use error::{FrameError, Result};
