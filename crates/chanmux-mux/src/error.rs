use chanmux_frame::{ChannelId, FrameError, InvalidChannelId};
use chanmux_transport::TransportError;

/// Boxed error returned by value codecs.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while building or running a multiplexer.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// A channel entry is missing or structurally wrong.
    #[error("invalid channel spec: {0}")]
    InvalidChannelSpec(String),

    /// A channel id is not an integer, is negative, or is too large.
    #[error("invalid channel id: {0}")]
    InvalidChannelId(#[from] InvalidChannelId),

    /// A channel entry names an encoding that cannot be used.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Two channel entries share an id.
    #[error("duplicate channel id {0}")]
    DuplicateChannelId(ChannelId),

    /// A received frame's channel id could not be parsed.
    #[error("malformed channel id in received frame")]
    MalformedVarint,

    /// A value could not be encoded for its channel.
    #[error("encoding failed on channel {channel}: {source}")]
    EncodingFailed { channel: ChannelId, source: BoxError },

    /// A received payload could not be decoded for its channel.
    #[error("decode failed on channel {channel}: {source}")]
    DecodeFailed { channel: ChannelId, source: BoxError },

    /// The shared connection is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// Frame-level error on the shared connection.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport-level error while establishing the connection.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, MuxError>;
