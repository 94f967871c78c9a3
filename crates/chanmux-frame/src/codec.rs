use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::channel::{ChannelId, MAX_CHANNEL_ID_WIDTH};
use crate::error::{FrameError, Result};
use crate::varint;

/// Default maximum frame size (channel id + payload): 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A channel-tagged message.
///
/// `channel` is the raw id read off the wire. Inbound frames may carry ids
/// that no local channel (or no valid [`ChannelId`]) matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this message belongs to.
    pub channel: u64,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: impl Into<ChannelId>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into().get(),
            payload: payload.into(),
        }
    }

    /// Split a frame body into its channel id and payload.
    ///
    /// The id must terminate within [`MAX_CHANNEL_ID_WIDTH`] bytes; an empty
    /// body has no id at all and is malformed too.
    pub fn parse(mut body: Bytes) -> Result<Self> {
        let (channel, used) = varint::decode_bounded(&body, MAX_CHANNEL_ID_WIDTH)?;
        body.advance(used);
        Ok(Self {
            channel,
            payload: body,
        })
    }

    /// Length announced in the frame's prefix (channel id + payload).
    pub fn body_len(&self) -> usize {
        varint::encoded_len(self.channel) + self.payload.len()
    }

    /// The total wire size of this frame (length prefix + body).
    pub fn wire_size(&self) -> usize {
        let body = self.body_len();
        varint::encoded_len(body as u64) + body
    }
}

/// Encode a frame into the wire format.
///
/// ```text
/// ┌────────────────┬────────────────┬─────────────────┐
/// │ Length         │ Channel        │ Payload         │
/// │ (varint)       │ (varint)       │ (rest of frame) │
/// └────────────────┴────────────────┴─────────────────┘
/// ```
///
/// `Length` counts the channel and payload bytes together.
pub fn encode_frame(channel: ChannelId, payload: &[u8], dst: &mut BytesMut) {
    let body_len = channel.encoded_len() + payload.len();
    dst.reserve(varint::encoded_len(body_len as u64) + body_len);
    varint::encode(body_len as u64, dst);
    varint::encode(channel.get(), dst);
    dst.put_slice(payload);
}

/// Length-prefix codec for a byte connection.
///
/// Decodes into frame bodies (`<channel-id varint><payload>`) and encodes
/// bodies produced by channel encoders. Use [`Frame::parse`] to split a body.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec with the default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec with an explicit maximum frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Largest body this codec accepts in either direction.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let Some((len, prefix)) = varint::decode_partial(&src[..])? else {
            return Ok(None); // Need more data
        };
        let len = usize::try_from(len).map_err(|_| FrameError::FrameTooLarge {
            size: usize::MAX,
            max: self.max_frame_size,
        })?;
        self.check_size(len)?;

        let total = prefix + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None); // Need more data
        }

        trace!(len, "frame decoded");
        src.advance(prefix);
        Ok(Some(src.split_to(len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(body) => Ok(Some(body)),
            None if src.is_empty() => Ok(None),
            None => {
                debug!(buffered = src.len(), "connection closed mid-frame");
                Err(FrameError::ConnectionClosed)
            }
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<()> {
        self.check_size(body.len())?;
        dst.reserve(varint::encoded_len(body.len() as u64) + body.len());
        varint::encode(body.len() as u64, dst);
        dst.put_slice(&body);
        Ok(())
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        self.check_size(frame.body_len())?;
        varint::encode(frame.body_len() as u64, dst);
        varint::encode(frame.channel, dst);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
