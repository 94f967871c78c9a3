use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use chanmux_frame::{ChannelId, FrameError};

use crate::codec::ValueCodec;
use crate::error::{MuxError, Result};

/// Turns one channel's values into frame bodies (`<channel-id><payload>`).
///
/// The id prefix is encoded once, when the channel is created.
pub struct ChannelEncoder<C> {
    id: ChannelId,
    prefix: Bytes,
    codec: Arc<C>,
    max_frame_size: usize,
}

impl<C: ValueCodec> ChannelEncoder<C> {
    pub fn new(id: ChannelId, codec: Arc<C>, max_frame_size: usize) -> Self {
        Self {
            id,
            prefix: id.encode(),
            codec,
            max_frame_size,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Encode one value into a frame body.
    ///
    /// Failures are scoped to this channel: the encoder stays usable.
    pub fn encode(&self, value: C::Value) -> Result<Bytes> {
        let payload = self
            .codec
            .encode(value)
            .map_err(|source| MuxError::EncodingFailed {
                channel: self.id,
                source,
            })?;

        let size = self.prefix.len() + payload.len();
        if size > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            }
            .into());
        }

        let mut body = BytesMut::with_capacity(size);
        body.put_slice(&self.prefix);
        body.put_slice(&payload);
        Ok(body.freeze())
    }
}
