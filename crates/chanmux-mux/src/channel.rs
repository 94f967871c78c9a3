//! Logical channels handed to callers.
//!
//! A [`Channel`] is a `Sink` of values going out and a `Stream` of decoded
//! values coming in. Both halves work independently: [`Channel::split`]
//! separates them, and closing one leaves the other usable.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use chanmux_frame::ChannelId;
use futures_core::Stream;
use futures_util::Sink;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;
use tracing::{debug, trace, warn};

use crate::codec::ValueCodec;
use crate::encoder::ChannelEncoder;
use crate::error::{MuxError, Result};

/// Encoded frame body waiting for the shared write path.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) channel: ChannelId,
    pub(crate) body: Bytes,
}

/// Write side of a channel.
///
/// `poll_ready` reserves room on the shared write path, so a slow connection
/// stalls only the channels that are writing. Flushing is a no-op: a value is
/// handed off once `start_send` returns. Closing (or dropping) every channel's
/// write side shuts down the connection's write direction.
///
/// A successful send means the frame was queued for the driver, not that the
/// peer received it. After the peer goes away, sends keep succeeding until
/// the driver hits the failed write and stops; from then on they fail with
/// [`MuxError::ConnectionClosed`]. Frames queued in between are lost.
pub struct ChannelSink<C: ValueCodec> {
    encoder: ChannelEncoder<C>,
    queue: PollSender<Outbound>,
}

impl<C: ValueCodec> ChannelSink<C> {
    pub(crate) fn new(encoder: ChannelEncoder<C>, queue: PollSender<Outbound>) -> Self {
        Self { encoder, queue }
    }

    pub fn id(&self) -> ChannelId {
        self.encoder.id()
    }

    /// Whether the write side has been closed, locally or by the driver.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl<C: ValueCodec> Sink<C::Value> for ChannelSink<C> {
    type Error = MuxError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.get_mut()
            .queue
            .poll_reserve(cx)
            .map_err(|_| MuxError::ConnectionClosed)
    }

    fn start_send(self: Pin<&mut Self>, value: C::Value) -> Result<()> {
        let this = self.get_mut();
        let body = this.encoder.encode(value)?;
        trace!(channel = %this.encoder.id(), len = body.len(), "queueing frame");
        this.queue
            .send_item(Outbound {
                channel: this.encoder.id(),
                body,
            })
            .map_err(|_| MuxError::ConnectionClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        if !this.queue.is_closed() {
            debug!(channel = %this.encoder.id(), "channel write side closed");
            this.queue.close();
        }
        Poll::Ready(Ok(()))
    }
}

impl<C: ValueCodec> fmt::Debug for ChannelSink<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Read side of a channel.
///
/// Yields one item per received frame, in arrival order. A payload the codec
/// rejects becomes an `Err(MuxError::DecodeFailed)` item and the stream
/// continues. Under [`ErrorPolicy::Terminate`] the driver rejects such a
/// payload before it gets here and stops instead. The stream ends when the
/// connection's read direction ends.
///
/// Received payloads wait in a bounded queue. A channel nobody reads fills
/// it, and then the driver stops reading the connection for every channel
/// until this one is drained or dropped.
///
/// [`ErrorPolicy::Terminate`]: crate::ErrorPolicy::Terminate
pub struct ChannelStream<C: ValueCodec> {
    id: ChannelId,
    inbound: mpsc::Receiver<Bytes>,
    codec: Arc<C>,
}

impl<C: ValueCodec> ChannelStream<C> {
    pub(crate) fn new(
        id: ChannelId,
        inbound: mpsc::Receiver<Bytes>,
        codec: Arc<C>,
    ) -> Self {
        Self { id, inbound, codec }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// End the read side.
    ///
    /// Values already received are still yielded; later frames for this
    /// channel are dropped by the router.
    pub fn close(&mut self) {
        debug!(channel = %self.id, "channel read side closed");
        self.inbound.close();
    }
}

impl<C: ValueCodec> Stream for ChannelStream<C> {
    type Item = Result<C::Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(payload) = ready!(this.inbound.poll_recv(cx)) else {
            return Poll::Ready(None);
        };
        trace!(channel = %this.id, len = payload.len(), "decoding payload");

        match this.codec.decode(payload) {
            Ok(value) => Poll::Ready(Some(Ok(value))),
            Err(source) => {
                warn!(channel = %this.id, error = %source, "failed to decode payload");
                Poll::Ready(Some(Err(MuxError::DecodeFailed {
                    channel: this.id,
                    source,
                })))
            }
        }
    }
}

impl<C: ValueCodec> fmt::Debug for ChannelStream<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelStream")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A logical channel: both halves together.
pub struct Channel<C: ValueCodec> {
    sink: ChannelSink<C>,
    stream: ChannelStream<C>,
}

impl<C: ValueCodec> Channel<C> {
    pub(crate) fn new(sink: ChannelSink<C>, stream: ChannelStream<C>) -> Self {
        Self { sink, stream }
    }

    pub fn id(&self) -> ChannelId {
        self.stream.id()
    }

    /// Separate the write and read sides.
    pub fn split(self) -> (ChannelSink<C>, ChannelStream<C>) {
        (self.sink, self.stream)
    }

    /// End the read side only. See [`ChannelStream::close`].
    pub fn close_read(&mut self) {
        self.stream.close();
    }
}

impl<C: ValueCodec> Sink<C::Value> for Channel<C> {
    type Error = MuxError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.get_mut().sink).poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, value: C::Value) -> Result<()> {
        Pin::new(&mut self.get_mut().sink).start_send(value)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.get_mut().sink).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.get_mut().sink).poll_close(cx)
    }
}

impl<C: ValueCodec> Stream for Channel<C> {
    type Item = Result<C::Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

impl<C: ValueCodec> fmt::Debug for Channel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id())
            .field("write_closed", &self.sink.is_closed())
            .finish()
    }
}
