//! The multiplexer: one driver per connection.
//!
//! A [`Multiplexer`] owns the connection and moves frames in both directions
//! inside a single future. The inbound half reads frames, parses channel ids
//! and routes payloads; the outbound half drains the shared write queue into
//! the connection. Nothing else touches the connection.

use std::sync::Arc;

use bytes::Bytes;
use chanmux_frame::{ChannelId, FrameCodec};
use chanmux_transport::Connection;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::{CancellationToken, PollSender};
use tracing::{debug, trace, warn};

use crate::channel::{Channel, ChannelSink, ChannelStream, Outbound};
use crate::codec::{RawCodec, ValueCodec};
use crate::config::{ErrorPolicy, MuxConfig};
use crate::descriptor::{validate_ids, ChannelSpec};
use crate::encoder::ChannelEncoder;
use crate::error::{MuxError, Result};
use crate::router::{PayloadCheck, Routed, Router};

/// Counters reported when a multiplexer finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MuxStats {
    /// Frames read off the connection.
    pub frames_in: u64,
    /// Frame body bytes read off the connection.
    pub bytes_in: u64,
    /// Frames written to the connection.
    pub frames_out: u64,
    /// Frame body bytes written to the connection.
    pub bytes_out: u64,
    /// Frames for ids no channel is registered under.
    pub unknown_dropped: u64,
    /// Frames dropped because their channel id was malformed.
    pub malformed_dropped: u64,
    /// Frames for channels whose read side had already ended.
    pub closed_dropped: u64,
}

/// Control handle for a running multiplexer.
#[derive(Debug, Clone)]
pub struct MuxHandle {
    cancel: CancellationToken,
}

impl MuxHandle {
    /// Stop the driver.
    ///
    /// Queued frames are discarded, the connection's write direction is shut
    /// down, every channel's read side ends, and later writes fail with
    /// [`MuxError::ConnectionClosed`].
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the driver has stopped or been asked to stop.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the driver has stopped or been asked to stop.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

/// Registers channels, then binds them to a connection.
///
/// Each [`add`](Self::add) returns the typed channel for that descriptor, so
/// channels with different value types can share one connection.
pub struct MuxBuilder {
    config: MuxConfig,
    router: Router,
    outbound_tx: mpsc::Sender<Outbound>,
    outbound_rx: mpsc::Receiver<Outbound>,
}

impl MuxBuilder {
    pub fn new() -> Self {
        Self::with_config(MuxConfig::default())
    }

    pub fn with_config(config: MuxConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        Self {
            config,
            router: Router::new(),
            outbound_tx,
            outbound_rx,
        }
    }

    /// Register a channel.
    ///
    /// Fails with [`MuxError::DuplicateChannelId`] if the id is taken; the
    /// builder is unchanged in that case.
    pub fn add<C: ValueCodec>(&mut self, spec: ChannelSpec<C>) -> Result<Channel<C>> {
        let id = spec.id();
        if self.router.contains(id) {
            return Err(MuxError::DuplicateChannelId(id));
        }

        let codec = Arc::clone(spec.codec());
        let check = match self.config.error_policy {
            ErrorPolicy::Isolate => None,
            ErrorPolicy::Terminate => {
                let codec = Arc::clone(&codec);
                let check: PayloadCheck =
                    Box::new(move |payload: Bytes| codec.decode(payload).map(drop));
                Some(check)
            }
        };
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        self.router.insert(id, inbound_tx, check);

        let encoder = ChannelEncoder::new(id, Arc::clone(&codec), self.config.max_frame_size);
        let sink = ChannelSink::new(encoder, PollSender::new(self.outbound_tx.clone()));
        let stream = ChannelStream::new(id, inbound_rx, codec);

        debug!(channel = %id, "channel registered");
        Ok(Channel::new(sink, stream))
    }

    /// Register a byte channel.
    pub fn add_raw(&mut self, id: impl Into<ChannelId>) -> Result<Channel<RawCodec>> {
        self.add(ChannelSpec::raw(id.into()))
    }

    /// Bind the registered channels to `connection`.
    ///
    /// Nothing moves until [`Multiplexer::run`] is polled.
    pub fn build<T: Connection>(self, connection: T) -> Result<Multiplexer<T>> {
        if self.router.is_empty() {
            return Err(MuxError::InvalidChannelSpec(
                "at least one channel is required".to_string(),
            ));
        }
        // Only channel sinks may keep the write queue open.
        drop(self.outbound_tx);

        Ok(Multiplexer {
            connection,
            config: self.config,
            router: self.router,
            outbound: self.outbound_rx,
            cancel: CancellationToken::new(),
        })
    }

    /// Build and run the driver on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<T: Connection>(
        self,
        connection: T,
    ) -> Result<(MuxHandle, JoinHandle<Result<MuxStats>>)> {
        let mux = self.build(connection)?;
        let handle = mux.handle();
        let task = tokio::spawn(mux.run());
        Ok((handle, task))
    }
}

impl Default for MuxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver for one connection.
pub struct Multiplexer<T> {
    connection: T,
    config: MuxConfig,
    router: Router,
    outbound: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
}

impl<T: Connection> Multiplexer<T> {
    pub fn handle(&self) -> MuxHandle {
        MuxHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Registered channel ids, ascending.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.router.ids()
    }

    /// Drive the connection until both directions are done.
    ///
    /// The read direction is done at end of stream. The write direction is
    /// done once every channel's write side has been closed or dropped, at
    /// which point the connection's write half is shut down. A
    /// [`MuxHandle::close`] ends both at once.
    ///
    /// Under [`ErrorPolicy::Terminate`] the first malformed or undecodable
    /// frame stops both directions and is returned as the error, whether or
    /// not anyone is reading the channel it was addressed to.
    pub async fn run(self) -> Result<MuxStats> {
        let Self {
            connection,
            config,
            router,
            outbound,
            cancel,
        } = self;
        let _closed_on_exit = cancel.clone().drop_guard();

        let (read_half, write_half) = tokio::io::split(connection);
        let codec = FrameCodec::with_max_frame_size(config.max_frame_size);
        let reader = FramedRead::new(read_half, codec.clone());
        let writer = FramedWrite::new(write_half, codec);

        debug!(
            channels = router.len(),
            policy = ?config.error_policy,
            "multiplexer started"
        );

        let mut inbound_stats = MuxStats::default();
        let mut outbound_stats = MuxStats::default();
        let result = {
            let inbound = drive_inbound(
                reader,
                router,
                config.error_policy,
                &cancel,
                &mut inbound_stats,
            );
            let outbound = drive_outbound(writer, outbound, &cancel, &mut outbound_stats);
            tokio::try_join!(inbound, outbound).map(|_| ())
        };

        let stats = MuxStats {
            frames_out: outbound_stats.frames_out,
            bytes_out: outbound_stats.bytes_out,
            ..inbound_stats
        };
        match result {
            Ok(()) => {
                debug!(?stats, "multiplexer finished");
                Ok(stats)
            }
            Err(err) => {
                warn!(error = %err, ?stats, "multiplexer stopped");
                Err(err)
            }
        }
    }
}

async fn drive_inbound<R>(
    reader: FramedRead<R, FrameCodec>,
    router: Router,
    policy: ErrorPolicy,
    cancel: &CancellationToken,
    stats: &mut MuxStats,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = read_frames(reader, router, policy, stats) => result,
    }
}

async fn read_frames<R>(
    mut reader: FramedRead<R, FrameCodec>,
    mut router: Router,
    policy: ErrorPolicy,
    stats: &mut MuxStats,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    while let Some(body) = reader.next().await {
        let body = body?;
        stats.frames_in += 1;
        stats.bytes_in += body.len() as u64;

        match router.route(body).await {
            Ok(Routed::Delivered(channel)) => trace!(%channel, "frame delivered"),
            Ok(Routed::Unknown(channel)) => {
                stats.unknown_dropped += 1;
                trace!(channel, "dropping frame for unknown channel");
            }
            Ok(Routed::Closed(channel)) => {
                stats.closed_dropped += 1;
                debug!(%channel, "channel read side gone; route removed");
            }
            Err(MuxError::MalformedVarint) if policy == ErrorPolicy::Isolate => {
                stats.malformed_dropped += 1;
                warn!("dropping frame with malformed channel id");
            }
            Err(err) => return Err(err),
        }
    }
    debug!("connection read side ended");
    Ok(())
}

async fn drive_outbound<W>(
    mut writer: FramedWrite<W, FrameCodec>,
    mut queue: mpsc::Receiver<Outbound>,
    cancel: &CancellationToken,
    stats: &mut MuxStats,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        _ = cancel.cancelled() => {
            queue.close();
            debug!("write path closed by handle");
        }
        result = write_frames(&mut writer, &mut queue, stats) => result?,
    }
    SinkExt::<Bytes>::close(&mut writer).await?;
    debug!("connection write side shut down");
    Ok(())
}

/// Drain the queue into the connection, flushing whenever it runs dry.
async fn write_frames<W>(
    writer: &mut FramedWrite<W, FrameCodec>,
    queue: &mut mpsc::Receiver<Outbound>,
    stats: &mut MuxStats,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = queue.recv().await {
        let mut next = Some(first);
        while let Some(Outbound { channel, body }) = next {
            trace!(%channel, len = body.len(), "writing frame");
            stats.frames_out += 1;
            stats.bytes_out += body.len() as u64;
            writer.feed(body).await?;
            next = queue.try_recv().ok();
        }
        SinkExt::<Bytes>::flush(&mut *writer).await?;
    }
    Ok(())
}

/// Bind `specs` to `connection` and start driving it.
///
/// Channels come back in the order given. The driver runs on the current
/// tokio runtime until both directions of the connection are done; see
/// [`Multiplexer::run`].
///
/// Fails with [`MuxError::InvalidChannelSpec`] for an empty list and
/// [`MuxError::DuplicateChannelId`] if two specs share an id. No channel is
/// created on failure.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn create_multiplexer<T, C, I>(connection: T, specs: I) -> Result<Vec<Channel<C>>>
where
    T: Connection,
    C: ValueCodec,
    I: IntoIterator<Item = ChannelSpec<C>>,
{
    create_multiplexer_with_config(connection, specs, MuxConfig::default())
}

/// [`create_multiplexer`] with explicit configuration.
pub fn create_multiplexer_with_config<T, C, I>(
    connection: T,
    specs: I,
    config: MuxConfig,
) -> Result<Vec<Channel<C>>>
where
    T: Connection,
    C: ValueCodec,
    I: IntoIterator<Item = ChannelSpec<C>>,
{
    let specs: Vec<ChannelSpec<C>> = specs.into_iter().collect();
    validate_ids(specs.iter().map(ChannelSpec::id))?;

    let mut builder = MuxBuilder::with_config(config);
    let channels = specs
        .into_iter()
        .map(|spec| builder.add(spec))
        .collect::<Result<Vec<_>>>()?;
    builder.spawn(connection)?;
    Ok(channels)
}
