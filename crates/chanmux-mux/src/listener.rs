use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chanmux_transport::UnixDomainSocket;
use tracing::debug;

use crate::codec::{RawCodec, ValueCodec};
use crate::config::MuxConfig;
use crate::connector::MuxSession;
use crate::descriptor::{validate_ids, ChannelSpec};
use crate::error::Result;

/// Accepts connections and multiplexes a fixed channel set over each.
pub struct MuxListener<C: ValueCodec = RawCodec> {
    socket: UnixDomainSocket,
    specs: Vec<ChannelSpec<C>>,
    config: MuxConfig,
    next_peer_id: AtomicU64,
}

impl<C: ValueCodec> MuxListener<C> {
    /// Bind to a Unix domain socket path.
    ///
    /// The channel set is validated before the socket is created.
    pub fn bind<I>(path: impl AsRef<Path>, specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = ChannelSpec<C>>,
    {
        let specs: Vec<ChannelSpec<C>> = specs.into_iter().collect();
        validate_ids(specs.iter().map(ChannelSpec::id))?;
        let socket = UnixDomainSocket::bind(path)?;
        Ok(Self {
            socket,
            specs,
            config: MuxConfig::default(),
            next_peer_id: AtomicU64::new(1),
        })
    }

    /// Override the multiplexer config used for accepted connections.
    pub fn with_config(mut self, config: MuxConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept next connection and assign an auto-generated peer id.
    pub async fn accept(&self) -> Result<MuxSession<C>> {
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        self.accept_with_id(&format!("peer-{id}")).await
    }

    /// Accept next connection and use explicit peer id.
    pub async fn accept_with_id(&self, peer_id: &str) -> Result<MuxSession<C>> {
        let stream = self.socket.accept().await?;
        debug!(peer = peer_id, channels = self.specs.len(), "starting session");
        MuxSession::start(
            peer_id,
            stream,
            self.specs.iter().cloned(),
            self.config.clone(),
        )
    }

    /// Channel ids every session carries, in declaration order.
    pub fn channel_ids(&self) -> impl Iterator<Item = chanmux_frame::ChannelId> + '_ {
        self.specs.iter().map(ChannelSpec::id)
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}
