use std::path::Path;

use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::codec::ValueCodec;
use crate::config::MuxConfig;
use crate::descriptor::{validate_ids, ChannelSpec};
use crate::error::Result;
use crate::mux::{MuxBuilder, MuxHandle, MuxStats};

/// A multiplexed connection to one peer.
pub struct MuxSession<C: ValueCodec> {
    /// Local name for the peer (`peer-N` on the accepting side).
    pub peer_id: String,
    /// Channels in the order they were declared.
    pub channels: Vec<Channel<C>>,
    /// Stops the driver.
    pub handle: MuxHandle,
    /// The driver task; resolves once both directions are done.
    pub task: JoinHandle<Result<MuxStats>>,
}

impl<C: ValueCodec> MuxSession<C> {
    pub(crate) fn start<T, I>(
        peer_id: impl Into<String>,
        connection: T,
        specs: I,
        config: MuxConfig,
    ) -> Result<Self>
    where
        T: chanmux_transport::Connection,
        I: IntoIterator<Item = ChannelSpec<C>>,
    {
        let mut builder = MuxBuilder::with_config(config);
        let channels = specs
            .into_iter()
            .map(|spec| builder.add(spec))
            .collect::<Result<Vec<_>>>()?;
        let (handle, task) = builder.spawn(connection)?;
        Ok(Self {
            peer_id: peer_id.into(),
            channels,
            handle,
            task,
        })
    }

    /// Take the channel registered under `id`, if any.
    pub fn take_channel(&mut self, id: impl Into<chanmux_frame::ChannelId>) -> Option<Channel<C>> {
        let id = id.into();
        let index = self.channels.iter().position(|ch| ch.id() == id)?;
        Some(self.channels.remove(index))
    }
}

impl<C: ValueCodec> std::fmt::Debug for MuxSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxSession")
            .field("peer_id", &self.peer_id)
            .field("channels", &self.channels)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Connect to a listening peer and multiplex `specs` over the connection.
pub async fn connect<C, I>(path: impl AsRef<Path>, specs: I) -> Result<MuxSession<C>>
where
    C: ValueCodec,
    I: IntoIterator<Item = ChannelSpec<C>>,
{
    connect_with_config(path, specs, MuxConfig::default()).await
}

/// Connect with explicit configuration.
pub async fn connect_with_config<C, I>(
    path: impl AsRef<Path>,
    specs: I,
    config: MuxConfig,
) -> Result<MuxSession<C>>
where
    C: ValueCodec,
    I: IntoIterator<Item = ChannelSpec<C>>,
{
    let specs: Vec<ChannelSpec<C>> = specs.into_iter().collect();
    validate_ids(specs.iter().map(ChannelSpec::id))?;

    let path = path.as_ref();
    let stream = chanmux_transport::UnixDomainSocket::connect(path).await?;
    MuxSession::start(path.display().to_string(), stream, specs, config)
}
