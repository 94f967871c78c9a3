//! Logical channels over one duplex byte connection.
//!
//! Declare channels (an id plus a value codec each), hand them a connection,
//! and get back one `Sink` + `Stream` per channel. Frames for ids nobody
//! declared are dropped; everything else lands on exactly one channel, in
//! the order it was sent.
//!
//! ```no_run
//! # async fn demo() -> chanmux_mux::Result<()> {
//! use bytes::Bytes;
//! use chanmux_mux::{create_multiplexer, ChannelSpec};
//! use futures_util::{SinkExt, StreamExt};
//!
//! let (local, _remote) = tokio::io::duplex(64 * 1024);
//! let mut channels = create_multiplexer(local, [ChannelSpec::raw(0u16.into())])?;
//! channels[0].send(Bytes::from_static(b"hello")).await?;
//! if let Some(reply) = channels[0].next().await {
//!     println!("{:?}", reply?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod encoder;
pub mod error;
pub mod mux;
mod router;

#[cfg(unix)]
pub mod connector;
#[cfg(unix)]
pub mod listener;

pub use channel::{Channel, ChannelSink, ChannelStream};
pub use codec::{FnCodec, JsonCodec, Message, RawCodec, ValueCodec};
pub use config::{ErrorPolicy, MuxConfig};
#[cfg(unix)]
pub use connector::{connect, connect_with_config, MuxSession};
pub use descriptor::{
    parse_channel_json, parse_channel_list, validate_ids, ChannelEntry, ChannelSpec, EncodingKind,
};
pub use encoder::ChannelEncoder;
pub use error::{BoxError, MuxError, Result};
#[cfg(unix)]
pub use listener::MuxListener;
pub use mux::{
    create_multiplexer, create_multiplexer_with_config, Multiplexer, MuxBuilder, MuxHandle,
    MuxStats,
};

pub use chanmux_frame::ChannelId;
