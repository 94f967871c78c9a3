//! Logical channels multiplexed over one duplex byte connection.
//!
//! chanmux tags every message with a varint channel id and a varint length,
//! so independent streams of values (raw bytes, JSON, or anything a codec
//! can serialize) share a single socket or pipe without cross-talk.
//!
//! # Crate Structure
//!
//! - [`transport`]: the connection contract plus Unix domain sockets
//! - [`frame`]: varints, channel ids and the length-prefix codec
//! - [`mux`]: channel descriptors, value codecs and the multiplexer
//!   (behind the default `mux` feature)

/// Re-export transport types.
pub mod transport {
    pub use chanmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use chanmux_frame::*;
}

/// Re-export multiplexer types (requires `mux` feature).
#[cfg(feature = "mux")]
pub mod mux {
    pub use chanmux_mux::*;
}

#[cfg(feature = "mux")]
pub use chanmux_mux::{create_multiplexer, Channel, ChannelSpec, MuxError};
