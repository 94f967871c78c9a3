//! Duplex byte connections for chanmux.
//!
//! The multiplexer only needs a byte connection that:
//! - is readable with backpressure (`AsyncRead` returning `Pending`)
//! - is writable with backpressure (`AsyncWrite` returning `Pending`)
//! - can end its write direction independently (`poll_shutdown`)
//!
//! [`Connection`] names that contract. This crate also ships the two
//! transports the rest of the workspace uses: an in-memory pair and
//! Unix domain sockets.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{duplex_pair, Connection, DEFAULT_DUPLEX_BUFFER};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
