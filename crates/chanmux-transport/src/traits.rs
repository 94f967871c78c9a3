use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};

/// Default per-direction buffer of an in-memory [`duplex_pair`].
pub const DEFAULT_DUPLEX_BUFFER: usize = 64 * 1024;

/// A duplex byte connection the multiplexer can own.
///
/// Anything that is `AsyncRead + AsyncWrite` qualifies: TCP and Unix
/// streams, pipes joined with `tokio::io::join`, in-memory duplex pairs.
/// Backpressure is whatever the underlying stream signals through
/// `Poll::Pending`; ending the write direction is `poll_shutdown`.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Create two connected in-memory byte streams.
///
/// Bytes written to one end are read from the other. Each direction
/// buffers at most `max_buf_size` bytes before writers see backpressure.
pub fn duplex_pair(max_buf_size: usize) -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(max_buf_size)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn assert_connection<T: Connection>(_conn: &T) {}

    #[tokio::test]
    async fn duplex_pair_is_a_connection() {
        let (left, right) = duplex_pair(DEFAULT_DUPLEX_BUFFER);
        assert_connection(&left);
        assert_connection(&right);
    }

    #[tokio::test]
    async fn duplex_pair_carries_bytes_both_ways() {
        let (mut left, mut right) = duplex_pair(DEFAULT_DUPLEX_BUFFER);

        left.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        right.write_all(b"pong").await.unwrap();
        left.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn duplex_pair_applies_backpressure() {
        let (mut left, _right) = duplex_pair(8);

        left.write_all(&[0u8; 8]).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(20), left.write_all(&[1u8; 1])).await;
        assert!(blocked.is_err(), "write past the buffer should stall");
    }

    #[tokio::test]
    async fn shutdown_ends_one_direction_only() {
        let (mut left, mut right) = duplex_pair(DEFAULT_DUPLEX_BUFFER);

        left.shutdown().await.unwrap();
        let mut buf = Vec::new();
        let n = right.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        right.write_all(b"still open").await.unwrap();
        let mut buf = [0u8; 10];
        left.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"still open");
    }
}
