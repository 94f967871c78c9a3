//! Minimal echo server: accepts one peer and echoes raw messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send /tmp/chanmux-echo-<pid>/echo.sock \
//!     --channel 1 --data hello --wait --wait-timeout 3

use std::fs;

use chanmux::mux::{ChannelSpec, MuxListener};
use futures_util::{SinkExt, StreamExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("chanmux-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = MuxListener::bind(
        &sock_path,
        [ChannelSpec::raw(0u16.into()), ChannelSpec::raw(1u16.into())],
    )?;
    eprintln!("Listening on {}", sock_path.display());

    let session = listener.accept().await?;
    eprintln!("Peer connected: {}", session.peer_id);

    // One task per channel; each echoes until the peer stops writing.
    let mut echoers = Vec::new();
    for channel in session.channels {
        echoers.push(tokio::spawn(async move {
            let id = channel.id();
            let (mut sink, mut stream) = channel.split();
            while let Some(payload) = stream.next().await {
                let payload = payload?;
                eprintln!("Received {} bytes on channel {id}", payload.len());
                sink.send(payload).await?;
            }
            Ok::<_, chanmux::MuxError>(())
        }));
    }
    for echoer in echoers {
        echoer.await??;
    }

    let stats = session.task.await??;
    eprintln!(
        "Peer disconnected after {} frames in, {} out",
        stats.frames_in, stats.frames_out
    );

    drop(listener);
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
