//! Multi-channel example: a JSON command channel and a raw data channel
//! sharing one socket.
//!
//! Run with:
//!   cargo run --example multi-channel

use std::fs;

use bytes::Bytes;
use chanmux::mux::{ChannelSpec, JsonCodec, MuxBuilder, MuxListener};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

const COMMAND: u16 = 1;
const DATA: u16 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct Command {
    action: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("chanmux-multi-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("multi.sock");

    // The listener speaks raw on both channels; the client types its
    // command channel. Only the bytes on the wire have to agree.
    let listener = MuxListener::bind(
        &sock_path,
        [ChannelSpec::raw(COMMAND.into()), ChannelSpec::raw(DATA.into())],
    )?;

    let server = tokio::spawn(async move {
        let session = listener.accept().await?;
        eprintln!("[server] peer connected: {}", session.peer_id);
        for mut channel in session.channels {
            let payload = channel.next().await.transpose()?.unwrap_or_default();
            let name = match channel.id().get() {
                1 => "COMMAND",
                2 => "DATA",
                _ => "UNKNOWN",
            };
            eprintln!(
                "[server] channel={name} payload={}",
                String::from_utf8_lossy(&payload)
            );
            channel.send(payload).await?;
        }
        Ok::<_, chanmux::MuxError>(())
    });

    let stream = tokio::net::UnixStream::connect(&sock_path).await?;
    let mut builder = MuxBuilder::new();
    let mut commands = builder.add(ChannelSpec::new(
        COMMAND.into(),
        JsonCodec::<Command>::new(),
    ))?;
    let mut data = builder.add_raw(DATA)?;
    let (_handle, driver) = builder.spawn(stream)?;

    commands
        .send(Command {
            action: "ping".to_string(),
        })
        .await?;
    if let Some(reply) = commands.next().await {
        eprintln!("[client] COMMAND response: {:?}", reply?);
    }

    data.send(Bytes::from_static(b"bulk payload bytes here"))
        .await?;
    if let Some(reply) = data.next().await {
        eprintln!(
            "[client] DATA response: {}",
            String::from_utf8_lossy(&reply?)
        );
    }

    server.await??;
    drop(commands);
    drop(data);
    let stats = driver.await??;
    eprintln!("[client] done: {} frames out", stats.frames_out);

    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
