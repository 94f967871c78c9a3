use std::collections::HashMap;

use chanmux_mux::{EncodingKind, MuxListener, MuxSession, MuxStats};
use futures_util::stream::{select_all, StreamExt};
use futures_util::SinkExt;

use crate::cmd::{finish, interrupted, Context, EchoArgs};
use crate::exit::{mux_error, CliResult, SUCCESS};
use crate::output::payload_size;

pub async fn run(args: EchoArgs, ctx: &Context) -> CliResult<i32> {
    let listener = MuxListener::bind(&args.path, args.channels.specs())
        .map_err(|err| mux_error("bind failed", err))?
        .with_config(ctx.mux_config.clone());
    tracing::info!(
        path = %listener.path().display(),
        channels = %args.channels,
        "echo server listening"
    );

    let shutdown = interrupted();
    tokio::pin!(shutdown);

    loop {
        let session = tokio::select! {
            accepted = listener.accept() => accepted.map_err(|err| mux_error("accept failed", err))?,
            signal = &mut shutdown => {
                signal?;
                return Ok(SUCCESS);
            }
        };

        let handle = session.handle.clone();
        let peer_id = session.peer_id.clone();
        tokio::select! {
            served = serve_peer(session) => {
                let stats = served?;
                tracing::info!(
                    peer_id = %peer_id,
                    frames_in = stats.frames_in,
                    frames_out = stats.frames_out,
                    "peer disconnected"
                );
            }
            signal = &mut shutdown => {
                signal?;
                handle.close();
                return Ok(SUCCESS);
            }
        }
    }
}

/// Echo every value back on the channel it arrived on until the peer
/// stops writing.
async fn serve_peer(session: MuxSession<EncodingKind>) -> CliResult<MuxStats> {
    let MuxSession {
        peer_id,
        channels,
        task,
        ..
    } = session;
    tracing::info!(peer_id = %peer_id, "peer connected");

    let mut sinks = HashMap::with_capacity(channels.len());
    let mut inbound = select_all(channels.into_iter().map(|channel| {
        let id = channel.id();
        let (sink, stream) = channel.split();
        sinks.insert(id, sink);
        stream.map(move |item| (id, item))
    }));

    while let Some((id, item)) = inbound.next().await {
        let message = match item {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(peer_id = %peer_id, channel = %id, error = %err, "dropping undecodable message");
                continue;
            }
        };
        tracing::info!(
            peer_id = %peer_id,
            channel = %id,
            size = payload_size(&message),
            "echoing message"
        );
        if let Some(sink) = sinks.get_mut(&id) {
            sink.send(message)
                .await
                .map_err(|err| mux_error("echo send failed", err))?;
        }
    }

    drop(sinks);
    finish(task).await
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use bytes::Bytes;
    use chanmux_mux::{connect, Message};

    use super::*;
    use crate::cmd::ChannelList;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/checho-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("echo.sock")
    }

    fn cleanup(sock_path: &Path) {
        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[tokio::test]
    async fn echoes_each_value_on_its_own_channel() {
        let sock_path = make_sock_path("roundtrip");
        let channels: ChannelList = "0,1:json".parse().unwrap();
        let listener =
            MuxListener::bind(&sock_path, channels.specs()).expect("listener should bind");

        let server = tokio::spawn(async move {
            let session = listener.accept().await.expect("listener should accept");
            serve_peer(session).await
        });

        let mut client = connect(&sock_path, channels.specs())
            .await
            .expect("client should connect");
        let mut raw = client.take_channel(0u16).expect("raw channel");
        let mut json = client.take_channel(1u16).expect("json channel");

        json.send(Message::Json(serde_json::json!({"n": 1})))
            .await
            .unwrap();
        raw.send(Message::Bytes(Bytes::from_static(b"ping")))
            .await
            .unwrap();

        assert_eq!(
            json.next().await.unwrap().unwrap(),
            Message::Json(serde_json::json!({"n": 1}))
        );
        assert_eq!(
            raw.next().await.unwrap().unwrap(),
            Message::Bytes(Bytes::from_static(b"ping"))
        );

        drop(raw);
        drop(json);
        let stats = server
            .await
            .expect("server task should finish")
            .expect("session should end cleanly");
        assert_eq!(stats.frames_in, 2);
        assert_eq!(stats.frames_out, 2);
        cleanup(&sock_path);
    }
}
