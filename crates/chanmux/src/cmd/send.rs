use std::fs;
use std::time::Duration;

use bytes::Bytes;
use chanmux_mux::{connect_with_config, ChannelEntry, EncodingKind, Message};
use futures_util::{SinkExt, StreamExt};

use crate::cmd::{finish, ChannelList, Context, SendArgs};
use crate::exit::{io_error, mux_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::print_message;

pub async fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let channels = declared_channels(&args);
    if channels.encoding_of(args.channel).is_none() {
        return Err(CliError::new(
            USAGE,
            format!("channel {} is not declared in --channels {channels}", args.channel),
        ));
    }
    let payload = resolve_payload(&args)?;

    let mut session = connect_with_config(&args.path, channels.specs(), ctx.mux_config.clone())
        .await
        .map_err(|err| mux_error("connect failed", err))?;
    let mut channel = session
        .take_channel(args.channel)
        .ok_or_else(|| CliError::new(FAILURE, format!("channel {} missing", args.channel)))?;
    // Declared but unused: dropping them retires their routes.
    session.channels.clear();

    channel
        .send(payload)
        .await
        .map_err(|err| mux_error("send failed", err))?;
    tracing::debug!(channel = %args.channel, peer = %session.peer_id, "message sent");

    if args.wait {
        let reply = tokio::time::timeout(wait_timeout, channel.next())
            .await
            .map_err(|_| {
                CliError::new(
                    TIMEOUT,
                    format!(
                        "no reply on channel {} within {}",
                        args.channel, args.wait_timeout
                    ),
                )
            })?;
        match reply {
            Some(Ok(message)) => print_message(args.channel, &message, &session.peer_id, ctx.format),
            Some(Err(err)) => return Err(mux_error("receive failed", err)),
            None => {
                return Err(CliError::new(
                    FAILURE,
                    "connection closed before a reply arrived",
                ))
            }
        }
    }

    channel
        .close()
        .await
        .map_err(|err| mux_error("close failed", err))?;
    drop(channel);

    match tokio::time::timeout(wait_timeout, finish(session.task)).await {
        Ok(stats) => {
            let stats = stats?;
            tracing::debug!(frames_out = stats.frames_out, "connection finished");
        }
        Err(_) => {
            tracing::warn!(peer = %session.peer_id, "peer kept the connection open, closing");
            session.handle.close();
        }
    }

    Ok(SUCCESS)
}

/// The channel set to declare: `--channels` if given, otherwise just the
/// target channel, typed by the payload flag.
fn declared_channels(args: &SendArgs) -> ChannelList {
    if let Some(channels) = &args.channels {
        return channels.clone();
    }
    let encoding = if args.json.is_some() {
        EncodingKind::Json
    } else {
        EncodingKind::Raw
    };
    ChannelList(vec![ChannelEntry {
        id: args.channel,
        encoding,
    }])
}

fn resolve_payload(args: &SendArgs) -> CliResult<Message> {
    if let Some(json) = &args.json {
        let value = serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(Message::Json(value));
    }
    if let Some(data) = &args.data {
        return Ok(Message::Bytes(Bytes::copy_from_slice(data.as_bytes())));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(|bytes| Message::Bytes(bytes.into()))
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Message::Bytes(Bytes::new()))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use chanmux_frame::ChannelId;

    use super::*;

    fn send_args(channel: u16) -> SendArgs {
        SendArgs {
            path: "/tmp/unused.sock".into(),
            channels: None,
            channel: ChannelId::from(channel),
            json: None,
            data: None,
            file: None,
            wait: false,
            wait_timeout: "5s".to_string(),
        }
    }

    #[test]
    fn default_channel_set_follows_payload_flag() {
        let mut args = send_args(3);
        assert_eq!(declared_channels(&args).to_string(), "3:raw");

        args.json = Some("{}".to_string());
        assert_eq!(declared_channels(&args).to_string(), "3:json");

        args.channels = Some("0,3:json,9".parse().unwrap());
        assert_eq!(declared_channels(&args).0.len(), 3);
    }

    #[test]
    fn payload_flags_become_messages() {
        let mut args = send_args(0);
        assert_eq!(resolve_payload(&args).unwrap(), Message::Bytes(Bytes::new()));

        args.data = Some("hello".to_string());
        assert_eq!(
            resolve_payload(&args).unwrap(),
            Message::Bytes(Bytes::from_static(b"hello"))
        );

        args.data = None;
        args.json = Some(r#"{"x": [1, 2]}"#.to_string());
        assert_eq!(
            resolve_payload(&args).unwrap(),
            Message::Json(serde_json::json!({"x": [1, 2]}))
        );
    }

    #[test]
    fn invalid_json_payload_is_a_usage_error() {
        let mut args = send_args(0);
        args.json = Some("{not json".to_string());
        assert_eq!(resolve_payload(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
