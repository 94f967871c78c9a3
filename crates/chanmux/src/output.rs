use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use chanmux_frame::ChannelId;
use chanmux_mux::{Message, MuxStats};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    channel: u64,
    encoding: &'static str,
    payload_size: usize,
    payload: serde_json::Value,
    peer_id: &'a str,
    timestamp: String,
}

pub fn print_message(channel: ChannelId, message: &Message, peer_id: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                channel: channel.get(),
                encoding: encoding_name(message),
                payload_size: payload_size(message),
                payload: match message {
                    Message::Json(value) => value.clone(),
                    Message::Bytes(bytes) => serde_json::Value::String(payload_preview(bytes)),
                },
                peer_id,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "ENCODING", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    channel.to_string(),
                    encoding_name(message).to_string(),
                    payload_size(message).to_string(),
                    peer_id.to_string(),
                    message_preview(message),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} encoding={} size={} peer={} payload={}",
                channel,
                encoding_name(message),
                payload_size(message),
                peer_id,
                message_preview(message)
            );
        }
        OutputFormat::Raw => match message {
            Message::Bytes(bytes) => print_raw(bytes),
            Message::Json(value) => println!("{value}"),
        },
    }
}

pub fn print_stats(stats: &MuxStats, peer_id: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out = serde_json::json!({ "peer_id": peer_id, "stats": stats });
            println!("{out}");
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "FRAMES IN", "FRAMES OUT", "UNKNOWN", "MALFORMED"])
                .add_row(vec![
                    peer_id.to_string(),
                    stats.frames_in.to_string(),
                    stats.frames_out.to_string(),
                    stats.unknown_dropped.to_string(),
                    stats.malformed_dropped.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} frames_in={} bytes_in={} frames_out={} bytes_out={} unknown={} malformed={}",
                peer_id,
                stats.frames_in,
                stats.bytes_in,
                stats.frames_out,
                stats.bytes_out,
                stats.unknown_dropped,
                stats.malformed_dropped
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn encoding_name(message: &Message) -> &'static str {
    match message {
        Message::Bytes(_) => "raw",
        Message::Json(_) => "json",
    }
}

pub(crate) fn payload_size(message: &Message) -> usize {
    message.to_bytes().map(|bytes| bytes.len()).unwrap_or(0)
}

fn message_preview(message: &Message) -> String {
    match message {
        Message::Bytes(bytes) => payload_preview(bytes),
        Message::Json(value) => value.to_string(),
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
