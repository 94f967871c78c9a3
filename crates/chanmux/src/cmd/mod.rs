use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chanmux_frame::ChannelId;
use chanmux_mux::{
    parse_channel_list, ChannelEntry, ChannelSpec, EncodingKind, MuxConfig, MuxError, MuxStats,
};
use clap::{Args, Subcommand};
use tokio::task::JoinHandle;

use crate::exit::{mux_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an echo server.
    Echo(EchoArgs),
    /// Send a single message.
    Send(SendArgs),
    /// Listen and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub mux_config: MuxConfig,
}

pub async fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, ctx).await,
        Command::Send(args) => send::run(args, ctx).await,
        Command::Listen(args) => listen::run(args, ctx).await,
        Command::Version(args) => version::run(args),
    }
}

/// Resolves on Ctrl-C.
pub async fn interrupted() -> CliResult<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Wait for a session's driver and surface its outcome.
pub async fn finish(task: JoinHandle<chanmux_mux::Result<MuxStats>>) -> CliResult<MuxStats> {
    task.await
        .map_err(|err| CliError::new(INTERNAL, format!("connection task failed: {err}")))?
        .map_err(|err| mux_error("connection failed", err))
}

/// A validated channel set: `0,1:json` or `[0, {"id": 1, "encoding": "json"}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelList(pub Vec<ChannelEntry>);

impl ChannelList {
    pub fn specs(&self) -> impl Iterator<Item = ChannelSpec<EncodingKind>> + '_ {
        self.0.iter().map(|entry| entry.into_spec())
    }

    pub fn encoding_of(&self, id: ChannelId) -> Option<EncodingKind> {
        self.0
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.encoding)
    }
}

impl FromStr for ChannelList {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_channel_list(s).map(Self)
    }
}

impl fmt::Display for ChannelList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Channels to serve (e.g. `0,1:json`).
    #[arg(long, default_value = "0")]
    pub channels: ChannelList,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Channels to declare. Default: only --channel, typed by the payload flag.
    #[arg(long)]
    pub channels: Option<ChannelList>,
    /// Channel to send on.
    #[arg(long, short = 'c', default_value = "0")]
    pub channel: ChannelId,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one reply on the same channel and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Channels to accept (e.g. `0,1:json`). Frames on other ids are dropped.
    #[arg(long, default_value = "0")]
    pub channels: ChannelList,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print connection statistics when each peer disconnects.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
