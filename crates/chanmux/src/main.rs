mod cmd;
mod exit;
mod logging;
mod output;

use chanmux_frame::DEFAULT_MAX_FRAME_SIZE;
use chanmux_mux::{ErrorPolicy, MuxConfig};
use clap::{Parser, ValueEnum};

use crate::cmd::{Command, Context};
use crate::exit::INTERNAL;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Drop malformed frames; report decode failures on that channel only.
    Isolate,
    /// Stop the connection on the first malformed frame or decode failure.
    Terminate,
}

impl From<PolicyArg> for ErrorPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Isolate => ErrorPolicy::Isolate,
            PolicyArg::Terminate => ErrorPolicy::Terminate,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "chanmux",
    version,
    about = "Logical channels over one Unix socket"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", env = "CHANMUX_FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        env = "CHANMUX_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "CHANMUX_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    /// Largest frame body accepted or sent, in bytes.
    #[arg(
        long,
        value_name = "BYTES",
        env = "CHANMUX_MAX_FRAME",
        default_value_t = DEFAULT_MAX_FRAME_SIZE,
        global = true
    )]
    max_frame: usize,

    /// Handling of malformed frames and undecodable payloads.
    #[arg(
        long,
        value_name = "POLICY",
        env = "CHANMUX_ERROR_POLICY",
        default_value = "isolate",
        global = true
    )]
    error_policy: PolicyArg,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn context(&self) -> Context {
        Context {
            format: self.format.unwrap_or_else(OutputFormat::default_for_stdout),
            mux_config: MuxConfig {
                max_frame_size: self.max_frame,
                error_policy: self.error_policy.into(),
                ..MuxConfig::default()
            },
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let ctx = cli.context();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: runtime setup failed: {err}");
            std::process::exit(INTERNAL);
        }
    };

    match runtime.block_on(cmd::run(cli.command, &ctx)) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
