use chanmux_frame::DEFAULT_MAX_FRAME_SIZE;

/// What to do when a received frame cannot be handled.
///
/// Applies to malformed channel ids and to payloads a channel fails to
/// decode. Unknown channel ids are never errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Drop malformed frames and report decode failures on the affected
    /// channel only. Everything else keeps running.
    #[default]
    Isolate,
    /// Shut the whole multiplexer down on the first malformed frame or
    /// decode failure.
    Terminate,
}

/// Multiplexer configuration.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Largest frame body (channel id + payload) accepted in either
    /// direction. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Encoded frames that may wait for the shared write path.
    pub outbound_capacity: usize,
    /// Received payloads buffered per channel. When one channel's buffer is
    /// full the driver stops reading the connection, which holds back every
    /// other channel until that one is read.
    pub channel_capacity: usize,
    /// Handling of malformed frames and decode failures.
    pub error_policy: ErrorPolicy,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbound_capacity: 64,
            channel_capacity: 32,
            error_policy: ErrorPolicy::Isolate,
        }
    }
}
