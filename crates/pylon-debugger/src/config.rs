use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DebuggerConfig {
    /// How long to wait for the attach-completed signal after the injection
    /// primitive reports success. Elapsing is a hard failure, distinct from
    /// an explicit attach error code.
    pub attach_timeout: Duration,
    /// Bound on the synchronous set-line-number RPC. Elapsing means "edit
    /// failed", not an error.
    pub set_line_timeout: Duration,
    /// Capacity of the broadcast event channel.
    pub event_channel_size: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            attach_timeout: Duration::from_secs(5),
            set_line_timeout: Duration::from_secs(2),
            event_channel_size: 64,
        }
    }
}
