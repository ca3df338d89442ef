use std::time::Duration;
use tracing::info;

/// Per-session counters reported when a relay session closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Text fragments forwarded to the client.
    pub fragments: u64,
    /// Upstream frames that produced no output.
    pub ignored: u64,
    /// Encoded bytes queued for the client, terminal event included.
    pub bytes_forwarded: u64,
}

impl SessionCounters {
    #[inline]
    pub fn record_fragment(&mut self, encoded_len: usize) {
        self.fragments += 1;
        self.bytes_forwarded += encoded_len as u64;
    }
}

/// Log the outcome of a relay session at INFO level.
pub fn log_session_complete(outcome: &str, counters: &SessionCounters, duration: Duration) {
    info!(
        outcome = outcome,
        fragments = counters.fragments,
        ignored_frames = counters.ignored,
        bytes_forwarded = counters.bytes_forwarded,
        duration_seconds = duration.as_secs_f64(),
        "relay session closed"
    );
}
