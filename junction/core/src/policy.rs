use std::time::Duration;

/// Timeout knobs consulted by inbound workers and the dispatcher. The
/// handshake deadline is installed before the first request header is
/// read and cleared once it has been parsed; the idle timer spans the
/// lifetime of the copy loop.
#[derive(Clone, Copy, Debug)]
pub struct Policy {
    pub handshake: Duration,
    pub connection_idle: Duration,
    pub uplink_only: Duration,
    pub downlink_only: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(4),
            connection_idle: Duration::from_secs(300),
            uplink_only: Duration::from_secs(0),
            downlink_only: Duration::from_secs(0),
        }
    }
}
