use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, the clock every timestamp on the wire
/// and in the engine uses.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
