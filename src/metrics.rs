//! Metric helpers for `livewire`.
//!
//! Thin wrappers over the [`metrics`](https://docs.rs/metrics) crate; the
//! session records connection, frame, and reconnect activity through these.

use metrics::{counter, gauge};

/// Name of the gauge tracking live sessions.
pub const CONNECTIONS_ACTIVE: &str = "livewire_connections_active";
/// Name of the counter tracking processed frames.
pub const FRAMES_PROCESSED: &str = "livewire_frames_processed_total";
/// Name of the counter tracking reconnect attempts.
pub const RECONNECTS_TOTAL: &str = "livewire_reconnects_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "livewire_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy)]
pub enum Direction {
    /// Frames received from the peer.
    Inbound,
    /// Frames written to the peer.
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the live-session gauge.
pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the live-session gauge.
pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record a reconnect attempt.
pub fn inc_reconnects() { counter!(RECONNECTS_TOTAL).increment(1); }

/// Record an error occurrence.
pub fn inc_errors() { counter!(ERRORS_TOTAL).increment(1); }
