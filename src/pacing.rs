//! Playback pacing.
//!
//! All pauses are expressed in tenths of a second and go through a [`Pacer`],
//! so tests can record them instead of sleeping.

use async_trait::async_trait;
use std::time::Duration;

/// Delay used by a `# delay` directive without a valid count.
pub const DEFAULT_DELAY_TENTHS: u64 = 5;

/// Pause standing in for the operator's keypress in non-interactive mode.
pub const AUTO_PACE_TENTHS: u64 = 5;

/// Pause between characters when per-character delay is enabled.
pub const CHAR_DELAY_TENTHS: u64 = 2;

/// Convert tenths of a second into a [`Duration`].
pub fn tenths(count: u64) -> Duration {
    Duration::from_millis(count.saturating_mul(100))
}

/// Source of playback pauses.
#[async_trait(?Send)]
pub trait Pacer {
    /// Pause for `count` tenths of a second.
    async fn pause(&mut self, count: u64);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

#[async_trait(?Send)]
impl Pacer for TokioPacer {
    async fn pause(&mut self, count: u64) {
        tokio::time::sleep(tenths(count)).await;
    }
}
