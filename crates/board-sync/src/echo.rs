//! Self-echo suppression for realtime change feeds.
//!
//! The remote store broadcasts every write back to all subscribers, including
//! the writer. Rather than thread client ids through the wire protocol, the
//! engine notes when it issued a write and discards any change that arrives
//! within a short window afterwards.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// How long after a local write an incoming change is treated as our own
/// echo. A heuristic: long enough to cover store round-trip plus broadcast
/// fan-out, short enough that a genuine concurrent edit from another client
/// rarely lands inside it.
pub const ECHO_WINDOW: Duration = Duration::from_millis(2000);

/// Tracks the most recent local write time.
///
/// Uses [`tokio::time::Instant`] so paused-clock tests can step through the
/// window deterministically.
#[derive(Debug)]
pub struct EchoFilter {
    window: Duration,
    last_local_write: Mutex<Option<Instant>>,
}

impl EchoFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_local_write: Mutex::new(None),
        }
    }

    /// Record that a write was just issued. Call before handing the payload
    /// to the store, so the echo cannot outrun the mark.
    pub fn mark_local_write(&self) {
        let mut last = self
            .last_local_write
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *last = Some(Instant::now());
    }

    /// True while the suppression window from the last local write is open.
    /// Never true before the first write.
    pub fn is_self_echo(&self) -> bool {
        let last = self
            .last_local_write
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(at) => at.elapsed() < self.window,
            None => false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for EchoFilter {
    fn default() -> Self {
        Self::new(ECHO_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_no_write_is_never_echo() {
        let filter = EchoFilter::default();
        assert!(!filter.is_self_echo());
        advance(Duration::from_secs(60)).await;
        assert!(!filter.is_self_echo());
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_inside_window() {
        let filter = EchoFilter::default();
        filter.mark_local_write();
        assert!(filter.is_self_echo());
        advance(Duration::from_millis(1999)).await;
        assert!(filter.is_self_echo());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_closes() {
        let filter = EchoFilter::default();
        filter.mark_local_write();
        advance(Duration::from_millis(2000)).await;
        assert!(!filter.is_self_echo());
        advance(Duration::from_millis(1)).await;
        assert!(!filter.is_self_echo());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_write_reopens_window() {
        let filter = EchoFilter::default();
        filter.mark_local_write();
        advance(Duration::from_millis(2500)).await;
        assert!(!filter.is_self_echo());
        filter.mark_local_write();
        assert!(filter.is_self_echo());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_window() {
        let filter = EchoFilter::new(Duration::from_millis(500));
        filter.mark_local_write();
        advance(Duration::from_millis(499)).await;
        assert!(filter.is_self_echo());
        advance(Duration::from_millis(1)).await;
        assert!(!filter.is_self_echo());
    }
}
