//! User-facing notices.
//!
//! The engine reports outcomes (saves, applied updates, failures) through a
//! [`Notifier`] so the embedding surface decides how toasts look. Failures in
//! particular must stay soft: the engine never surfaces a modal or blocks on
//! a notice.

use serde::Serialize;
use std::sync::Mutex;

/// Severity of a notice, for surfaces that style them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Sink for short user-facing messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, level: NoticeLevel);
}

/// Discards all notices. For headless use and tests that don't care.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _message: &str, _level: NoticeLevel) {}
}

/// Captures notices for assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(String, NoticeLevel)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(String, NoticeLevel)> {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, level: NoticeLevel) {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((message.to_string(), level));
    }
}
