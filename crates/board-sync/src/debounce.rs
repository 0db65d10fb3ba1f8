//! Cancel-and-replace scheduling.
//!
//! Each call to [`Debouncer::schedule`] supersedes the previous one, so of a
//! burst of calls only the last payload is delivered, one delay after the
//! burst ends. Delivery happens on an unbounded channel returned by
//! [`Debouncer::new`]; the owner drains it from its own task.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct Pending<T> {
    payload: Option<T>,
    /// Bumped on every schedule/cancel/flush. A timer task only delivers if
    /// the generation it was spawned with is still current, which covers the
    /// race where an aborted timer had already finished sleeping.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// One pending-payload slot with a trailing-edge timer.
pub struct Debouncer<T> {
    delay: Duration,
    pending: Arc<Mutex<Pending<T>>>,
    tx: UnboundedSender<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create the debouncer and the channel its payloads are delivered on.
    pub fn new(delay: Duration) -> (Self, UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            delay,
            pending: Arc::new(Mutex::new(Pending {
                payload: None,
                generation: 0,
                timer: None,
            })),
            tx,
        };
        (debouncer, rx)
    }

    /// Replace any pending payload and restart the delay from now.
    pub fn schedule(&self, payload: T) {
        let mut pending = lock(&self.pending);
        pending.payload = Some(payload);
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        let generation = pending.generation;
        let slot = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        let delay = self.delay;
        pending.timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            let mut pending = lock(&slot);
            if pending.generation != generation {
                return;
            }
            pending.timer = None;
            if let Some(payload) = pending.payload.take() {
                let _ = tx.send(payload);
            }
        }));
    }

    /// Drop the pending payload, if any, without delivering it.
    pub fn cancel_pending(&self) {
        let mut pending = lock(&self.pending);
        pending.payload = None;
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
    }

    /// Deliver the pending payload now instead of waiting out the delay.
    /// No-op when nothing is pending.
    pub fn flush_now(&self) {
        let mut pending = lock(&self.pending);
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        if let Some(payload) = pending.payload.take() {
            let _ = self.tx.send(payload);
        }
    }

    pub fn has_pending(&self) -> bool {
        lock(&self.pending).payload.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

fn lock<T>(slot: &Arc<Mutex<Pending<T>>>) -> MutexGuard<'_, Pending<T>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}
