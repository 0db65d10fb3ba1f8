//! Persistence gateway.
//!
//! Owns the decision of when local state reaches the remote store. Throttled
//! saves debounce so a burst of edits costs one network write carrying the
//! final state; forced saves go out immediately, optionally with a rendered
//! preview. Every write snapshots to the local cache first and marks the
//! echo filter before the network call, so the write's own broadcast can be
//! recognized however fast it comes back.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, warn};

use board_model::{DocumentId, DocumentPatch};

use crate::cache::{CachedSnapshot, SnapshotCache};
use crate::debounce::Debouncer;
use crate::echo::EchoFilter;
use crate::events::{EventBus, SessionEvent};
use crate::notify::{NoticeLevel, Notifier};
use crate::preview::{encode_preview_with, PREVIEW_MAX_WIDTH, PREVIEW_QUALITY};
use crate::state::StateStore;
use crate::store::{DocumentStore, StoreError, WriteReceipt};
use crate::surface::RenderSurface;

/// Debounce delay for throttled saves.
pub const SAVE_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("write failed: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SaveError>;

/// Caller intent for one save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Render and attach a preview thumbnail.
    pub preview: bool,
    /// Suppress success and failure notices. Failures still log and emit
    /// [`SessionEvent::SaveFailed`].
    pub silent: bool,
}

impl SaveOptions {
    /// Background auto-save: no preview, no notices.
    pub fn background() -> Self {
        Self {
            preview: false,
            silent: true,
        }
    }

    /// User-visible save with a preview attached.
    pub fn with_preview() -> Self {
        Self {
            preview: true,
            silent: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    pub delay: Duration,
    pub preview_max_width: u32,
    pub preview_quality: u8,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            delay: SAVE_DELAY,
            preview_max_width: PREVIEW_MAX_WIDTH,
            preview_quality: PREVIEW_QUALITY,
        }
    }
}

struct GatewayInner {
    document_id: DocumentId,
    store: Arc<dyn DocumentStore>,
    state: Arc<dyn StateStore>,
    surface: Option<Arc<dyn RenderSurface>>,
    cache: Arc<dyn SnapshotCache>,
    echo: Arc<EchoFilter>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
    config: GatewayConfig,
}

/// Write path for one open document.
pub struct PersistenceGateway {
    inner: Arc<GatewayInner>,
    debouncer: Debouncer<SaveOptions>,
}

impl PersistenceGateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        document_id: DocumentId,
        store: Arc<dyn DocumentStore>,
        state: Arc<dyn StateStore>,
        surface: Option<Arc<dyn RenderSurface>>,
        cache: Arc<dyn SnapshotCache>,
        echo: Arc<EchoFilter>,
        notifier: Arc<dyn Notifier>,
        events: Arc<EventBus>,
        config: GatewayConfig,
    ) -> Self {
        let (debouncer, rx) = Debouncer::new(config.delay);
        let inner = Arc::new(GatewayInner {
            document_id,
            store,
            state,
            surface,
            cache,
            echo,
            notifier,
            events,
            config,
        });
        tokio::spawn(drain(Arc::clone(&inner), rx));
        Self { inner, debouncer }
    }

    pub fn document_id(&self) -> DocumentId {
        self.inner.document_id
    }

    /// Schedule a debounced save. Each call supersedes the previous one, so
    /// only the state at the end of an edit burst reaches the network.
    pub fn save_throttled(&self, options: SaveOptions) {
        debug!(
            "Scheduling save for {} in {:?}",
            self.inner.document_id,
            self.debouncer.delay()
        );
        self.debouncer.schedule(options);
    }

    /// Write immediately, superseding any scheduled save.
    pub async fn save_now(&self, options: SaveOptions) -> Result<WriteReceipt> {
        self.debouncer.cancel_pending();
        self.inner.perform(options, true).await
    }

    /// Issue any pending scheduled save now instead of waiting out the
    /// delay. No-op when nothing is pending.
    pub fn flush(&self) {
        self.debouncer.flush_now();
    }

    pub fn cancel_pending(&self) {
        self.debouncer.cancel_pending();
    }

    pub fn has_pending(&self) -> bool {
        self.debouncer.has_pending()
    }
}

async fn drain(inner: Arc<GatewayInner>, mut rx: UnboundedReceiver<SaveOptions>) {
    while let Some(options) = rx.recv().await {
        // Failures are logged and surfaced inside perform; a throttled save
        // has no caller left to hand the error to.
        let _ = inner.perform(options, false).await;
    }
}

impl GatewayInner {
    async fn perform(&self, options: SaveOptions, forced: bool) -> Result<WriteReceipt> {
        let patch = self.build_patch(options.preview);

        // Snapshot locally first: if the write fails, the latest state is
        // still recoverable after a restart.
        let snapshot = CachedSnapshot {
            data: patch.data.clone(),
            saved_at: now_ms(),
        };
        if let Err(err) = self.cache.store(self.document_id, &snapshot) {
            warn!("Snapshot cache write for {} failed: {}", self.document_id, err);
        }

        // Mark before issuing, so the window covers the round trip.
        self.echo.mark_local_write();
        match self.store.write(self.document_id, &patch).await {
            Ok(receipt) => {
                debug!("Saved document {} (forced: {})", self.document_id, forced);
                if !options.silent {
                    self.notifier.notify("Board saved", NoticeLevel::Success);
                }
                self.events.emit(SessionEvent::SaveCompleted { forced });
                Ok(receipt)
            }
            Err(err) => {
                error!("Saving document {} failed: {}", self.document_id, err);
                if !options.silent {
                    self.notifier.notify(
                        "Could not save your latest changes. They remain stored locally.",
                        NoticeLevel::Warning,
                    );
                }
                self.events.emit(SessionEvent::SaveFailed {
                    message: err.to_string(),
                });
                Err(SaveError::Store(err))
            }
        }
    }

    /// Assemble the outgoing payload. Positions come from the live surface
    /// when one is attached, else from stored state; the payload always
    /// carries every field so the write replaces the row wholesale.
    fn build_patch(&self, preview: bool) -> DocumentPatch {
        let mut data = self.state.to_data();
        if let Some(surface) = &self.surface {
            match surface.positions() {
                Ok(positions) => data.positions = Some(positions),
                Err(err) => {
                    warn!(
                        "Reading positions from surface failed: {}; using stored positions",
                        err
                    );
                }
            }
        }
        let preview = if preview { self.render_preview() } else { None };
        DocumentPatch { data, preview }
    }

    /// Best effort: no surface, no frame, or an encoding failure all mean
    /// saving without a preview.
    fn render_preview(&self) -> Option<String> {
        let surface = self.surface.as_ref()?;
        let frame = surface.capture_frame()?;
        match encode_preview_with(
            &frame,
            self.config.preview_max_width,
            self.config.preview_quality,
        ) {
            Ok(url) => Some(url),
            Err(err) => {
                warn!("Preview encoding failed: {}", err);
                None
            }
        }
    }
}

fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

// ==================== Gateway tests ====================
