//! Session lifecycle.
//!
//! A [`SyncSession`] owns one document's realtime wiring: the change feed,
//! the presence channel, and the task that pumps both into the reconciler
//! and the roster. Sessions cycle `Closed → Opening → Subscribed → Closed`
//! and may be reopened; opening while open tears the previous channel down
//! first. Exactly one session per document per process.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use board_model::{DocumentData, DocumentId};

use crate::cache::SnapshotCache;
use crate::echo::EchoFilter;
use crate::events::{EventBus, SessionEvent};
use crate::presence::{Collaborator, PresenceRoster, PresenceTracker, RosterView, ROSTER_DISPLAY_MAX};
use crate::reconcile::UpdateReconciler;
use crate::store::{
    presence_key, ChangeFeed, DocumentStore, IdentityProvider, PresenceChannel,
    PresenceHeartbeat, ProfileDirectory, StoreError, UserProfile,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("subscribing failed: {0}")]
    Subscribe(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Closed,
    Opening,
    Subscribed,
}

struct ActiveChannel {
    roster: Arc<PresenceRoster>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Realtime collaboration for one open document.
pub struct SyncSession {
    document_id: DocumentId,
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileDirectory>,
    reconciler: Arc<UpdateReconciler>,
    echo: Arc<EchoFilter>,
    events: Arc<EventBus>,
    state: Arc<RwLock<SessionState>>,
    active: Option<ActiveChannel>,
}

impl SyncSession {
    pub fn new(
        document_id: DocumentId,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileDirectory>,
        reconciler: Arc<UpdateReconciler>,
        echo: Arc<EchoFilter>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            document_id,
            store,
            identity,
            profiles,
            reconciler,
            echo,
            events,
            state: Arc::new(RwLock::new(SessionState::Closed)),
            active: None,
        }
    }

    /// Join the document's channels and start pumping events.
    ///
    /// Without a signed-in user this is a quiet no-op: an anonymous viewer
    /// has no presence to publish, so the session just stays closed. Store
    /// failures while subscribing are returned and leave the session closed.
    pub async fn open(&mut self) -> Result<()> {
        if self.active.is_some() {
            self.close().await;
        }
        let Some(user) = self.identity.current_user() else {
            warn!(
                "No signed-in user; document {} stays offline",
                self.document_id
            );
            return Ok(());
        };

        self.set_state(SessionState::Opening);
        match self.subscribe(&user).await {
            Ok(active) => {
                self.active = Some(active);
                self.set_state(SessionState::Subscribed);
                info!(
                    "Subscribed to document {} as {}",
                    self.document_id, user.username
                );
                Ok(())
            }
            Err(err) => {
                self.set_state(SessionState::Closed);
                Err(err)
            }
        }
    }

    async fn subscribe(&self, user: &UserProfile) -> Result<ActiveChannel> {
        let feed = self.store.subscribe_changes(self.document_id).await?;
        let mut presence = self
            .store
            .subscribe_presence(&presence_key(self.document_id))
            .await?;
        presence
            .track(PresenceHeartbeat {
                user_id: user.user_id,
                online_at: now_ms(),
            })
            .await?;

        let roster = Arc::new(PresenceRoster::new(user.user_id));
        let tracker = PresenceTracker::new(
            Arc::clone(&roster),
            Arc::clone(&self.profiles),
            Arc::clone(&self.events),
        );
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_loop(
            feed,
            presence,
            tracker,
            Arc::clone(&self.reconciler),
            Arc::clone(&self.echo),
            Arc::clone(&self.state),
            Arc::clone(&self.events),
            shutdown_rx,
        ));
        Ok(ActiveChannel {
            roster,
            shutdown,
            task,
        })
    }

    /// Leave the channels and drop the roster. Closing an already-closed
    /// session is a no-op. An in-flight forced save is not cancelled; it
    /// belongs to the gateway, not the session.
    pub async fn close(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        debug!("Closing session for {}", self.document_id);
        let _ = active.shutdown.send(());
        if let Err(err) = active.task.await {
            warn!("Session task ended abnormally: {}", err);
        }
        if active.roster.clear() {
            self.events.emit(SessionEvent::RosterChanged);
        }
        self.set_state(SessionState::Closed);
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Subscribed
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Everyone seen on the board this session, first-seen order.
    pub fn roster(&self) -> Vec<Collaborator> {
        self.active
            .as_ref()
            .map(|active| active.roster.snapshot())
            .unwrap_or_default()
    }

    /// The roster capped for display.
    pub fn roster_view(&self) -> RosterView {
        self.active
            .as_ref()
            .map(|active| active.roster.display(ROSTER_DISPLAY_MAX))
            .unwrap_or(RosterView {
                shown: Vec::new(),
                overflow: 0,
            })
    }

    /// Note a local write issued outside the gateway, so its broadcast is
    /// still recognized as an echo.
    pub fn mark_local_update(&self) {
        self.echo.mark_local_write();
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    mut feed: Box<dyn ChangeFeed>,
    mut presence: Box<dyn PresenceChannel>,
    tracker: PresenceTracker,
    reconciler: Arc<UpdateReconciler>,
    echo: Arc<EchoFilter>,
    state: Arc<RwLock<SessionState>>,
    events: Arc<EventBus>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            // Resolves on close() and if the session is dropped outright.
            _ = &mut shutdown => break,
            change = feed.next_change() => {
                match change {
                    Some(change) => {
                        if echo.is_self_echo() {
                            debug!("Dropping self-echo for update {}", change.updated_at);
                        } else {
                            reconciler.apply(change);
                        }
                    }
                    None => {
                        warn!("Change feed ended");
                        break;
                    }
                }
            }
            event = presence.next_event() => {
                match event {
                    Some(event) => tracker.handle(event, now_ms()).await,
                    None => {
                        warn!("Presence channel ended");
                        break;
                    }
                }
            }
        }
    }
    presence.leave().await;
    // Every exit path empties the roster; the clear in close() is only a
    // backstop for tasks that died before reaching this point.
    tracker.clear_roster();
    *state.write().unwrap_or_else(|e| e.into_inner()) = SessionState::Closed;
    events.emit(SessionEvent::SessionClosed);
}

/// What bootstrapping a board produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBoard {
    pub data: DocumentData,
    /// The store's recency stamp, `None` when the data came from the local
    /// snapshot cache.
    pub updated_at: Option<String>,
    pub from_cache: bool,
}

/// Load the board row, falling back to the local snapshot cache when the
/// store fails. A cache miss propagates the original store error.
pub async fn load_board(
    store: &dyn DocumentStore,
    cache: &dyn SnapshotCache,
    id: DocumentId,
) -> std::result::Result<LoadedBoard, StoreError> {
    match store.load(id).await {
        Ok(doc) => Ok(LoadedBoard {
            data: doc.data,
            updated_at: Some(doc.updated_at),
            from_cache: false,
        }),
        Err(err) => {
            warn!("Loading document {} failed: {}; trying local snapshot", id, err);
            match cache.load(id) {
                Ok(Some(snapshot)) => Ok(LoadedBoard {
                    data: snapshot.data,
                    updated_at: None,
                    from_cache: true,
                }),
                Ok(None) => Err(err),
                Err(cache_err) => {
                    warn!("Snapshot cache read for {} failed: {}", id, cache_err);
                    Err(err)
                }
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

// ==================== Session tests ====================
