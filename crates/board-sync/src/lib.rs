//! board-sync: collaborative synchronization engine for shared graph boards.
//!
//! This crate provides the realtime core for multi-user board editing:
//! - Debounced, forced, and silent persistence of local state to a remote store
//! - Last-writer-wins reconciliation of remote changes with echo suppression
//! - Presence tracking with a display-ready collaborator roster
//! - Trait seams for the store, identity, rendering surface, and state,
//!   with in-memory doubles for all of them

pub mod cache;
pub mod debounce;
pub mod echo;
pub mod events;
pub mod gateway;
pub mod memory;
pub mod notify;
pub mod presence;
pub mod preview;
pub mod reconcile;
pub mod session;
pub mod state;
pub mod store;
pub mod surface;

pub use cache::{CacheError, CachedSnapshot, FileSnapshotCache, InMemoryCache, SnapshotCache};
pub use debounce::Debouncer;
pub use echo::{EchoFilter, ECHO_WINDOW};
pub use events::{EventBus, SessionEvent, Subscription};
pub use gateway::{GatewayConfig, PersistenceGateway, SaveError, SaveOptions, SAVE_DELAY};
pub use memory::InMemoryStore;
pub use notify::{NoopNotifier, Notifier, NoticeLevel, RecordingNotifier};
pub use presence::{
    Collaborator, PresenceRoster, PresenceTracker, RosterView, ROSTER_DISPLAY_MAX,
};
pub use preview::{
    encode_preview, encode_preview_with, PreviewError, PREVIEW_MAX_WIDTH, PREVIEW_QUALITY,
};
pub use reconcile::{ApplyReport, UpdateReconciler};
pub use session::{load_board, LoadedBoard, SessionError, SessionState, SyncSession};
pub use state::{SharedState, StateStore};
pub use store::{
    presence_key, ChangeFeed, DocumentStore, IdentityProvider, PresenceChannel, PresenceEvent,
    PresenceHeartbeat, ProfileDirectory, RemoteChange, StaticIdentity, StoreError, UserProfile,
    WriteReceipt,
};
pub use surface::{FrameCapture, InMemorySurface, RenderError, RenderSurface, Viewport};
