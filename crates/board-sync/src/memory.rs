//! In-memory store backend.
//!
//! Implements the full store surface over process-local maps and channels:
//! row writes broadcast to every change subscription (writer included, like
//! the real backend), and presence rooms fan membership events out to every
//! joined channel. Tests drive multi-client scenarios against one shared
//! instance; heartbeat timestamps are accepted but not interpreted.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use board_model::{DocumentData, DocumentId, DocumentPatch, RemoteDocument, UserId};

use crate::store::{
    ChangeFeed, DocumentStore, PresenceChannel, PresenceEvent, PresenceHeartbeat,
    ProfileDirectory, RemoteChange, Result, StoreError, UserProfile, WriteReceipt,
};

#[derive(Debug, Clone)]
struct StoredDocument {
    name: String,
    data: DocumentData,
    preview: Option<String>,
    updated_at: String,
}

#[derive(Default)]
struct Room {
    members: HashSet<UserId>,
    subscribers: Vec<(u64, UnboundedSender<PresenceEvent>)>,
}

fn broadcast(room: &mut Room, event: PresenceEvent) {
    room.subscribers
        .retain(|(_, tx)| tx.send(event.clone()).is_ok());
}

/// Store double shared by every client in a test.
pub struct InMemoryStore {
    documents: RwLock<HashMap<DocumentId, StoredDocument>>,
    profiles: RwLock<HashMap<UserId, UserProfile>>,
    feeds: RwLock<HashMap<DocumentId, Vec<UnboundedSender<RemoteChange>>>>,
    // Arc so presence channels can clean up after the store-facing handle
    // is gone.
    rooms: Arc<RwLock<HashMap<String, Room>>>,
    writes: AtomicU64,
    clock: AtomicU64,
    fail_next_write: AtomicBool,
    sub_ids: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            feeds: RwLock::new(HashMap::new()),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            writes: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            fail_next_write: AtomicBool::new(false),
            sub_ids: AtomicU64::new(0),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty row for `id`.
    pub fn insert_document(&self, id: DocumentId, name: &str) {
        self.documents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id,
                StoredDocument {
                    name: name.to_string(),
                    data: DocumentData::default(),
                    preview: None,
                    updated_at: "v0".to_string(),
                },
            );
    }

    pub fn insert_profile(&self, profile: UserProfile) {
        self.profiles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(profile.user_id, profile);
    }

    /// Fail the next `write` call with `StoreError::Unavailable`.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::Relaxed);
    }

    /// Push a change to subscribers without touching the row, as if another
    /// client outside the test had written.
    pub fn emit_change(&self, id: DocumentId, change: RemoteChange) {
        let mut feeds = self.feeds.write().unwrap_or_else(|e| e.into_inner());
        if let Some(senders) = feeds.get_mut(&id) {
            senders.retain(|tx| tx.send(change.clone()).is_ok());
        }
    }

    /// Drop every change subscription for `id`, as if the realtime
    /// connection was lost. Subscribed feeds see their stream end.
    pub fn drop_feeds(&self, id: DocumentId) {
        self.feeds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    pub fn document_data(&self, id: DocumentId) -> Option<DocumentData> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|doc| doc.data.clone())
    }

    pub fn preview(&self, id: DocumentId) -> Option<String> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .and_then(|doc| doc.preview.clone())
    }

    pub fn updated_at(&self, id: DocumentId) -> Option<String> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|doc| doc.updated_at.clone())
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn presence_members(&self, key: &str) -> HashSet<UserId> {
        self.rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    fn tick(&self) -> String {
        format!("v{}", self.clock.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn load(&self, id: DocumentId) -> Result<RemoteDocument> {
        let documents = self.documents.read().unwrap_or_else(|e| e.into_inner());
        let doc = documents.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(RemoteDocument {
            id,
            name: doc.name.clone(),
            data: doc.data.clone(),
            updated_at: doc.updated_at.clone(),
        })
    }

    async fn write(&self, id: DocumentId, patch: &DocumentPatch) -> Result<WriteReceipt> {
        if self.fail_next_write.swap(false, Ordering::Relaxed) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let change = {
            let mut documents = self.documents.write().unwrap_or_else(|e| e.into_inner());
            let doc = documents.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            doc.data = patch.data.clone();
            if let Some(preview) = &patch.preview {
                doc.preview = Some(preview.clone());
            }
            doc.updated_at = self.tick();
            RemoteChange {
                data: doc.data.clone(),
                updated_at: doc.updated_at.clone(),
            }
        };
        self.writes.fetch_add(1, Ordering::Relaxed);

        // The writer's own subscription receives this too.
        self.emit_change(id, change);

        Ok(WriteReceipt {
            role: Some("editor".to_string()),
        })
    }

    async fn subscribe_changes(&self, id: DocumentId) -> Result<Box<dyn ChangeFeed>> {
        if !self
            .documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
        {
            return Err(StoreError::NotFound(id));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id)
            .or_default()
            .push(tx);
        Ok(Box::new(InMemoryChangeFeed { rx }))
    }

    async fn subscribe_presence(&self, key: &str) -> Result<Box<dyn PresenceChannel>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub_id = self.sub_ids.fetch_add(1, Ordering::Relaxed);
        {
            let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
            let room = rooms.entry(key.to_string()).or_default();
            // Joining clients get the current membership up front.
            let _ = tx.send(PresenceEvent::Sync {
                present: room.members.clone(),
            });
            room.subscribers.push((sub_id, tx));
        }
        Ok(Box::new(InMemoryPresenceChannel {
            key: key.to_string(),
            rooms: Arc::clone(&self.rooms),
            rx,
            tracked: None,
            sub_id,
        }))
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryStore {
    async fn fetch_profile(&self, id: UserId) -> Result<UserProfile> {
        self.profiles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or(StoreError::ProfileNotFound(id))
    }
}

struct InMemoryChangeFeed {
    rx: UnboundedReceiver<RemoteChange>,
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn next_change(&mut self) -> Option<RemoteChange> {
        self.rx.recv().await
    }
}

struct InMemoryPresenceChannel {
    key: String,
    rooms: Arc<RwLock<HashMap<String, Room>>>,
    rx: UnboundedReceiver<PresenceEvent>,
    tracked: Option<UserId>,
    sub_id: u64,
}

impl InMemoryPresenceChannel {
    fn depart(&mut self) {
        let user_id = self.tracked.take();
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let Some(room) = rooms.get_mut(&self.key) else {
            return;
        };
        if let Some(user_id) = user_id {
            if room.members.remove(&user_id) {
                broadcast(room, PresenceEvent::Leave { user_id });
                broadcast(
                    room,
                    PresenceEvent::Sync {
                        present: room.members.clone(),
                    },
                );
            }
        }
        room.subscribers.retain(|(id, _)| *id != self.sub_id);
    }
}

#[async_trait]
impl PresenceChannel for InMemoryPresenceChannel {
    async fn track(&mut self, heartbeat: PresenceHeartbeat) -> Result<()> {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let room = rooms.entry(self.key.clone()).or_default();
        if room.members.insert(heartbeat.user_id) {
            broadcast(
                room,
                PresenceEvent::Join {
                    user_id: heartbeat.user_id,
                },
            );
            broadcast(
                room,
                PresenceEvent::Sync {
                    present: room.members.clone(),
                },
            );
        }
        self.tracked = Some(heartbeat.user_id);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<PresenceEvent> {
        self.rx.recv().await
    }

    async fn leave(&mut self) {
        self.depart();
    }
}

impl Drop for InMemoryPresenceChannel {
    fn drop(&mut self) {
        self.depart();
    }
}

// ==================== InMemoryStore tests ====================
