//! Collaborator roster.
//!
//! Presence events from the channel drive a roster of everyone seen on the
//! board this session. Collaborators go unknown to online to offline and
//! stay listed once offline, so the UI can gray them out instead of having
//! them vanish. Profiles are fetched lazily on first sighting; the local
//! user is filtered out everywhere.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use board_model::UserId;

use crate::events::{EventBus, SessionEvent};
use crate::store::{PresenceEvent, ProfileDirectory, UserProfile};

/// How many collaborators the roster view lists before collapsing the rest
/// into an overflow count.
pub const ROSTER_DISPLAY_MAX: usize = 4;

/// One person seen on the board this session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: UserId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub is_online: bool,
    /// When we last saw this collaborator's state change, in milliseconds
    /// since the Unix epoch.
    pub last_seen: f64,
}

impl Collaborator {
    fn from_profile(profile: UserProfile, timestamp: f64) -> Self {
        Self {
            user_id: profile.user_id,
            username: profile.username,
            email: profile.email,
            avatar_url: profile.avatar_url,
            is_online: true,
            last_seen: timestamp,
        }
    }
}

/// Roster capped for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterView {
    pub shown: Vec<Collaborator>,
    /// How many collaborators were cut off by the cap.
    pub overflow: usize,
}

/// Insertion-ordered list of collaborators, excluding the local user.
pub struct PresenceRoster {
    local_user: UserId,
    entries: RwLock<Vec<Collaborator>>,
}

impl PresenceRoster {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn local_user(&self) -> UserId {
        self.local_user
    }

    /// Add a newly seen collaborator as online. Returns false for the local
    /// user and for anyone already listed.
    pub fn insert_online(&self, profile: UserProfile, timestamp: f64) -> bool {
        if profile.user_id == self.local_user {
            return false;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.iter().any(|c| c.user_id == profile.user_id) {
            return false;
        }
        entries.push(Collaborator::from_profile(profile, timestamp));
        true
    }

    /// Flip a listed collaborator online. Returns whether anything changed.
    pub fn mark_online(&self, user_id: UserId, timestamp: f64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|c| c.user_id == user_id) {
            Some(entry) if !entry.is_online => {
                entry.is_online = true;
                entry.last_seen = timestamp;
                true
            }
            _ => false,
        }
    }

    /// Flip a listed collaborator offline. The entry stays listed; unknown
    /// ids are ignored.
    pub fn mark_offline(&self, user_id: UserId, timestamp: f64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|c| c.user_id == user_id) {
            Some(entry) if entry.is_online => {
                entry.is_online = false;
                entry.last_seen = timestamp;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|c| c.user_id == user_id)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|c| c.user_id == user_id && c.is_online)
    }

    pub fn online_ids(&self) -> HashSet<UserId> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.is_online)
            .map(|c| c.user_id)
            .collect()
    }

    /// All entries in first-seen order.
    pub fn snapshot(&self) -> Vec<Collaborator> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The first `max` entries plus a count of the rest.
    pub fn display(&self, max: usize) -> RosterView {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        RosterView {
            shown: entries.iter().take(max).cloned().collect(),
            overflow: entries.len().saturating_sub(max),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Returns whether any were listed.
    pub fn clear(&self) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let had_entries = !entries.is_empty();
        entries.clear();
        had_entries
    }
}

/// Applies presence events to a roster, fetching profiles as needed.
pub struct PresenceTracker {
    roster: Arc<PresenceRoster>,
    profiles: Arc<dyn ProfileDirectory>,
    events: Arc<EventBus>,
}

impl PresenceTracker {
    pub fn new(
        roster: Arc<PresenceRoster>,
        profiles: Arc<dyn ProfileDirectory>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            roster,
            profiles,
            events,
        }
    }

    /// Apply one channel event. Emits `RosterChanged` when the roster
    /// actually moved, so repeated syncs stay quiet.
    pub async fn handle(&self, event: PresenceEvent, timestamp: f64) {
        let changed = match event {
            PresenceEvent::Sync { present } => self.on_sync(&present, timestamp).await,
            PresenceEvent::Join { user_id } => self.on_join(user_id, timestamp).await,
            PresenceEvent::Leave { user_id } => self.roster.mark_offline(user_id, timestamp),
        };
        if changed {
            debug!("Roster changed ({} collaborators)", self.roster.len());
            self.events.emit(SessionEvent::RosterChanged);
        }
    }

    /// Drop everyone from the roster, emitting `RosterChanged` when it held
    /// anyone. Part of channel teardown.
    pub fn clear_roster(&self) {
        if self.roster.clear() {
            self.events.emit(SessionEvent::RosterChanged);
        }
    }

    /// Reconcile against a full membership list. Everyone present comes
    /// online, every listed collaborator absent from it goes offline.
    async fn on_sync(&self, present: &HashSet<UserId>, timestamp: f64) -> bool {
        let mut changed = false;
        for &user_id in present {
            if user_id == self.roster.local_user() {
                continue;
            }
            changed |= self.bring_online(user_id, timestamp).await;
        }
        for user_id in self.roster.online_ids() {
            if !present.contains(&user_id) {
                changed |= self.roster.mark_offline(user_id, timestamp);
            }
        }
        changed
    }

    async fn on_join(&self, user_id: UserId, timestamp: f64) -> bool {
        if user_id == self.roster.local_user() {
            return false;
        }
        self.bring_online(user_id, timestamp).await
    }

    /// Known collaborators flip online without a lookup; unknown ones get a
    /// profile fetch first. A failed fetch leaves them off the roster until
    /// the next event names them again.
    async fn bring_online(&self, user_id: UserId, timestamp: f64) -> bool {
        if self.roster.contains(user_id) {
            return self.roster.mark_online(user_id, timestamp);
        }
        match self.profiles.fetch_profile(user_id).await {
            Ok(profile) => self.roster.insert_online(profile, timestamp),
            Err(err) => {
                warn!("Profile lookup failed for {}: {}", user_id, err);
                false
            }
        }
    }
}

// ==================== Presence tests ====================
