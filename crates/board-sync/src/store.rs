//! Trait seams for the remote document store.
//!
//! The engine talks to three backend concerns: the document row itself
//! ([`DocumentStore`]), collaborator profile lookup ([`ProfileDirectory`]),
//! and the identity of the local user ([`IdentityProvider`]). All are object
//! safe so sessions can hold `Arc<dyn …>` and tests can substitute the
//! in-memory doubles from [`crate::memory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use board_model::{DocumentData, DocumentId, DocumentPatch, RemoteDocument, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(DocumentId),
    #[error("no profile for user {0}")]
    ProfileNotFound(UserId),
    #[error("permission denied: {0}")]
    Denied(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// What the store reports back after accepting a write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReceipt {
    /// The caller's role on the document, when the store reports one. Carried
    /// for display; the engine never branches on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// One change broadcast from the store after a write, ours or anyone's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChange {
    pub data: DocumentData,
    pub updated_at: String,
}

/// What a client announces about itself on the presence channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceHeartbeat {
    pub user_id: UserId,
    /// Milliseconds since the Unix epoch.
    pub online_at: f64,
}

/// Membership notifications from a presence channel.
///
/// `Sync` carries the full current membership and may arrive at any time;
/// handling it must be idempotent.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Sync { present: HashSet<UserId> },
    Join { user_id: UserId },
    Leave { user_id: UserId },
}

/// A collaborator's directory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Stream of document changes for one subscription.
///
/// `next_change` must be cancellation safe; the session polls it inside
/// `select!` alongside the presence channel.
#[async_trait]
pub trait ChangeFeed: Send {
    /// The next broadcast change, or `None` once the subscription ends.
    async fn next_change(&mut self) -> Option<RemoteChange>;
}

/// One joined presence channel.
#[async_trait]
pub trait PresenceChannel: Send {
    /// Announce the local user to the channel.
    async fn track(&mut self, heartbeat: PresenceHeartbeat) -> Result<()>;

    /// The next membership event, or `None` once the channel ends.
    /// Must be cancellation safe, like [`ChangeFeed::next_change`].
    async fn next_event(&mut self) -> Option<PresenceEvent>;

    /// Leave the channel, notifying the other members.
    async fn leave(&mut self);
}

/// The remote row store plus its realtime channels.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, id: DocumentId) -> Result<RemoteDocument>;

    /// Replace the row's data column (and preview, when present) wholesale.
    async fn write(&self, id: DocumentId, patch: &DocumentPatch) -> Result<WriteReceipt>;

    async fn subscribe_changes(&self, id: DocumentId) -> Result<Box<dyn ChangeFeed>>;

    async fn subscribe_presence(&self, key: &str) -> Result<Box<dyn PresenceChannel>>;
}

/// Profile lookup, separate from the row store since a different backend
/// usually serves it.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn fetch_profile(&self, id: UserId) -> Result<UserProfile>;
}

/// Who is running this client. `None` means signed out; sessions stay closed.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserProfile>;
}

/// Fixed identity for tests and single-user embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<UserProfile>);

impl StaticIdentity {
    pub fn signed_in(profile: UserProfile) -> Self {
        Self(Some(profile))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserProfile> {
        self.0.clone()
    }
}

/// Presence channel name for a document. All clients of one board must
/// derive the same key.
pub fn presence_key(id: DocumentId) -> String {
    format!("presence:document:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_presence_key_is_stable_per_document() {
        let id = DocumentId::from(Uuid::nil());
        assert_eq!(
            presence_key(id),
            "presence:document:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(presence_key(id), presence_key(id));
    }

    #[test]
    fn test_remote_change_wire_names() {
        let change = RemoteChange {
            data: DocumentData::default(),
            updated_at: "v7".into(),
        };
        let json = serde_json::to_string(&change).unwrap();
        assert_eq!(json, r#"{"data":{},"updatedAt":"v7"}"#);
    }

    #[test]
    fn test_write_receipt_role_is_optional() {
        let receipt: WriteReceipt = serde_json::from_str("{}").unwrap();
        assert_eq!(receipt.role, None);

        let receipt: WriteReceipt = serde_json::from_str(r#"{"role":"editor"}"#).unwrap();
        assert_eq!(receipt.role.as_deref(), Some("editor"));
    }

    #[test]
    fn test_user_profile_wire_names() {
        let json = r#"{
            "userId": "8c2f9f1e-3c44-4d0a-9f3a-0d1b2c3d4e5f",
            "username": "ada",
            "avatarUrl": "https://example.test/a.png"
        }"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.username, "ada");
        assert_eq!(profile.email, None);
        assert!(profile.avatar_url.is_some());
    }
}
