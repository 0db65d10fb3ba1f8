//! Wire shapes for the shared board document.
//!
//! Everything here mirrors the remote row. The `data` column's fields may be
//! individually absent (older clients write partial rows), and node/edge
//! records carry unknown fields through a flatten so a wholesale replacement
//! never strips what another client stored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

use crate::ids::{EdgeId, NodeId};

/// Identifier of one shared board document (the remote row's primary key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// A fresh random document id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DocumentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identifier of a collaborator, as issued by the auth provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// A fresh random user id. Real ids come from the auth provider; this is
    /// for fixtures and local experiments.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A node on the board.
///
/// Fields this crate doesn't model ride along in `extra`, untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: EdgeId,
    #[serde(default)]
    pub from: NodeId,
    #[serde(default)]
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Free-form spatial annotation. The engine transports zones verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Zone(pub Value);

/// A node's placement on the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Placement overrides keyed by node id. Entries for ids that no longer
/// exist are harmless; restore skips them.
pub type PositionMap = HashMap<NodeId, Position>;

/// The `data` column of the remote row.
///
/// Every field is optional on the wire: an absent field makes no statement
/// about that collection and leaves local state alone, while a present but
/// empty collection explicitly clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<Edge>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<Zone>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<PositionMap>,
}

impl DocumentData {
    /// True when the payload makes no statement about any collection.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_none()
            && self.edges.is_none()
            && self.zones.is_none()
            && self.positions.is_none()
    }
}

/// One remote row, as returned by a read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub id: DocumentId,
    pub name: String,
    #[serde(default)]
    pub data: DocumentData,
    /// The store's own recency stamp, carried verbatim. Displayed to users,
    /// never parsed or compared by the engine.
    pub updated_at: String,
}

/// Write payload: replacement data plus an optional preview thumbnail
/// (a `data:` URL rendered by the persistence gateway).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub data: DocumentData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}
