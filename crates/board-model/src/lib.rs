//! Data model for shared graph boards.
//!
//! Defines the wire shapes a board document takes in the remote store, the
//! lenient id handling that tolerates historical payload quirks, and the
//! materialized [`GraphState`] clients edit locally.

pub mod document;
pub mod ids;
pub mod state;

pub use document::{
    DocumentData, DocumentId, DocumentPatch, Edge, Node, Position, PositionMap, RemoteDocument,
    UserId, Zone,
};
pub use ids::{next_edge_id, next_id, next_node_id, EdgeId, NodeId};
pub use state::GraphState;
