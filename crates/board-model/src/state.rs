//! Materialized board state with monotonic id cursors.

use std::collections::HashMap;

use crate::document::{DocumentData, Edge, Node, Position, PositionMap, Zone};
use crate::ids::{next_edge_id, next_node_id, EdgeId, NodeId};

/// Everything a client holds for one open board.
///
/// The id cursors always point at the next id to hand out. They are derived
/// from the highest id currently present, so two clients that converge on the
/// same collections also converge on the same cursors.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub zones: Vec<Zone>,
    pub positions: PositionMap,
    pub next_node_id: NodeId,
    pub next_edge_id: EdgeId,
}

impl Default for GraphState {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            zones: Vec::new(),
            positions: HashMap::new(),
            next_node_id: NodeId::from(1),
            next_edge_id: EdgeId::from(1),
        }
    }
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build state from a remote payload. Absent fields start empty, and the
    /// cursors are recomputed from whatever ids the payload carried.
    pub fn from_data(data: DocumentData) -> Self {
        let mut state = Self {
            nodes: data.nodes.unwrap_or_default(),
            edges: data.edges.unwrap_or_default(),
            zones: data.zones.unwrap_or_default(),
            positions: data.positions.unwrap_or_default(),
            ..Self::default()
        };
        state.recompute_id_cursors();
        state
    }

    /// Re-derive both cursors from the current collections. Call after any
    /// wholesale replacement of nodes or edges.
    pub fn recompute_id_cursors(&mut self) {
        self.next_node_id = next_node_id(&self.nodes);
        self.next_edge_id = next_edge_id(&self.edges);
    }

    /// Hand out the next node id and advance the cursor. Saturates at
    /// `u64::MAX`.
    pub fn allocate_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id = NodeId::from(id.as_u64().saturating_add(1));
        id
    }

    /// Hand out the next edge id and advance the cursor. Saturates at
    /// `u64::MAX`.
    pub fn allocate_edge_id(&mut self) -> EdgeId {
        let id = self.next_edge_id;
        self.next_edge_id = EdgeId::from(id.as_u64().saturating_add(1));
        id
    }

    pub fn position_of(&self, id: NodeId) -> Option<Position> {
        self.positions.get(&id).copied()
    }

    /// Snapshot the collections as a full write payload. Every field is
    /// present, so a write from this snapshot replaces the remote row's data
    /// wholesale.
    pub fn to_data(&self) -> DocumentData {
        DocumentData {
            nodes: Some(self.nodes.clone()),
            edges: Some(self.edges.clone()),
            zones: Some(self.zones.clone()),
            positions: Some(self.positions.clone()),
        }
    }
}
