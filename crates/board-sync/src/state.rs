//! Application state seam.
//!
//! Embedding surfaces keep board state wherever suits them (a UI store, a
//! document model). The engine reads and replaces it through [`StateStore`],
//! with [`SharedState`] as the ready-made implementation for headless use
//! and tests.

use std::sync::RwLock;

use board_model::{DocumentData, Edge, EdgeId, GraphState, Node, NodeId, PositionMap, Zone};

/// Read/replace access to the four board collections and the id cursors.
///
/// Getters return owned snapshots so implementations are free to lock
/// however they like. Replacements are wholesale; callers re-derive the id
/// cursors afterwards.
pub trait StateStore: Send + Sync {
    fn nodes(&self) -> Vec<Node>;
    fn edges(&self) -> Vec<Edge>;
    fn zones(&self) -> Vec<Zone>;
    fn positions(&self) -> PositionMap;

    fn replace_nodes(&self, nodes: Vec<Node>);
    fn replace_edges(&self, edges: Vec<Edge>);
    fn replace_zones(&self, zones: Vec<Zone>);
    fn replace_positions(&self, positions: PositionMap);

    fn next_node_id(&self) -> NodeId;
    fn next_edge_id(&self) -> EdgeId;
    fn set_next_node_id(&self, id: NodeId);
    fn set_next_edge_id(&self, id: EdgeId);

    /// Snapshot everything as a full write payload.
    fn to_data(&self) -> DocumentData {
        DocumentData {
            nodes: Some(self.nodes()),
            edges: Some(self.edges()),
            zones: Some(self.zones()),
            positions: Some(self.positions()),
        }
    }
}

/// [`GraphState`] behind a lock.
#[derive(Debug, Default)]
pub struct SharedState {
    inner: RwLock<GraphState>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: GraphState) -> Self {
        Self {
            inner: RwLock::new(state),
        }
    }

    pub fn from_data(data: DocumentData) -> Self {
        Self::from_state(GraphState::from_data(data))
    }

    /// Run a closure against the state under the write lock. Local edits go
    /// through here so the cursor bookkeeping stays with the mutation.
    pub fn with<R>(&self, f: impl FnOnce(&mut GraphState) -> R) -> R {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn snapshot(&self) -> GraphState {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl StateStore for SharedState {
    fn nodes(&self) -> Vec<Node> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .nodes
            .clone()
    }

    fn edges(&self) -> Vec<Edge> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .edges
            .clone()
    }

    fn zones(&self) -> Vec<Zone> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .zones
            .clone()
    }

    fn positions(&self) -> PositionMap {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .positions
            .clone()
    }

    fn replace_nodes(&self, nodes: Vec<Node>) {
        self.inner.write().unwrap_or_else(|e| e.into_inner()).nodes = nodes;
    }

    fn replace_edges(&self, edges: Vec<Edge>) {
        self.inner.write().unwrap_or_else(|e| e.into_inner()).edges = edges;
    }

    fn replace_zones(&self, zones: Vec<Zone>) {
        self.inner.write().unwrap_or_else(|e| e.into_inner()).zones = zones;
    }

    fn replace_positions(&self, positions: PositionMap) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .positions = positions;
    }

    fn next_node_id(&self) -> NodeId {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .next_node_id
    }

    fn next_edge_id(&self) -> EdgeId {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .next_edge_id
    }

    fn set_next_node_id(&self, id: NodeId) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .next_node_id = id;
    }

    fn set_next_edge_id(&self, id: EdgeId) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .next_edge_id = id;
    }
}
