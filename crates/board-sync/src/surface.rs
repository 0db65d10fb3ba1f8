//! Trait seam between the engine and whatever draws the board.
//!
//! The engine never owns the canvas. It reads node placements from the
//! surface before a save, and replays data plus placements into it after a
//! remote update. Surfaces are allowed to fail (detached views, disposed
//! canvases); callers treat those failures as non-fatal.

use std::sync::RwLock;
use thiserror::Error;

use board_model::{Edge, Node, NodeId, Position, PositionMap};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render surface unavailable: {0}")]
    Unavailable(String),
    #[error("draw failed: {0}")]
    Draw(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Camera state of the board view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub pan: Position,
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: Position::default(),
            scale: 1.0,
        }
    }
}

/// A raw RGBA frame grabbed from the surface, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCapture {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// What the engine needs from a board renderer.
pub trait RenderSurface: Send + Sync {
    /// Current node placements, as arranged by the user.
    fn positions(&self) -> Result<PositionMap>;

    /// Replace the drawn graph wholesale. Implementations lay nodes out from
    /// scratch; the engine replays placement overrides afterwards.
    fn set_data(&self, nodes: &[Node], edges: &[Edge]) -> Result<()>;

    /// Move one node. Unknown ids are a silent no-op, since placement
    /// overrides can outlive the node they referred to.
    fn move_node(&self, id: NodeId, position: Position) -> Result<()>;

    fn viewport(&self) -> Result<Viewport>;

    /// Restore a previously read camera state.
    fn move_to(&self, viewport: Viewport) -> Result<()>;

    /// Grab the current frame for preview rendering. `None` when the surface
    /// has nothing to show (headless, not yet laid out).
    fn capture_frame(&self) -> Option<FrameCapture>;
}

#[derive(Debug, Default)]
struct SurfaceState {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    positions: PositionMap,
    viewport: Viewport,
    frame: Option<FrameCapture>,
    moves: Vec<(NodeId, Position)>,
}

/// Surface double that records what the engine drew.
///
/// `set_data` drops all placements, the way a real canvas re-layout does, so
/// tests can observe the engine replaying overrides afterwards.
#[derive(Debug, Default)]
pub struct InMemorySurface {
    state: RwLock<SurfaceState>,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SurfaceState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SurfaceState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Simulate the user dragging nodes around.
    pub fn place_node(&self, id: NodeId, position: Position) {
        self.write().positions.insert(id, position);
    }

    /// Stage a frame for the next `capture_frame` call.
    pub fn set_frame(&self, frame: FrameCapture) {
        self.write().frame = Some(frame);
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.read().nodes.clone()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.read().edges.clone()
    }

    /// Every `move_node` call observed, in order, including ones that were
    /// dropped for unknown ids.
    pub fn moves(&self) -> Vec<(NodeId, Position)> {
        self.read().moves.clone()
    }
}

impl RenderSurface for InMemorySurface {
    fn positions(&self) -> Result<PositionMap> {
        Ok(self.read().positions.clone())
    }

    fn set_data(&self, nodes: &[Node], edges: &[Edge]) -> Result<()> {
        let mut state = self.write();
        state.nodes = nodes.to_vec();
        state.edges = edges.to_vec();
        state.positions.clear();
        Ok(())
    }

    fn move_node(&self, id: NodeId, position: Position) -> Result<()> {
        let mut state = self.write();
        state.moves.push((id, position));
        if state.nodes.iter().any(|node| node.id == id) {
            state.positions.insert(id, position);
        }
        Ok(())
    }

    fn viewport(&self) -> Result<Viewport> {
        Ok(self.read().viewport)
    }

    fn move_to(&self, viewport: Viewport) -> Result<()> {
        self.write().viewport = viewport;
        Ok(())
    }

    fn capture_frame(&self) -> Option<FrameCapture> {
        self.read().frame.clone()
    }
}
