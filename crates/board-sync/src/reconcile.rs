//! Applying remote changes to local state.
//!
//! Last writer wins, field by field: each collection present in the payload
//! replaces the local one wholesale, absent collections stay untouched. The
//! id cursors are re-derived from whatever arrived, then the surface is
//! redrawn with the viewport and placement overrides carried across. Redraw
//! failures are contained; state is already consistent by then.

use std::sync::Arc;
use tracing::{debug, error};

use board_model::{next_edge_id, next_node_id};

use crate::events::{EventBus, SessionEvent};
use crate::notify::{NoticeLevel, Notifier};
use crate::state::StateStore;
use crate::store::RemoteChange;
use crate::surface::RenderSurface;

/// What one [`UpdateReconciler::apply`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub nodes_replaced: bool,
    pub edges_replaced: bool,
    pub zones_replaced: bool,
    pub positions_replaced: bool,
    pub redraw_failed: bool,
}

/// Applies one remote change to state and surface.
pub struct UpdateReconciler {
    state: Arc<dyn StateStore>,
    surface: Option<Arc<dyn RenderSurface>>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
}

impl UpdateReconciler {
    pub fn new(
        state: Arc<dyn StateStore>,
        surface: Option<Arc<dyn RenderSurface>>,
        notifier: Arc<dyn Notifier>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            state,
            surface,
            notifier,
            events,
        }
    }

    /// Fold a remote change into local state.
    ///
    /// A present but empty collection is an explicit clear; an absent one
    /// makes no statement and leaves local data alone.
    pub fn apply(&self, change: RemoteChange) -> ApplyReport {
        let mut report = ApplyReport::default();
        let data = change.data;

        if let Some(nodes) = data.nodes {
            let next = next_node_id(&nodes);
            self.state.replace_nodes(nodes);
            self.state.set_next_node_id(next);
            report.nodes_replaced = true;
        }
        if let Some(edges) = data.edges {
            let next = next_edge_id(&edges);
            self.state.replace_edges(edges);
            self.state.set_next_edge_id(next);
            report.edges_replaced = true;
        }
        if let Some(zones) = data.zones {
            self.state.replace_zones(zones);
            report.zones_replaced = true;
        }
        if let Some(positions) = data.positions {
            self.state.replace_positions(positions);
            report.positions_replaced = true;
        }
        debug!(
            "Applied remote update {} (nodes: {}, edges: {}, zones: {}, positions: {})",
            change.updated_at,
            report.nodes_replaced,
            report.edges_replaced,
            report.zones_replaced,
            report.positions_replaced
        );

        if let Some(surface) = &self.surface {
            if let Err(err) = self.redraw(surface.as_ref()) {
                error!("Redraw after remote update failed: {}", err);
                report.redraw_failed = true;
            }
        }

        self.notifier.notify(
            &format!("Board updated ({})", change.updated_at),
            NoticeLevel::Info,
        );
        self.events.emit(SessionEvent::RemoteApplied {
            updated_at: change.updated_at,
        });
        report
    }

    /// Redraw from current state, keeping the camera where the user left it
    /// and replaying placement overrides on top of the fresh layout.
    fn redraw(&self, surface: &dyn RenderSurface) -> crate::surface::Result<()> {
        let viewport = surface.viewport()?;
        surface.set_data(&self.state.nodes(), &self.state.edges())?;
        surface.move_to(viewport)?;
        for (id, position) in self.state.positions() {
            surface.move_node(id, position)?;
        }
        Ok(())
    }
}

// ==================== Reconciler tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::state::SharedState;
    use crate::surface::{FrameCapture, InMemorySurface, RenderError, Viewport};
    use board_model::{
        DocumentData, Edge, EdgeId, Node, NodeId, Position, PositionMap,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn node(id: u64, title: &str) -> Node {
        Node {
            id: NodeId::from(id),
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn edge(id: u64, from: u64, to: u64) -> Edge {
        Edge {
            id: EdgeId::from(id),
            from: NodeId::from(from),
            to: NodeId::from(to),
            ..Default::default()
        }
    }

    fn change(data: DocumentData) -> RemoteChange {
        RemoteChange {
            data,
            updated_at: "v7".to_string(),
        }
    }

    struct Fixture {
        state: Arc<SharedState>,
        surface: Arc<InMemorySurface>,
        notifier: Arc<RecordingNotifier>,
        reconciler: UpdateReconciler,
    }

    fn fixture() -> Fixture {
        let state = Arc::new(SharedState::new());
        let surface = Arc::new(InMemorySurface::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let events = Arc::new(EventBus::new());
        let reconciler = UpdateReconciler::new(
            Arc::clone(&state) as Arc<dyn StateStore>,
            Some(Arc::clone(&surface) as Arc<dyn RenderSurface>),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            events,
        );
        Fixture {
            state,
            surface,
            notifier,
            reconciler,
        }
    }

    #[test]
    fn test_absent_fields_leave_state_alone() {
        let f = fixture();
        f.state.replace_edges(vec![edge(1, 1, 2)]);

        let report = f.reconciler.apply(change(DocumentData {
            nodes: Some(vec![node(1, "a"), node(2, "b")]),
            ..Default::default()
        }));

        assert!(report.nodes_replaced);
        assert!(!report.edges_replaced);
        assert_eq!(f.state.edges(), vec![edge(1, 1, 2)]);
        assert_eq!(f.state.nodes().len(), 2);
    }

    #[test]
    fn test_present_empty_collection_clears() {
        let f = fixture();
        f.state.replace_nodes(vec![node(1, "a")]);

        f.reconciler.apply(change(DocumentData {
            nodes: Some(vec![]),
            ..Default::default()
        }));

        assert!(f.state.nodes().is_empty());
        assert_eq!(f.state.next_node_id(), NodeId::from(1));
    }

    #[test]
    fn test_cursors_recomputed_from_payload() {
        let f = fixture();
        f.reconciler.apply(change(DocumentData {
            nodes: Some(vec![node(3, "a"), node(9, "b")]),
            edges: Some(vec![edge(4, 3, 9)]),
            ..Default::default()
        }));

        assert_eq!(f.state.next_node_id(), NodeId::from(10));
        assert_eq!(f.state.next_edge_id(), EdgeId::from(5));
    }

    #[test]
    fn test_redraw_preserves_viewport_and_replays_positions() {
        let f = fixture();
        let viewport = Viewport {
            pan: Position::new(-40.0, 12.0),
            scale: 1.5,
        };
        f.surface.move_to(viewport).unwrap();

        let mut positions = PositionMap::new();
        positions.insert(NodeId::from(1), Position::new(100.0, 50.0));
        f.reconciler.apply(change(DocumentData {
            nodes: Some(vec![node(1, "a")]),
            positions: Some(positions),
            ..Default::default()
        }));

        assert_eq!(f.surface.viewport().unwrap(), viewport);
        assert_eq!(f.surface.nodes().len(), 1);
        assert_eq!(
            f.surface.positions().unwrap().get(&NodeId::from(1)),
            Some(&Position::new(100.0, 50.0))
        );
    }

    #[test]
    fn test_stale_position_override_is_dropped() {
        let f = fixture();
        let mut positions = PositionMap::new();
        positions.insert(NodeId::from(1), Position::new(1.0, 1.0));
        positions.insert(NodeId::from(42), Position::new(2.0, 2.0));

        f.reconciler.apply(change(DocumentData {
            nodes: Some(vec![node(1, "a")]),
            positions: Some(positions),
            ..Default::default()
        }));

        let placed = f.surface.positions().unwrap();
        assert_eq!(placed.len(), 1);
        assert!(placed.contains_key(&NodeId::from(1)));
    }

    #[test]
    fn test_notice_and_event_carry_the_stamp() {
        let f = fixture();
        let events = Arc::new(EventBus::new());
        let applied = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&applied);
        let _sub = events.subscribe(move |event| {
            if let SessionEvent::RemoteApplied { updated_at } = event {
                assert_eq!(updated_at, "v7");
                count.fetch_add(1, Ordering::Relaxed);
            }
        });
        let reconciler = UpdateReconciler::new(
            Arc::clone(&f.state) as Arc<dyn StateStore>,
            None,
            Arc::clone(&f.notifier) as Arc<dyn Notifier>,
            events,
        );

        reconciler.apply(change(DocumentData::default()));

        assert_eq!(applied.load(Ordering::Relaxed), 1);
        let notices = f.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, "Board updated (v7)");
        assert_eq!(notices[0].1, NoticeLevel::Info);
    }

    #[test]
    fn test_empty_payload_replaces_nothing_but_still_notifies() {
        let f = fixture();
        f.state.replace_nodes(vec![node(1, "a")]);

        let report = f.reconciler.apply(change(DocumentData::default()));

        assert_eq!(report, ApplyReport::default());
        assert_eq!(f.state.nodes().len(), 1);
        assert_eq!(f.notifier.notices().len(), 1);
    }

    /// Surface that fails every call, as a detached view would.
    struct FailingSurface;

    impl RenderSurface for FailingSurface {
        fn positions(&self) -> crate::surface::Result<PositionMap> {
            Err(RenderError::Unavailable("detached".to_string()))
        }

        fn set_data(&self, _nodes: &[Node], _edges: &[Edge]) -> crate::surface::Result<()> {
            Err(RenderError::Draw("no canvas".to_string()))
        }

        fn move_node(
            &self,
            _id: NodeId,
            _position: Position,
        ) -> crate::surface::Result<()> {
            Err(RenderError::Draw("no canvas".to_string()))
        }

        fn viewport(&self) -> crate::surface::Result<Viewport> {
            Err(RenderError::Unavailable("detached".to_string()))
        }

        fn move_to(&self, _viewport: Viewport) -> crate::surface::Result<()> {
            Err(RenderError::Draw("no canvas".to_string()))
        }

        fn capture_frame(&self) -> Option<FrameCapture> {
            None
        }
    }

    #[test]
    fn test_redraw_failure_is_contained() {
        let state = Arc::new(SharedState::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let reconciler = UpdateReconciler::new(
            Arc::clone(&state) as Arc<dyn StateStore>,
            Some(Arc::new(FailingSurface) as Arc<dyn RenderSurface>),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::new(EventBus::new()),
        );

        let report = reconciler.apply(change(DocumentData {
            nodes: Some(vec![node(1, "a")]),
            ..Default::default()
        }));

        assert!(report.redraw_failed);
        // State was already replaced and the update is still announced.
        assert_eq!(state.nodes().len(), 1);
        assert_eq!(notifier.notices().len(), 1);
    }

    #[test]
    fn test_headless_apply_without_surface() {
        let state = Arc::new(SharedState::new());
        let reconciler = UpdateReconciler::new(
            Arc::clone(&state) as Arc<dyn StateStore>,
            None,
            Arc::new(crate::notify::NoopNotifier) as Arc<dyn Notifier>,
            Arc::new(EventBus::new()),
        );

        let report = reconciler.apply(change(DocumentData {
            positions: Some(HashMap::new()),
            ..Default::default()
        }));

        assert!(report.positions_replaced);
        assert!(!report.redraw_failed);
    }
}
