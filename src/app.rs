//! Wires store, sync controller, render layer and drag library onto one event queue.

use crate::adapter::{MoveIntent, MoveSink};
use crate::config::ReorderConfig;
use crate::render::{render_text, save_enabled, RenderLayer};
use crate::sortable::{DragEndEvent, HeadlessSortable, SortableError};
use crate::store::TreeStore;
use crate::surface::Surface;
use crate::sync::{SyncController, SyncError, TermsRemote};
use crate::tree::TreeError;
use std::cell::RefCell;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::warn;

pub struct ReorderApp<R> {
    config: ReorderConfig,
    store: RefCell<TreeStore>,
    controller: SyncController<R>,
    render: RenderLayer<HeadlessSortable>,
    intents: UnboundedReceiver<MoveIntent>,
    rejected: Vec<TreeError>,
}

impl<R: TermsRemote> ReorderApp<R> {
    pub fn new(config: ReorderConfig, remote: R) -> Self {
        let (tx, intents) = mpsc::unbounded_channel();
        let surface = Surface::shared();
        let render = RenderLayer::new(
            surface.clone(),
            HeadlessSortable::new(surface),
            config.sortable.clone(),
            config.classes.clone(),
            MoveSink::channel(tx),
        );
        Self {
            config,
            store: RefCell::new(TreeStore::new()),
            controller: SyncController::new(remote),
            render,
            intents,
            rejected: Vec::new(),
        }
    }

    pub fn config(&self) -> &ReorderConfig {
        &self.config
    }

    pub fn store(&self) -> std::cell::Ref<'_, TreeStore> {
        self.store.borrow()
    }

    pub fn render_layer(&self) -> &RenderLayer<HeadlessSortable> {
        &self.render
    }

    /// Moves rejected by the tree model since the last call.
    pub fn take_rejected(&mut self) -> Vec<TreeError> {
        std::mem::take(&mut self.rejected)
    }

    /// Loads `taxonomy` and mounts it.
    pub async fn select(&mut self, taxonomy: &str) -> Result<(), SyncError> {
        let result = self.controller.select(&self.store, taxonomy).await;
        self.refresh_view();
        result
    }

    pub async fn select_default(&mut self) -> Result<(), SyncError> {
        let taxonomy = self.config.default_taxonomy().to_string();
        self.select(&taxonomy).await
    }

    /// Runs a full drag gesture on the surface. The resulting move is queued, not applied.
    pub fn drag(&mut self, id: i32, to_parent: i32, index: usize) -> Result<DragEndEvent, SortableError> {
        self.render.library_mut().drag(id, to_parent, index)
    }

    /// Drains queued moves into the store, then remounts if the structure changed.
    /// Returns how many moves were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(intent) = self.intents.try_recv() {
            let result = self.store.borrow_mut().apply_move(
                intent.id,
                intent.from_parent,
                intent.to_parent,
                Some(intent.index),
            );
            match result {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => self.rejected.push(e),
            }
        }
        self.refresh_view();
        applied
    }

    pub async fn save(&mut self) -> Result<String, SyncError> {
        let result = self.controller.save_current(&self.store).await;
        self.refresh_view();
        result
    }

    pub fn save_enabled(&self) -> bool {
        save_enabled(&self.store.borrow())
    }

    pub fn dismiss_error(&mut self) {
        self.store.borrow_mut().dismiss_error();
    }

    pub fn render_text(&self) -> String {
        render_text(&self.store.borrow())
    }

    fn refresh_view(&mut self) {
        if let Err(e) = self.render.sync(&self.store.borrow()) {
            warn!("Failed to mount drag surface: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LoadState;
    use crate::sync::tests::MockRemote;
    use crate::tree::{collect_ids, find_node, TermNode, ROOT_PARENT};

    fn app() -> ReorderApp<MockRemote> {
        let forest = vec![
            TermNode::named(1, "News", vec![]),
            TermNode::named(2, "Sport", vec![TermNode::named(3, "Tennis", vec![])]),
        ];
        ReorderApp::new(
            ReorderConfig::with_taxonomies(&["category"]).unwrap(),
            MockRemote::with_tree("category", forest),
        )
    }

    #[tokio::test]
    async fn test_drag_pump_save_cycle() {
        let mut app = app();
        app.select_default().await.unwrap();
        assert!(app.save_enabled());
        let mounted = app.render_layer().mounted_version();

        app.drag(3, ROOT_PARENT, 0).unwrap();
        // the surface shows the pre-drag order until the store re-renders
        assert_eq!(
            app.render_layer().surface().borrow().items(ROOT_PARENT),
            Some(&[1, 2][..])
        );

        assert_eq!(app.pump(), 1);
        assert_eq!(collect_ids(app.store().forest()), vec![3, 1, 2]);
        assert_ne!(app.render_layer().mounted_version(), mounted);
        assert_eq!(
            app.render_layer().surface().borrow().items(ROOT_PARENT),
            Some(&[3, 1, 2][..])
        );

        app.save().await.unwrap();
        assert_eq!(app.store().state(), LoadState::Ready);
        assert!(!app.store().is_dirty());
        assert!(app.render_text().starts_with("Order and hierarchy saved successfully!\n"));
    }

    #[tokio::test]
    async fn test_drop_into_empty_child_container() {
        let mut app = app();
        app.select("category").await.unwrap();

        app.drag(2, 1, 0).unwrap();
        app.pump();

        let store = app.store();
        let news = find_node(store.forest(), 1).unwrap();
        assert_eq!(collect_ids(&news.children), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_drop_into_own_subtree_is_rejected() {
        let mut app = app();
        app.select("category").await.unwrap();
        let before = app.store().forest().to_vec();

        // 3 is the only child of 2; its children container is empty but sortable
        app.drag(2, 3, 0).unwrap();
        assert_eq!(app.pump(), 0);

        assert_eq!(app.store().forest(), before.as_slice());
        assert_eq!(
            app.take_rejected(),
            vec![TreeError::CycleRejected { id: 2, parent: 3 }]
        );
        // the surface was restored by the adapter and nothing was remounted
        assert_eq!(
            app.render_layer().surface().borrow().items(ROOT_PARENT),
            Some(&[1, 2][..])
        );
    }

    #[tokio::test]
    async fn test_failed_load_renders_error_state() {
        let mut app = app();
        assert!(app.select("genre").await.is_err());
        assert!(!app.save_enabled());
        assert!(app.render_text().contains("Could not load terms for genre."));
        app.dismiss_error();
        assert_eq!(app.store().error(), None);
    }
}
