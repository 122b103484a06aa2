//! Maps the store's forest onto the drag surface and keeps one adapter per container.

use crate::adapter::{DragAdapter, DropZones, MoveSink};
use crate::config::ViewClasses;
use crate::sortable::{DragLibrary, SortableError, SortableOptions};
use crate::store::{LoadState, TreeStore};
use crate::surface::{ContainerKind, SharedSurface};
use crate::tree::TermNode;
use std::collections::BTreeMap;
use tracing::debug;

/// Live adapters keyed by `(parent id, version)`.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<(i32, u64), DragAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn keys(&self) -> Vec<(i32, u64)> {
        self.adapters.keys().copied().collect()
    }

    /// Registers `adapter`, disposing whatever was registered for the same container.
    pub fn insert<L: DragLibrary>(&mut self, library: &mut L, version: u64, adapter: DragAdapter) {
        let container = adapter.container();
        let stale: Vec<(i32, u64)> = self
            .adapters
            .keys()
            .filter(|(parent, _)| *parent == container)
            .copied()
            .collect();
        for key in stale {
            if let Some(old) = self.adapters.remove(&key) {
                old.dispose(library);
            }
        }
        self.adapters.insert((container, version), adapter);
    }

    pub fn dispose_all<L: DragLibrary>(&mut self, library: &mut L) {
        for (_, adapter) in std::mem::take(&mut self.adapters) {
            adapter.dispose(library);
        }
    }
}

pub struct RenderLayer<L> {
    surface: SharedSurface,
    library: L,
    registry: AdapterRegistry,
    zones: DropZones,
    options: SortableOptions,
    classes: ViewClasses,
    sink: MoveSink,
    mounted: Option<u64>,
}

impl<L: DragLibrary> RenderLayer<L> {
    pub fn new(
        surface: SharedSurface,
        library: L,
        options: SortableOptions,
        classes: ViewClasses,
        sink: MoveSink,
    ) -> Self {
        let zones = DropZones::new(&classes.armed);
        Self {
            surface,
            library,
            registry: AdapterRegistry::new(),
            zones,
            options,
            classes,
            sink,
            mounted: None,
        }
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut L {
        &mut self.library
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn drop_zones(&self) -> &DropZones {
        &self.zones
    }

    pub fn mounted_version(&self) -> Option<u64> {
        self.mounted
    }

    /// Remounts the whole surface when the store's version moved. Returns whether it did.
    pub fn sync(&mut self, store: &TreeStore) -> Result<bool, SortableError> {
        if self.mounted == Some(store.version()) {
            return Ok(false);
        }
        self.remount(store.forest(), store.version())?;
        Ok(true)
    }

    pub fn remount(&mut self, forest: &[TermNode], version: u64) -> Result<(), SortableError> {
        self.unmount();
        self.surface.borrow_mut().mount(forest, &self.classes.empty);

        let containers: Vec<(i32, ContainerKind)> = {
            let surface = self.surface.borrow();
            surface
                .container_ids()
                .into_iter()
                .filter_map(|id| surface.container(id).map(|c| (id, c.kind)))
                .collect()
        };

        for (container, kind) in containers {
            let adapter = DragAdapter::attach(
                &mut self.library,
                &self.surface,
                container,
                &self.options,
                &self.zones,
                &self.sink,
            )?;
            if let Some(adapter) = adapter {
                self.registry.insert(&mut self.library, version, adapter);
                if kind == ContainerKind::Children {
                    self.zones.register(container);
                }
            }
        }

        debug!(
            "Mounted version {} with {} sortable containers",
            version,
            self.registry.len()
        );
        self.mounted = Some(version);
        Ok(())
    }

    pub fn unmount(&mut self) {
        self.registry.dispose_all(&mut self.library);
        self.zones.clear();
        self.surface.borrow_mut().clear();
        self.mounted = None;
    }
}

/// Whether the save action is enabled.
pub fn save_enabled(store: &TreeStore) -> bool {
    store.can_save()
}

fn outline(nodes: &[TermNode], depth: usize, out: &mut String) {
    for node in nodes {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!("- {} ({})\n", node.label(), node.id));
        outline(&node.children, depth + 1, out);
    }
}

/// The forest as an indented `- Name (id)` list.
pub fn render_outline(forest: &[TermNode]) -> String {
    let mut out = String::new();
    outline(forest, 0, &mut out);
    out
}

/// Text rendering of the store: status line, notices, then the nested list.
pub fn render_text(store: &TreeStore) -> String {
    let mut out = String::new();
    if let Some(error) = store.error() {
        out.push_str(&format!("Error: {}\n", error));
    }
    if let Some(notice) = store.notice() {
        out.push_str(&format!("{}\n", notice));
    }

    let taxonomy = store.taxonomy().unwrap_or_default();
    match store.state() {
        LoadState::Idle => out.push_str("Select a taxonomy.\n"),
        LoadState::Loading => out.push_str("Loading...\n"),
        LoadState::Error if store.forest().is_empty() => {
            out.push_str(&format!("Could not load terms for {}.\n", taxonomy));
        }
        _ if store.forest().is_empty() => {
            out.push_str(&format!(
                "No terms found for {}. Add some in the admin.\n",
                taxonomy
            ));
        }
        state => {
            out.push_str(&render_outline(store.forest()));
            if state == LoadState::Saving {
                out.push_str("Saving...\n");
            }
        }
    }
    out
}
