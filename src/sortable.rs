//! Contract of the external drag library, plus a headless implementation of it.
//!
//! The library owns gesture handling and mutates the live surface directly on
//! drop, *before* `on_end` fires. Adapters must cope with that.

use crate::surface::SharedSurface;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SortableError {
    #[error("Container {0} is not mounted")]
    UnknownContainer(i32),

    #[error("Container {0} already has a sortable instance")]
    AlreadyAttached(i32),

    #[error("Item {0} is not on the surface")]
    UnknownItem(i32),

    #[error("Container {0} is not sortable")]
    NotSortable(i32),

    #[error("Cannot move from container {from} to {to}: groups do not allow it")]
    GroupMismatch { from: i32, to: i32 },
}

// * Options ..................................................................

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOptions {
    pub name: String,
    #[serde(default = "yes")]
    pub pull: bool,
    #[serde(default = "yes")]
    pub put: bool,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SortableOptions {
    pub group: GroupOptions,
    pub animation_ms: u32,
    pub swap_threshold: f32,
    /// Distance in pixels at which an empty list still accepts a drop.
    pub empty_insert_threshold: u32,
    pub ghost_class: String,
    pub chosen_class: String,
    pub drag_class: String,
}

impl Default for SortableOptions {
    fn default() -> Self {
        Self {
            group: GroupOptions {
                name: "rcr-nested".to_string(),
                pull: true,
                put: true,
            },
            animation_ms: 150,
            swap_threshold: 0.65,
            empty_insert_threshold: 50,
            ghost_class: "rcr-ghost".to_string(),
            chosen_class: "rcr-chosen".to_string(),
            drag_class: "rcr-drag".to_string(),
        }
    }
}

// * Events ...................................................................

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragStartEvent {
    pub item_id: i32,
    pub from: i32,
    pub old_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragEndEvent {
    pub item_id: i32,
    pub from: i32,
    pub to: i32,
    pub old_index: usize,
    /// Index in the destination as the library left it.
    pub new_index: usize,
}

pub struct DragHandlers {
    pub on_start: Box<dyn FnMut(&DragStartEvent)>,
    pub on_end: Box<dyn FnMut(&DragEndEvent)>,
}

impl fmt::Debug for DragHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DragHandlers").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

pub trait DragLibrary {
    /// Makes `container` sortable.
    fn create(
        &mut self,
        container: i32,
        options: SortableOptions,
        handlers: DragHandlers,
    ) -> Result<InstanceId, SortableError>;

    /// Unregisters an instance. Returns false if it was already gone.
    fn destroy(&mut self, instance: InstanceId) -> bool;

    fn instance_on(&self, container: i32) -> Option<InstanceId>;
}

// * Headless implementation ..................................................

#[derive(Debug)]
struct Instance {
    container: i32,
    options: SortableOptions,
    handlers: DragHandlers,
}

/// In-memory drag library working against a [`SharedSurface`].
#[derive(Debug)]
pub struct HeadlessSortable {
    surface: SharedSurface,
    instances: BTreeMap<InstanceId, Instance>,
    next_id: u64,
}

impl HeadlessSortable {
    pub fn new(surface: SharedSurface) -> Self {
        Self {
            surface,
            instances: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn options(&self, instance: InstanceId) -> Option<&SortableOptions> {
        self.instances.get(&instance).map(|i| &i.options)
    }

    /// Performs a complete gesture: pick up `item`, drop it into `to` at `new_index`.
    ///
    /// The surface is spliced before `on_end` runs, the same way a browser library
    /// moves the element for visual feedback.
    pub fn drag(
        &mut self,
        item: i32,
        to: i32,
        new_index: usize,
    ) -> Result<DragEndEvent, SortableError> {
        let (from, old_index) = self
            .surface
            .borrow()
            .locate(item)
            .ok_or(SortableError::UnknownItem(item))?;

        let source = self.instance_on(from).ok_or(SortableError::NotSortable(from))?;
        let target = self.instance_on(to).ok_or(SortableError::NotSortable(to))?;

        if source != target {
            let src = &self.instances[&source].options.group;
            let dst = &self.instances[&target].options.group;
            if src.name != dst.name || !src.pull || !dst.put {
                return Err(SortableError::GroupMismatch { from, to });
            }
        }

        let start = DragStartEvent {
            item_id: item,
            from,
            old_index,
        };
        if let Some(instance) = self.instances.get_mut(&source) {
            (instance.handlers.on_start)(&start);
        }

        let new_index = {
            let mut surface = self.surface.borrow_mut();
            surface.take(from, old_index);
            let len = surface.items(to).map_or(0, <[i32]>::len);
            let at = new_index.min(len);
            surface.put(to, at, item);
            at
        };

        let end = DragEndEvent {
            item_id: item,
            from,
            to,
            old_index,
            new_index,
        };
        debug!("Drop of {} from {} to {} at {}", item, from, to, new_index);
        if let Some(instance) = self.instances.get_mut(&source) {
            (instance.handlers.on_end)(&end);
        }

        Ok(end)
    }
}

impl DragLibrary for HeadlessSortable {
    fn create(
        &mut self,
        container: i32,
        options: SortableOptions,
        handlers: DragHandlers,
    ) -> Result<InstanceId, SortableError> {
        if self.surface.borrow().container(container).is_none() {
            return Err(SortableError::UnknownContainer(container));
        }
        if self.instance_on(container).is_some() {
            return Err(SortableError::AlreadyAttached(container));
        }

        let id = InstanceId(self.next_id);
        self.next_id += 1;
        self.instances.insert(
            id,
            Instance {
                container,
                options,
                handlers,
            },
        );
        Ok(id)
    }

    fn destroy(&mut self, instance: InstanceId) -> bool {
        self.instances.remove(&instance).is_some()
    }

    fn instance_on(&self, container: i32) -> Option<InstanceId> {
        self.instances
            .iter()
            .find(|(_, i)| i.container == container)
            .map(|(id, _)| *id)
    }
}
