//! Binds one drag library instance to one container and turns its raw events
//! into [`MoveIntent`]s.
//!
//! On drop the library has already moved the element on the surface. The adapter
//! puts it back where it came from before emitting anything, so the only change
//! of record is the one that flows through the tree store and the next render.

use crate::sortable::{
    DragEndEvent, DragHandlers, DragLibrary, DragStartEvent, InstanceId, SortableError,
    SortableOptions,
};
use crate::surface::{ContainerKind, SharedSurface, Surface};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Normalized drop: move `id` from `from_parent` to `to_parent` at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveIntent {
    pub id: i32,
    pub from_parent: i32,
    pub to_parent: i32,
    pub index: usize,
}

impl From<&DragEndEvent> for MoveIntent {
    fn from(event: &DragEndEvent) -> Self {
        Self {
            id: event.item_id,
            from_parent: event.from,
            to_parent: event.to,
            index: event.new_index,
        }
    }
}

/// Where adapters deliver their intents.
#[derive(Clone)]
pub struct MoveSink(Rc<dyn Fn(MoveIntent)>);

impl MoveSink {
    pub fn new(f: impl Fn(MoveIntent) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Queues intents on the UI event channel.
    pub fn channel(tx: UnboundedSender<MoveIntent>) -> Self {
        Self::new(move |intent| {
            if tx.send(intent).is_err() {
                warn!("Event queue closed, dropping move of term {}", intent.id);
            }
        })
    }

    pub fn emit(&self, intent: MoveIntent) {
        (self.0)(intent)
    }
}

impl fmt::Debug for MoveSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MoveSink")
    }
}

/// The set of mounted children containers that light up while a drag is in progress.
///
/// Owned by the render layer; adapters only hold a handle for broadcasting.
#[derive(Debug, Clone)]
pub struct DropZones {
    zones: Rc<RefCell<BTreeSet<i32>>>,
    armed_class: Rc<str>,
}

impl DropZones {
    pub fn new(armed_class: &str) -> Self {
        Self {
            zones: Rc::new(RefCell::new(BTreeSet::new())),
            armed_class: Rc::from(armed_class),
        }
    }

    pub fn register(&self, container: i32) {
        self.zones.borrow_mut().insert(container);
    }

    pub fn clear(&self) {
        self.zones.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.zones.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.borrow().is_empty()
    }

    pub fn arm(&self, surface: &mut Surface) {
        for zone in self.zones.borrow().iter() {
            surface.add_class(*zone, &self.armed_class);
        }
    }

    pub fn disarm(&self, surface: &mut Surface) {
        for zone in self.zones.borrow().iter() {
            surface.remove_class(*zone, &self.armed_class);
        }
    }
}

/// Undoes the library's splice: lift the item out of the destination and put it
/// back at its original index in the source container.
fn revert_splice(surface: &mut Surface, event: &DragEndEvent) -> bool {
    let at_reported = surface
        .items(event.to)
        .and_then(|items| items.get(event.new_index))
        .is_some_and(|&id| id == event.item_id);

    let taken = if at_reported {
        surface.take(event.to, event.new_index)
    } else {
        // library reported a stale index; find the element wherever it landed
        surface
            .locate(event.item_id)
            .and_then(|(container, index)| surface.take(container, index))
    };

    match taken {
        Some(item) => surface.put(event.from, event.old_index, item),
        None => false,
    }
}

#[derive(Debug)]
pub struct DragAdapter {
    container: i32,
    instance: InstanceId,
}

impl DragAdapter {
    /// Attaches drag behaviour to `container`.
    ///
    /// Returns `Ok(None)` for an empty root list, which has nothing to drag and
    /// does not need to act as a drop target. Children containers are always
    /// attached, even when empty. Any instance already living on the container is
    /// destroyed first.
    pub fn attach<L: DragLibrary>(
        library: &mut L,
        surface: &SharedSurface,
        container: i32,
        options: &SortableOptions,
        zones: &DropZones,
        sink: &MoveSink,
    ) -> Result<Option<Self>, SortableError> {
        let (kind, has_items) = {
            let surface = surface.borrow();
            let view = surface
                .container(container)
                .ok_or(SortableError::UnknownContainer(container))?;
            (view.kind, !view.items.is_empty())
        };

        if !has_items && kind != ContainerKind::Children {
            debug!("No items in container {}, skipping sortable", container);
            return Ok(None);
        }

        if let Some(stale) = library.instance_on(container) {
            warn!("Container {} was still sortable, destroying old instance", container);
            library.destroy(stale);
        }

        let on_start = {
            let surface = surface.clone();
            let zones = zones.clone();
            move |event: &DragStartEvent| {
                let mut surface = surface.borrow_mut();
                surface.clear_selection();
                zones.arm(&mut surface);
                debug!("Drag start of {} in container {}", event.item_id, event.from);
            }
        };

        let on_end = {
            let surface = surface.clone();
            let zones = zones.clone();
            let sink = sink.clone();
            move |event: &DragEndEvent| {
                {
                    let mut surface = surface.borrow_mut();
                    if !revert_splice(&mut surface, event) {
                        warn!(
                            "Could not restore item {} to container {}",
                            event.item_id, event.from
                        );
                    }
                    zones.disarm(&mut surface);
                }
                debug!(
                    "Drag ended: {} from {}[{}] to {}[{}]",
                    event.item_id, event.from, event.old_index, event.to, event.new_index
                );
                sink.emit(MoveIntent::from(event));
            }
        };

        let instance = library.create(
            container,
            options.clone(),
            DragHandlers {
                on_start: Box::new(on_start),
                on_end: Box::new(on_end),
            },
        )?;
        debug!("Sortable attached to container {}", container);

        Ok(Some(Self {
            container,
            instance,
        }))
    }

    pub fn container(&self) -> i32 {
        self.container
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Unregisters the library instance.
    pub fn dispose<L: DragLibrary>(self, library: &mut L) {
        if library.destroy(self.instance) {
            debug!("Destroyed sortable on container {}", self.container);
        }
    }
}
