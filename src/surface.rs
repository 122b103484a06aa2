//! Headless model of the live list markup that the drag library manipulates.
//!
//! Every term renders as an item inside its parent's container, and every term
//! owns a children container (possibly empty) so it can always receive drops.
//! The root list is the container keyed by [`ROOT_PARENT`].

use crate::tree::{TermNode, ROOT_PARENT};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

pub type SharedSurface = Rc<RefCell<Surface>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// The top level list.
    Root,
    /// The nested list under a term.
    Children,
}

#[derive(Debug, Clone)]
pub struct Container {
    pub parent_id: i32,
    pub kind: ContainerKind,
    pub items: Vec<i32>,
    pub classes: BTreeSet<String>,
}

impl Container {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }
}

#[derive(Debug, Default)]
pub struct Surface {
    containers: BTreeMap<i32, Container>,
    selection: Option<String>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSurface {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Throws away all containers and rebuilds them from `forest`.
    ///
    /// Empty children containers get `empty_class` so they keep a drop-zone size.
    pub fn mount(&mut self, forest: &[TermNode], empty_class: &str) {
        fn walk(
            nodes: &[TermNode],
            containers: &mut BTreeMap<i32, Container>,
            empty_class: &str,
        ) {
            for node in nodes {
                let mut classes = BTreeSet::new();
                if node.children.is_empty() {
                    classes.insert(empty_class.to_string());
                }
                containers.insert(
                    node.id,
                    Container {
                        parent_id: node.id,
                        kind: ContainerKind::Children,
                        items: node.children.iter().map(|c| c.id).collect(),
                        classes,
                    },
                );
                walk(&node.children, containers, empty_class);
            }
        }

        self.containers.clear();
        self.containers.insert(
            ROOT_PARENT,
            Container {
                parent_id: ROOT_PARENT,
                kind: ContainerKind::Root,
                items: forest.iter().map(|n| n.id).collect(),
                classes: BTreeSet::new(),
            },
        );
        walk(forest, &mut self.containers, empty_class);
    }

    pub fn clear(&mut self) {
        self.containers.clear();
    }

    pub fn container(&self, parent_id: i32) -> Option<&Container> {
        self.containers.get(&parent_id)
    }

    pub fn container_ids(&self) -> Vec<i32> {
        self.containers.keys().copied().collect()
    }

    pub fn items(&self, parent_id: i32) -> Option<&[i32]> {
        self.containers.get(&parent_id).map(|c| c.items.as_slice())
    }

    /// Which container currently holds `item`, and at what index.
    pub fn locate(&self, item: i32) -> Option<(i32, usize)> {
        self.containers.iter().find_map(|(key, container)| {
            container
                .items
                .iter()
                .position(|&i| i == item)
                .map(|index| (*key, index))
        })
    }

    /// Snapshot of container membership, for comparing before/after a gesture.
    pub fn membership(&self) -> BTreeMap<i32, Vec<i32>> {
        self.containers
            .iter()
            .map(|(key, c)| (*key, c.items.clone()))
            .collect()
    }

    /// Removes the item at `index` from a container.
    pub fn take(&mut self, parent_id: i32, index: usize) -> Option<i32> {
        let container = self.containers.get_mut(&parent_id)?;
        if index < container.items.len() {
            Some(container.items.remove(index))
        } else {
            None
        }
    }

    /// Inserts `item` at `index` (clamped to the end). Returns false for unknown containers.
    pub fn put(&mut self, parent_id: i32, index: usize, item: i32) -> bool {
        match self.containers.get_mut(&parent_id) {
            Some(container) => {
                let at = index.min(container.items.len());
                container.items.insert(at, item);
                true
            }
            None => false,
        }
    }

    pub fn add_class(&mut self, parent_id: i32, class: &str) {
        if let Some(container) = self.containers.get_mut(&parent_id) {
            container.classes.insert(class.to_string());
        }
    }

    pub fn remove_class(&mut self, parent_id: i32, class: &str) {
        if let Some(container) = self.containers.get_mut(&parent_id) {
            container.classes.remove(class);
        }
    }

    pub fn select_text(&mut self, text: &str) {
        self.selection = Some(text.to_string());
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_creates_empty_children_containers() {
        let forest = vec![
            TermNode::new(1, vec![]),
            TermNode::new(2, vec![TermNode::new(3, vec![])]),
        ];
        let mut surface = Surface::new();
        surface.mount(&forest, "rcr-empty");

        assert_eq!(surface.container_ids(), vec![0, 1, 2, 3]);
        assert_eq!(surface.items(ROOT_PARENT), Some(&[1, 2][..]));
        assert_eq!(surface.items(2), Some(&[3][..]));
        assert!(surface.container(1).unwrap().has_class("rcr-empty"));
        assert!(!surface.container(2).unwrap().has_class("rcr-empty"));
        assert_eq!(surface.container(0).unwrap().kind, ContainerKind::Root);
        assert_eq!(surface.locate(3), Some((2, 0)));
    }

    #[test]
    fn test_take_and_put() {
        let mut surface = Surface::new();
        surface.mount(&[TermNode::new(1, vec![]), TermNode::new(2, vec![])], "e");
        let item = surface.take(ROOT_PARENT, 0);
        assert_eq!(item, Some(1));
        assert!(surface.put(2, 5, 1));
        assert_eq!(surface.items(2), Some(&[1][..]));
        assert!(!surface.put(42, 0, 1));
        assert_eq!(surface.take(ROOT_PARENT, 3), None);
    }
}
