//! Pure operations over an ordered forest of taxonomy terms.
//!
//! Nothing in here mutates its input. Every operation returns a fresh [`Forest`]
//! which the caller installs as the new current value.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Parent id of every root-level term. Never a real term id.
pub const ROOT_PARENT: i32 = 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Term {0} not found")]
    NodeNotFound(i32),

    #[error("Parent term {0} not found")]
    ParentNotFound(i32),

    #[error("Moving term {id} under {parent} would make it its own ancestor")]
    CycleRejected { id: i32, parent: i32 },

    #[error("Term id {0} appears more than once")]
    DuplicateId(i32),

    #[error("Term id 0 is reserved for the forest root")]
    ReservedId,
}

// * Types ....................................................................

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TermNode {
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<i32>,
    #[serde(default)]
    pub children: Vec<TermNode>,
}

impl TermNode {
    pub fn new(id: i32, children: Vec<TermNode>) -> Self {
        Self {
            id,
            name: None,
            slug: None,
            parent: None,
            children,
        }
    }

    pub fn named(id: i32, name: &str, children: Vec<TermNode>) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::new(id, children)
        }
    }

    /// Label used when rendering; falls back to the id for unnamed terms.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("#{}", self.id))
    }
}

pub type Forest = Vec<TermNode>;

/// Save payload node. Names and slugs are owned by the server and never sent.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SaveNode {
    pub id: i32,
    #[serde(default)]
    pub children: Vec<SaveNode>,
}

/// Where a single term sits: its parent and its dense sibling index.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Placement {
    pub id: i32,
    pub parent: i32,
    pub order: usize,
}

// * Queries ..................................................................

/// Depth-first search for `id`, returning the whole subtree rooted there.
pub fn find_node(forest: &[TermNode], id: i32) -> Option<&TermNode> {
    for node in forest {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.children, id) {
            return Some(found);
        }
    }
    None
}

/// Parent id of `id` ([`ROOT_PARENT`] for root-level terms), or `None` if absent.
pub fn parent_of(forest: &[TermNode], id: i32) -> Option<i32> {
    fn walk(nodes: &[TermNode], parent: i32, id: i32) -> Option<i32> {
        for node in nodes {
            if node.id == id {
                return Some(parent);
            }
            if let Some(found) = walk(&node.children, node.id, id) {
                return Some(found);
            }
        }
        None
    }
    walk(forest, ROOT_PARENT, id)
}

/// True when `candidate` lives somewhere below `ancestor`.
pub fn is_descendant(forest: &[TermNode], ancestor: i32, candidate: i32) -> bool {
    find_node(forest, ancestor)
        .map(|node| find_node(&node.children, candidate).is_some())
        .unwrap_or(false)
}

/// All ids in pre-order.
pub fn collect_ids(forest: &[TermNode]) -> Vec<i32> {
    let mut ids = Vec::new();
    let mut stack: Vec<&TermNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        ids.push(node.id);
        stack.extend(node.children.iter().rev());
    }
    ids
}

/// Flattens the forest into `(id, parent, order)` rows in pre-order.
pub fn placements(forest: &[TermNode]) -> Vec<Placement> {
    fn walk(nodes: &[TermNode], parent: i32, out: &mut Vec<Placement>) {
        for (order, node) in nodes.iter().enumerate() {
            out.push(Placement {
                id: node.id,
                parent,
                order,
            });
            walk(&node.children, node.id, out);
        }
    }
    let mut out = Vec::new();
    walk(forest, ROOT_PARENT, &mut out);
    out
}

/// Checks the forest-wide invariants: ids are unique and never [`ROOT_PARENT`].
pub fn validate_forest(forest: &[TermNode]) -> Result<(), TreeError> {
    let mut seen = HashSet::new();
    for id in collect_ids(forest) {
        if id == ROOT_PARENT {
            return Err(TreeError::ReservedId);
        }
        if !seen.insert(id) {
            return Err(TreeError::DuplicateId(id));
        }
    }
    Ok(())
}

// * Transformations ..........................................................

/// Returns a copy of `forest` with `id` and its subtree excised, wherever it lives.
pub fn remove_node(forest: &[TermNode], id: i32) -> Forest {
    forest
        .iter()
        .filter(|node| node.id != id)
        .map(|node| TermNode {
            children: remove_node(&node.children, id),
            ..node.clone()
        })
        .collect()
}

/// Returns a copy of `forest` with `node` inserted under `parent_id` at `index`.
///
/// `parent_id` of [`ROOT_PARENT`] targets the root list. `None` (or an index past
/// the end) appends.
pub fn insert_node(
    forest: &[TermNode],
    parent_id: i32,
    node: TermNode,
    index: Option<usize>,
) -> Result<Forest, TreeError> {
    fn splice(list: &mut Vec<TermNode>, node: TermNode, index: Option<usize>) {
        let at = index.map_or(list.len(), |i| i.min(list.len()));
        list.insert(at, node);
    }

    fn walk(
        nodes: &mut [TermNode],
        parent_id: i32,
        node: &mut Option<TermNode>,
        index: Option<usize>,
    ) {
        for current in nodes.iter_mut() {
            if node.is_none() {
                return;
            }
            if current.id == parent_id {
                if let Some(node) = node.take() {
                    splice(&mut current.children, node, index);
                }
                return;
            }
            walk(&mut current.children, parent_id, node, index);
        }
    }

    let mut out = forest.to_vec();
    if parent_id == ROOT_PARENT {
        splice(&mut out, node, index);
        return Ok(out);
    }

    let mut pending = Some(node);
    walk(&mut out, parent_id, &mut pending, index);
    match pending {
        None => Ok(out),
        Some(_) => Err(TreeError::ParentNotFound(parent_id)),
    }
}

/// Relocates `id` (with its subtree) under `to_parent` at `index`.
///
/// Rejects targets equal to the node or inside its own subtree.
pub fn move_node(
    forest: &[TermNode],
    id: i32,
    to_parent: i32,
    index: Option<usize>,
) -> Result<Forest, TreeError> {
    if to_parent == id {
        return Err(TreeError::CycleRejected {
            id,
            parent: to_parent,
        });
    }

    let node = find_node(forest, id).ok_or(TreeError::NodeNotFound(id))?;
    if to_parent != ROOT_PARENT && find_node(&node.children, to_parent).is_some() {
        return Err(TreeError::CycleRejected {
            id,
            parent: to_parent,
        });
    }

    let moved = TermNode {
        parent: Some(to_parent),
        ..node.clone()
    };
    let without = remove_node(forest, id);
    insert_node(&without, to_parent, moved, index)
}

/// Serializes the forest into the id + children shape the save endpoint expects.
pub fn to_save_payload(forest: &[TermNode]) -> Vec<SaveNode> {
    forest
        .iter()
        .map(|node| SaveNode {
            id: node.id,
            children: to_save_payload(&node.children),
        })
        .collect()
}

/// Builds a forest from flat rows, keeping the input order among siblings.
///
/// Each row is a childless node with `parent` set. Rows whose parent is not among the
/// rows are placed at the root. Rows only reachable through a parent cycle are dropped.
pub fn build_forest(rows: &[TermNode]) -> Forest {
    let ids: HashSet<i32> = rows.iter().map(|row| row.id).collect();
    let mut parent_to_children: HashMap<i32, Vec<&TermNode>> = HashMap::new();
    for row in rows {
        let parent = match row.parent {
            Some(parent) if parent != row.id && ids.contains(&parent) => parent,
            _ => ROOT_PARENT,
        };
        parent_to_children.entry(parent).or_default().push(row);
    }

    fn build_subtree(
        parent: i32,
        parent_to_children: &HashMap<i32, Vec<&TermNode>>,
        seen: &mut HashSet<i32>,
    ) -> Forest {
        let Some(children) = parent_to_children.get(&parent) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(children.len());
        for row in children {
            if !seen.insert(row.id) {
                continue;
            }
            out.push(TermNode {
                parent: Some(parent),
                children: build_subtree(row.id, parent_to_children, seen),
                ..(*row).clone()
            });
        }
        out
    }

    build_subtree(ROOT_PARENT, &parent_to_children, &mut HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: i32) -> TermNode {
        TermNode::new(id, vec![])
    }

    // [{1}, {2: [{3}]}]
    fn sample() -> Forest {
        vec![leaf(1), TermNode::new(2, vec![leaf(3)])]
    }

    fn deep() -> Forest {
        vec![
            TermNode::new(
                1,
                vec![
                    TermNode::new(4, vec![leaf(5), leaf(6)]),
                    leaf(7),
                ],
            ),
            TermNode::new(2, vec![leaf(3)]),
            leaf(8),
        ]
    }

    fn shape(forest: &[TermNode]) -> Vec<SaveNode> {
        to_save_payload(forest)
    }

    #[test]
    fn test_find_node_returns_subtree() {
        let forest = deep();
        let found = find_node(&forest, 4).expect("term 4 should exist");
        assert_eq!(collect_ids(&found.children), vec![5, 6]);
        assert!(find_node(&forest, 42).is_none());
    }

    #[test]
    fn test_remove_node_recurses() {
        let forest = deep();
        let removed = remove_node(&forest, 5);
        assert_eq!(collect_ids(&removed), vec![1, 4, 6, 7, 2, 3, 8]);
        // input untouched
        assert_eq!(forest, deep());
    }

    #[test]
    fn test_insert_node_at_index_and_append() {
        let forest = sample();
        let at_front = insert_node(&forest, 2, leaf(9), Some(0)).unwrap();
        assert_eq!(collect_ids(&find_node(&at_front, 2).unwrap().children), vec![9, 3]);

        let appended = insert_node(&forest, ROOT_PARENT, leaf(9), None).unwrap();
        assert_eq!(collect_ids(&appended), vec![1, 2, 3, 9]);

        let clamped = insert_node(&forest, 1, leaf(9), Some(99)).unwrap();
        assert_eq!(collect_ids(&find_node(&clamped, 1).unwrap().children), vec![9]);
    }

    #[test]
    fn test_insert_node_unknown_parent() {
        let result = insert_node(&sample(), 77, leaf(9), None);
        assert_eq!(result, Err(TreeError::ParentNotFound(77)));
    }

    #[test]
    fn test_move_child_to_root_front() {
        let moved = move_node(&sample(), 3, ROOT_PARENT, Some(0)).unwrap();
        assert_eq!(
            shape(&moved),
            shape(&[leaf(3), leaf(1), leaf(2)])
        );
        assert_eq!(find_node(&moved, 3).unwrap().parent, Some(ROOT_PARENT));
    }

    #[test]
    fn test_move_root_into_sibling() {
        let moved = move_node(&sample(), 2, 1, None).unwrap();
        assert_eq!(
            shape(&moved),
            shape(&[TermNode::new(1, vec![TermNode::new(2, vec![leaf(3)])])])
        );
    }

    #[test]
    fn test_move_into_own_descendant_is_rejected() {
        let forest = vec![TermNode::new(1, vec![TermNode::new(2, vec![leaf(3)])])];
        let result = move_node(&forest, 1, 3, Some(0));
        assert_eq!(result, Err(TreeError::CycleRejected { id: 1, parent: 3 }));

        let onto_self = move_node(&forest, 2, 2, None);
        assert_eq!(onto_self, Err(TreeError::CycleRejected { id: 2, parent: 2 }));
    }

    #[test]
    fn test_move_unknown_node_and_parent() {
        assert_eq!(
            move_node(&sample(), 42, ROOT_PARENT, None),
            Err(TreeError::NodeNotFound(42))
        );
        assert_eq!(
            move_node(&sample(), 3, 42, None),
            Err(TreeError::ParentNotFound(42))
        );
    }

    #[test]
    fn test_no_move_ever_creates_a_cycle() {
        let forest = deep();
        let ids = collect_ids(&forest);
        for &id in &ids {
            for &target in &ids {
                if target == id || is_descendant(&forest, id, target) {
                    assert!(matches!(
                        move_node(&forest, id, target, Some(0)),
                        Err(TreeError::CycleRejected { .. })
                    ));
                }
            }
        }
    }

    #[test]
    fn test_valid_moves_preserve_ids_and_dense_order() {
        let mut forest = deep();
        let mut expected: Vec<i32> = collect_ids(&forest);
        expected.sort_unstable();

        let moves = [(5, 2, Some(0)), (1, 8, None), (3, ROOT_PARENT, Some(1)), (6, 5, Some(3))];
        for (id, parent, index) in moves {
            forest = move_node(&forest, id, parent, index).unwrap();

            let mut ids = collect_ids(&forest);
            ids.sort_unstable();
            assert_eq!(ids, expected);
            assert!(validate_forest(&forest).is_ok());

            // every sibling group reads 0..n-1
            let rows = placements(&forest);
            let mut parents: Vec<i32> = rows.iter().map(|p| p.parent).collect();
            parents.dedup();
            for parent in parents {
                let orders: Vec<usize> = rows
                    .iter()
                    .filter(|p| p.parent == parent)
                    .map(|p| p.order)
                    .collect();
                assert_eq!(orders, (0..orders.len()).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_reorder_within_same_parent() {
        // dragging 4 below 7 inside term 1 reports the final index 1
        let moved = move_node(&deep(), 4, 1, Some(1)).unwrap();
        assert_eq!(collect_ids(&find_node(&moved, 1).unwrap().children), vec![7, 4, 5, 6]);
    }

    #[test]
    fn test_parent_of_and_is_descendant() {
        let forest = deep();
        assert_eq!(parent_of(&forest, 1), Some(ROOT_PARENT));
        assert_eq!(parent_of(&forest, 6), Some(4));
        assert_eq!(parent_of(&forest, 99), None);
        assert!(is_descendant(&forest, 1, 6));
        assert!(!is_descendant(&forest, 6, 1));
    }

    #[test]
    fn test_validate_forest() {
        assert_eq!(
            validate_forest(&[leaf(1), TermNode::new(2, vec![leaf(1)])]),
            Err(TreeError::DuplicateId(1))
        );
        assert_eq!(validate_forest(&[leaf(0)]), Err(TreeError::ReservedId));
    }

    #[test]
    fn test_save_payload_omits_server_fields() {
        let forest = vec![TermNode {
            slug: Some("news".to_string()),
            parent: Some(0),
            ..TermNode::named(1, "News", vec![leaf(2)])
        }];
        let json = serde_json::to_value(to_save_payload(&forest)).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "id": 1, "children": [{ "id": 2, "children": [] }] }])
        );
    }

    #[test]
    fn test_build_forest_from_rows() {
        let row = |id: i32, parent: i32| TermNode {
            parent: Some(parent),
            ..leaf(id)
        };
        // 9 points at a missing parent, 5 and 6 only point at each other
        let rows = vec![row(2, 0), row(3, 2), row(1, 0), row(9, 42), row(4, 2), row(5, 6), row(6, 5)];

        let forest = build_forest(&rows);

        assert_eq!(collect_ids(&forest), vec![2, 3, 4, 1, 9]);
        assert_eq!(find_node(&forest, 9).unwrap().parent, Some(ROOT_PARENT));
        assert_eq!(parent_of(&forest, 4), Some(2));
    }
}
