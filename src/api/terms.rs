//! In-memory term storage behind the reference server.

use crate::config::sanitize_key;
use crate::tree::{build_forest, Forest, TermNode, ROOT_PARENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TermStoreError {
    #[error("Invalid or non-hierarchical taxonomy.")]
    InvalidTaxonomy,

    #[error("Invalid JSON payload.")]
    InvalidData,

    #[error("Term {0} appears more than once in the payload.")]
    DuplicateTerm(i32),

    #[error("Could not parse seed file: {0}")]
    Seed(String),
}

// * Types ....................................................................

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub parent: i32,
    #[serde(default)]
    pub menu_order: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyRecord {
    #[serde(default = "default_hierarchical")]
    pub hierarchical: bool,
    #[serde(default)]
    pub terms: Vec<TermRecord>,
}

fn default_hierarchical() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedFile {
    taxonomies: BTreeMap<String, TaxonomyRecord>,
}

fn slugify(name: &str) -> String {
    sanitize_key(&name.trim().replace(char::is_whitespace, "-"))
}

/// A payload item once the lenient JSON has been read.
struct PayloadItem<'a> {
    id: i32,
    children: &'a [Value],
}

/// Reads `{"id": .., "children": [..]}`. Missing, zero and non-numeric ids yield `None`.
fn read_item(value: &Value) -> Option<PayloadItem<'_>> {
    let id = match value.get("id")? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    let id = i32::try_from(id).ok().filter(|id| *id != ROOT_PARENT)?;
    let children = value
        .get("children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    Some(PayloadItem { id, children })
}

// * Store ....................................................................

#[derive(Debug, Clone, Default)]
pub struct TermStore {
    taxonomies: BTreeMap<String, TaxonomyRecord>,
}

impl TermStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a YAML seed of the form `taxonomies: {name: {hierarchical, terms: [..]}}`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TermStoreError> {
        let seed: SeedFile =
            serde_yaml::from_str(yaml).map_err(|e| TermStoreError::Seed(e.to_string()))?;
        let mut store = Self::new();
        for (name, record) in seed.taxonomies {
            store.seed(&name, record.hierarchical, record.terms);
        }
        Ok(store)
    }

    /// Registers `taxonomy` with `terms`. Missing slugs are derived from names; if any term
    /// has no `menu_order`, the whole taxonomy is ordered by name.
    pub fn seed(&mut self, taxonomy: &str, hierarchical: bool, terms: Vec<TermRecord>) {
        let taxonomy = sanitize_key(taxonomy);
        let mut terms: Vec<TermRecord> = terms
            .into_iter()
            .map(|mut term| {
                if term.slug.is_empty() {
                    term.slug = slugify(&term.name);
                }
                term
            })
            .collect();

        if terms.iter().any(|term| term.menu_order.is_none()) {
            apply_default_order(&mut terms);
        }

        info!("Seeded {} with {} terms", taxonomy, terms.len());
        self.taxonomies.insert(
            taxonomy,
            TaxonomyRecord {
                hierarchical,
                terms,
            },
        );
    }

    pub fn taxonomy_names(&self) -> Vec<&str> {
        self.taxonomies.keys().map(String::as_str).collect()
    }

    pub fn terms(&self, taxonomy: &str) -> Option<&[TermRecord]> {
        self.taxonomies
            .get(&sanitize_key(taxonomy))
            .map(|record| record.terms.as_slice())
    }

    fn hierarchical(&self, taxonomy: &str) -> Result<&TaxonomyRecord, TermStoreError> {
        self.taxonomies
            .get(taxonomy)
            .filter(|record| record.hierarchical)
            .ok_or(TermStoreError::InvalidTaxonomy)
    }

    /// The nested tree of `taxonomy`, siblings ordered by `menu_order` then id.
    pub fn tree(&self, taxonomy: &str) -> Result<Forest, TermStoreError> {
        let record = self.hierarchical(&sanitize_key(taxonomy))?;

        let mut sorted: Vec<&TermRecord> = record.terms.iter().collect();
        sorted.sort_by_key(|term| (term.menu_order.unwrap_or_default(), term.id));

        let rows: Vec<TermNode> = sorted
            .into_iter()
            .map(|term| TermNode {
                id: term.id,
                name: Some(term.name.clone()),
                slug: Some(term.slug.clone()),
                parent: Some(term.parent),
                children: Vec::new(),
            })
            .collect();
        Ok(build_forest(&rows))
    }

    /// Applies a save payload: each sibling list gets `menu_order` 0..n-1 and every listed
    /// term is re-parented under the item it is nested in. Returns how many terms changed.
    pub fn apply_save(&mut self, taxonomy: &str, body: &Value) -> Result<usize, TermStoreError> {
        let taxonomy = sanitize_key(taxonomy);
        self.hierarchical(&taxonomy)?;
        let items = body.as_array().ok_or(TermStoreError::InvalidData)?;

        let mut seen = HashSet::new();
        check_duplicates(items, &mut seen)?;

        let record = self
            .taxonomies
            .get_mut(&taxonomy)
            .ok_or(TermStoreError::InvalidTaxonomy)?;
        let mut updated = 0;
        update_recursive(&mut record.terms, items, ROOT_PARENT, &mut updated);

        info!("Saved order for {}: {} terms updated", taxonomy, updated);
        Ok(updated)
    }
}

/// Orders every term by name, as a fresh install would.
pub fn apply_default_order(terms: &mut [TermRecord]) {
    let mut by_name: Vec<usize> = (0..terms.len()).collect();
    by_name.sort_by(|a, b| terms[*a].name.cmp(&terms[*b].name));
    for (order, index) in by_name.into_iter().enumerate() {
        terms[index].menu_order = Some(order as i64);
    }
}

fn check_duplicates(items: &[Value], seen: &mut HashSet<i32>) -> Result<(), TermStoreError> {
    for item in items.iter().filter_map(read_item) {
        if !seen.insert(item.id) {
            return Err(TermStoreError::DuplicateTerm(item.id));
        }
        check_duplicates(item.children, seen)?;
    }
    Ok(())
}

fn update_recursive(terms: &mut [TermRecord], items: &[Value], parent: i32, updated: &mut usize) {
    let mut order = 0;
    for value in items {
        let Some(item) = read_item(value) else {
            continue;
        };
        match terms.iter_mut().find(|term| term.id == item.id) {
            Some(term) => {
                if term.menu_order != Some(order) || term.parent != parent {
                    *updated += 1;
                }
                term.menu_order = Some(order);
                if term.parent != parent {
                    debug!("Term {} moved from {} to {}", term.id, term.parent, parent);
                    term.parent = parent;
                }
            }
            None => debug!("Skipping unknown term {}", item.id),
        }
        update_recursive(terms, item.children, item.id, updated);
        order += 1;
    }
}
