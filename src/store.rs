//! The single owner of the current forest.
//!
//! Structural changes bump a version counter. The render layer keys every drag
//! adapter on that version, so a bump means a full unmount and remount of the
//! drag surface rather than an in-place patch.

use crate::sync::{SaveOutcome, SyncError};
use crate::tree::{move_node, parent_of, placements, validate_forest, Forest, TermNode, TreeError};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Saving,
    Error,
}

/// Ticket for one taxonomy selection. Results carrying an outdated ticket are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub taxonomy: String,
    pub generation: u64,
}

/// SHA-256 over the `(id, parent, order)` rows of a forest.
pub fn fingerprint(forest: &[TermNode]) -> String {
    let mut hasher = Sha256::new();
    for row in placements(forest) {
        hasher.update(format!("{}:{}:{};", row.id, row.parent, row.order).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug)]
pub struct TreeStore {
    forest: Forest,
    version: u64,
    taxonomy: Option<String>,
    generation: u64,
    state: LoadState,
    error: Option<String>,
    notice: Option<String>,
    confirmed: Option<String>,
    saved_at: Option<DateTime<Utc>>,
    version_tx: watch::Sender<u64>,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            forest: Vec::new(),
            version: 0,
            taxonomy: None,
            generation: 0,
            state: LoadState::Idle,
            error: None,
            notice: None,
            confirmed: None,
            saved_at: None,
            version_tx,
        }
    }

    // ** Accessors

    pub fn forest(&self) -> &[TermNode] {
        &self.forest
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn taxonomy(&self) -> Option<&str> {
        self.taxonomy.as_deref()
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.saved_at
    }

    /// Render trigger: yields the new version after every structural change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// True when the forest differs from what the server last confirmed.
    pub fn is_dirty(&self) -> bool {
        match &self.confirmed {
            Some(confirmed) => *confirmed != fingerprint(&self.forest),
            None => false,
        }
    }

    /// The save control is live unless a request is in flight or there is nothing to save.
    pub fn can_save(&self) -> bool {
        !matches!(self.state, LoadState::Loading | LoadState::Saving) && !self.forest.is_empty()
    }

    pub fn is_current(&self, selection: &Selection) -> bool {
        selection.generation == self.generation
            && self.taxonomy.as_deref() == Some(selection.taxonomy.as_str())
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
        if self.state == LoadState::Error && !self.forest.is_empty() {
            self.state = LoadState::Ready;
        }
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    fn bump(&mut self) {
        self.version += 1;
        self.version_tx.send_replace(self.version);
    }

    // ** Loading

    /// Starts a fresh selection. The previous forest is discarded immediately.
    pub fn select(&mut self, taxonomy: &str) -> Selection {
        self.generation += 1;
        self.taxonomy = Some(taxonomy.to_string());
        self.state = LoadState::Loading;
        self.error = None;
        self.notice = None;
        self.confirmed = None;
        self.saved_at = None;
        if !self.forest.is_empty() {
            self.forest.clear();
            self.bump();
        }
        debug!("Selected {} (generation {})", taxonomy, self.generation);
        Selection {
            taxonomy: taxonomy.to_string(),
            generation: self.generation,
        }
    }

    /// Applies a finished fetch, unless the selection has moved on since.
    pub fn finish_load(
        &mut self,
        selection: &Selection,
        result: Result<Forest, SyncError>,
    ) -> Result<(), SyncError> {
        if !self.is_current(selection) {
            warn!("Discarding terms for {}: selection changed", selection.taxonomy);
            return Err(SyncError::Stale {
                taxonomy: selection.taxonomy.clone(),
            });
        }

        let result = result.and_then(|forest| {
            validate_forest(&forest)?;
            Ok(forest)
        });

        match result {
            Ok(forest) => {
                info!("Loaded {} root terms for {}", forest.len(), selection.taxonomy);
                self.state = LoadState::Ready;
                self.replace_forest(forest);
                Ok(())
            }
            Err(e) => {
                self.state = LoadState::Error;
                self.error = Some(e.to_string());
                self.confirmed = None;
                self.forest.clear();
                self.bump();
                Err(e)
            }
        }
    }

    // ** Mutation

    /// Moves `id` under `to_parent` at `index` through the tree model.
    ///
    /// Returns `Ok(false)` when the move leaves the structure as it was. Rejected
    /// moves leave the forest untouched.
    pub fn apply_move(
        &mut self,
        id: i32,
        from_parent: i32,
        to_parent: i32,
        index: Option<usize>,
    ) -> Result<bool, TreeError> {
        match parent_of(&self.forest, id) {
            Some(actual) if actual != from_parent => {
                warn!(
                    "Term {} reported under {} but lives under {}",
                    id, from_parent, actual
                );
            }
            _ => {}
        }

        match move_node(&self.forest, id, to_parent, index) {
            Ok(forest) => {
                if placements(&forest) == placements(&self.forest) {
                    debug!("Move of {} changed nothing", id);
                    return Ok(false);
                }
                self.forest = forest;
                self.bump();
                debug!("Moved {} to {} at {:?}", id, to_parent, index);
                Ok(true)
            }
            Err(e) => {
                warn!("Rejected move of {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Installs a server-confirmed forest wholesale.
    pub fn replace_forest(&mut self, forest: Forest) {
        self.confirmed = Some(fingerprint(&forest));
        self.forest = forest;
        self.bump();
    }

    // ** Saving

    /// Marks the store as saving and hands out what should be sent.
    pub fn begin_save(&mut self) -> Result<(Selection, Forest), SyncError> {
        if !self.can_save() {
            return Err(SyncError::NotReady(match self.state {
                LoadState::Loading => "still loading",
                LoadState::Saving => "a save is already running",
                _ => "no terms to save",
            }));
        }
        let taxonomy = self
            .taxonomy
            .clone()
            .ok_or(SyncError::NotReady("no taxonomy selected"))?;

        self.state = LoadState::Saving;
        self.error = None;
        self.notice = None;
        Ok((
            Selection {
                taxonomy,
                generation: self.generation,
            },
            self.forest.clone(),
        ))
    }

    /// Reconciles a finished save. On failure the forest stays as it was.
    pub fn finish_save(
        &mut self,
        selection: &Selection,
        result: Result<SaveOutcome, SyncError>,
    ) -> Result<String, SyncError> {
        if !self.is_current(selection) {
            warn!("Discarding save result for {}: selection changed", selection.taxonomy);
            return Err(SyncError::Stale {
                taxonomy: selection.taxonomy.clone(),
            });
        }

        let result = result.and_then(|outcome| {
            validate_forest(&outcome.forest)?;
            Ok(outcome)
        });

        match result {
            Ok(outcome) => {
                info!("Saved {}: {}", selection.taxonomy, outcome.message);
                self.state = LoadState::Ready;
                self.notice = Some(outcome.message.clone());
                self.saved_at = Some(Utc::now());
                self.replace_forest(outcome.forest);
                Ok(outcome.message)
            }
            Err(e) => {
                self.state = LoadState::Error;
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
