//! Talks to the remote tree collaborator and reconciles its answers into the store.

use crate::config::ReorderConfig;
use crate::store::TreeStore;
use crate::tree::{to_save_payload, Forest, SaveNode, TermNode, TreeError};
use crate::{NONCE_HEADER, SAVE_API, TERMS_API};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use thiserror::Error;
use tracing::{error, info};

pub const DEFAULT_SAVE_MESSAGE: &str = "Order and hierarchy saved successfully!";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to fetch {taxonomy}: {status} {message}")]
    Fetch {
        taxonomy: String,
        status: u16,
        message: String,
    },

    #[error("Failed to save {taxonomy}: {status} - {message}")]
    Save {
        taxonomy: String,
        status: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid tree from server: {0}")]
    Invalid(#[from] TreeError),

    #[error("Selection moved on, discarded result for {taxonomy}")]
    Stale { taxonomy: String },

    #[error("Cannot save right now: {0}")]
    NotReady(&'static str),
}

// * Types ....................................................................

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A completed save: the server's confirmation plus the refreshed canonical tree.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub message: String,
    pub forest: Forest,
}

/// Pulls the human readable part out of an error body: `{"message": ...}` when the
/// body is JSON, the raw text otherwise.
pub fn server_message(body: &str, fallback: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => fallback.to_string(),
        None => body.trim().to_string(),
    }
}

// * Remote ...................................................................

#[allow(async_fn_in_trait)]
pub trait TermsRemote {
    async fn fetch_terms(&self, taxonomy: &str) -> Result<Forest, SyncError>;

    async fn save_terms(
        &self,
        taxonomy: &str,
        payload: &[SaveNode],
    ) -> Result<SaveResponse, SyncError>;
}

/// The HTTP collaborator (`GET /terms`, `POST /save`).
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    rest_base: String,
    nonce: String,
}

impl HttpRemote {
    pub fn new(rest_base: &str, nonce: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            rest_base: rest_base.trim_end_matches('/').to_string(),
            nonce: nonce.to_string(),
        }
    }

    pub fn from_config(config: &ReorderConfig) -> Self {
        Self::new(&config.rest_base, &config.nonce)
    }

    fn url(&self, endpoint: &str, taxonomy: &str) -> String {
        format!(
            "{}/{}?taxonomy={}",
            self.rest_base,
            endpoint,
            urlencoding::encode(taxonomy)
        )
    }
}

impl TermsRemote for HttpRemote {
    async fn fetch_terms(&self, taxonomy: &str) -> Result<Forest, SyncError> {
        let url = self.url(TERMS_API, taxonomy);

        let response = self
            .client
            .get(&url)
            .header(NONCE_HEADER, &self.nonce)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(SyncError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SyncError::Fetch {
                taxonomy: taxonomy.to_string(),
                status: status.as_u16(),
                message: server_message(
                    &error_text,
                    status.canonical_reason().unwrap_or("Unknown error"),
                ),
            });
        }

        let forest = response
            .json::<Forest>()
            .await
            .map_err(SyncError::Network)?;
        Ok(forest)
    }

    async fn save_terms(
        &self,
        taxonomy: &str,
        payload: &[SaveNode],
    ) -> Result<SaveResponse, SyncError> {
        let url = self.url(SAVE_API, taxonomy);

        let response = self
            .client
            .post(&url)
            .header(NONCE_HEADER, &self.nonce)
            .json(&payload)
            .send()
            .await
            .map_err(SyncError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SyncError::Save {
                taxonomy: taxonomy.to_string(),
                status: status.as_u16(),
                message: server_message(
                    &error_text,
                    status.canonical_reason().unwrap_or("Unknown error"),
                ),
            });
        }

        let result = response
            .json::<SaveResponse>()
            .await
            .map_err(SyncError::Network)?;
        Ok(result)
    }
}

// * Controller ...............................................................

#[derive(Debug, Clone)]
pub struct SyncController<R> {
    remote: R,
}

impl<R: TermsRemote> SyncController<R> {
    pub fn new(remote: R) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Fetches the canonical tree for `taxonomy`.
    pub async fn load(&self, taxonomy: &str) -> Result<Forest, SyncError> {
        info!("Fetching terms for {}", taxonomy);
        let forest = self.remote.fetch_terms(taxonomy).await.map_err(|e| {
            error!("Failed to fetch terms for {}: {}", taxonomy, e);
            e
        })?;
        Ok(forest)
    }

    /// Sends `forest` as id + children and, once accepted, re-fetches the canonical tree.
    pub async fn save(&self, forest: &[TermNode], taxonomy: &str) -> Result<SaveOutcome, SyncError> {
        let payload = to_save_payload(forest);
        info!("Saving {} root terms for {}", payload.len(), taxonomy);

        let response = self.remote.save_terms(taxonomy, &payload).await.map_err(|e| {
            error!("Save failed for {}: {}", taxonomy, e);
            e
        })?;
        if !response.success {
            return Err(SyncError::Save {
                taxonomy: taxonomy.to_string(),
                status: 200,
                message: response
                    .message
                    .unwrap_or_else(|| "Server rejected the order".to_string()),
            });
        }

        let refreshed = self.load(taxonomy).await?;
        Ok(SaveOutcome {
            message: response
                .message
                .unwrap_or_else(|| DEFAULT_SAVE_MESSAGE.to_string()),
            forest: refreshed,
        })
    }

    /// Switches the store to `taxonomy` and loads it.
    ///
    /// If another selection happens while this fetch is in flight, the result is
    /// discarded and [`SyncError::Stale`] is returned.
    pub async fn select(&self, store: &RefCell<TreeStore>, taxonomy: &str) -> Result<(), SyncError> {
        let selection = store.borrow_mut().select(taxonomy);
        let result = self.load(&selection.taxonomy).await;
        store.borrow_mut().finish_load(&selection, result)
    }

    /// Saves the store's current forest and replaces it with the server's answer.
    pub async fn save_current(&self, store: &RefCell<TreeStore>) -> Result<String, SyncError> {
        let (selection, forest) = store.borrow_mut().begin_save()?;
        let result = self.save(&forest, &selection.taxonomy).await;
        store.borrow_mut().finish_save(&selection, result)
    }
}
