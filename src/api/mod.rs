//! Reference implementation of the remote tree collaborator.
//!
//! `GET /reorder/v1/terms?taxonomy=..` returns the nested tree, `POST /reorder/v1/save?taxonomy=..`
//! accepts an id + children payload. Errors use the `{code, message, data: {status}}` envelope.

mod state;
pub mod terms;

use crate::sync::SaveResponse;
use crate::tree::Forest;
use crate::{NONCE_HEADER, REST_NAMESPACE, SAVE_API, TERMS_API};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use state::AppState;
use std::sync::Arc;
pub use terms::{TermRecord, TermStore, TermStoreError};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Sorry, you are not allowed to do that.")]
    Forbidden,

    #[error("Missing parameter(s): taxonomy")]
    MissingTaxonomy,

    #[error(transparent)]
    Store(#[from] TermStoreError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Forbidden => "rest_forbidden",
            ApiError::MissingTaxonomy => "rest_missing_callback_param",
            ApiError::Store(TermStoreError::InvalidTaxonomy) => "invalid_taxonomy",
            ApiError::Store(_) => "invalid_data",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status();
        let body = json!({
            "code": self.code(),
            "message": self.to_string(),
            "data": { "status": status_code.as_u16() },
        });

        (status_code, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
pub struct TaxonomyQuery {
    pub taxonomy: Option<String>,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if state.nonce.is_empty() {
        return Ok(());
    }
    let sent = headers
        .get(NONCE_HEADER)
        .and_then(|value| value.to_str().ok());
    if sent == Some(&*state.nonce) {
        Ok(())
    } else {
        warn!("Rejected request with missing or stale nonce");
        Err(ApiError::Forbidden)
    }
}

fn taxonomy_param(query: TaxonomyQuery) -> Result<String, ApiError> {
    query
        .taxonomy
        .filter(|taxonomy| !taxonomy.is_empty())
        .ok_or(ApiError::MissingTaxonomy)
}

pub async fn get_terms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TaxonomyQuery>,
) -> Result<Json<Forest>, ApiError> {
    authorize(&state, &headers)?;
    let taxonomy = taxonomy_param(query)?;

    let store = state.store.read().await;
    let forest = store.tree(&taxonomy)?;
    Ok(Json(forest))
}

pub async fn save_terms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TaxonomyQuery>,
    body: String,
) -> Result<Json<SaveResponse>, ApiError> {
    authorize(&state, &headers)?;
    let taxonomy = taxonomy_param(query)?;

    // Unparseable bodies are reported as invalid_data, after the taxonomy check
    let payload = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);

    let mut store = state.store.write().await;
    store.apply_save(&taxonomy, &payload)?;

    Ok(Json(SaveResponse {
        success: true,
        message: None,
    }))
}

pub fn create_router(store: TermStore, nonce: &str) -> Router {
    info!(
        "Serving taxonomies: {}",
        store.taxonomy_names().join(", ")
    );
    let state = AppState {
        store: Arc::new(RwLock::new(store)),
        nonce: Arc::from(nonce),
    };

    Router::new()
        .route(
            format!("/{REST_NAMESPACE}/{TERMS_API}").as_str(),
            get(get_terms),
        )
        .route(
            format!("/{REST_NAMESPACE}/{SAVE_API}").as_str(),
            post(save_terms),
        )
        .with_state(state)
}
