use super::terms::TermStore;
use std::sync::Arc;
use tokio::sync::RwLock;

// Shared state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<TermStore>>,
    /// Expected `X-WP-Nonce`; empty disables the check.
    pub nonce: Arc<str>,
}
