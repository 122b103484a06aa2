pub mod adapter;
pub mod api;
pub mod app;
pub mod config;
pub mod render;
pub mod sortable;
pub mod store;
pub mod surface;
pub mod sync;
pub mod tree;

pub const BASE_URL: &str = "http://localhost:37240";
pub const REST_NAMESPACE: &str = "reorder/v1";
pub const TERMS_API: &str = "terms";
pub const SAVE_API: &str = "save";
pub const NONCE_HEADER: &str = "X-WP-Nonce";
