use crate::sortable::SortableOptions;
use crate::{BASE_URL, REST_NAMESPACE};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

lazy_static! {
    static ref INVALID_KEY_CHARS: Regex = Regex::new(r"[^a-z0-9_\-]").unwrap();
}

pub const REST_BASE_ENV: &str = "REORDER_REST_BASE";
pub const NONCE_ENV: &str = "REORDER_NONCE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Lower-cases `key` and strips everything outside `[a-z0-9_-]`.
pub fn sanitize_key(key: &str) -> String {
    INVALID_KEY_CHARS
        .replace_all(&key.to_lowercase(), "")
        .into_owned()
}

fn default_rest_base() -> String {
    format!("{}/{}", BASE_URL, REST_NAMESPACE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub name: String,
    pub label: String,
}

/// Class names the render layer and adapters put on containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewClasses {
    /// Added to every children container while a drag is in progress.
    pub armed: String,
    /// Keeps an empty children container sized as a drop zone.
    pub empty: String,
}

impl Default for ViewClasses {
    fn default() -> Self {
        Self {
            armed: "rcr-drop-zone-active".to_string(),
            empty: "rcr-empty".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReorderConfig {
    #[serde(default = "default_rest_base")]
    pub rest_base: String,
    #[serde(default)]
    pub nonce: String,
    pub taxonomies: Vec<TaxonomyEntry>,
    #[serde(default)]
    pub default_taxonomy: Option<String>,
    #[serde(default)]
    pub sortable: SortableOptions,
    #[serde(default)]
    pub classes: ViewClasses,
}

impl ReorderConfig {
    /// A config for the given taxonomy names, labelled by name.
    pub fn with_taxonomies(names: &[&str]) -> Result<Self, ConfigError> {
        let config = Self {
            rest_base: default_rest_base(),
            nonce: String::new(),
            taxonomies: names
                .iter()
                .map(|name| TaxonomyEntry {
                    name: sanitize_key(name),
                    label: name.to_string(),
                })
                .collect(),
            default_taxonomy: None,
            sortable: SortableOptions::default(),
            classes: ViewClasses::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, applies `.env` and environment overrides, then validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let yaml = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(rest_base) = std::env::var(REST_BASE_ENV) {
            self.rest_base = rest_base;
        }
        if let Ok(nonce) = std::env::var(NONCE_ENV) {
            self.nonce = nonce;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(self.rest_base.starts_with("http://") || self.rest_base.starts_with("https://")) {
            return invalid(format!("rest_base must be an http(s) URL, got {}", self.rest_base));
        }
        if self.taxonomies.is_empty() {
            return invalid("at least one taxonomy is required".to_string());
        }

        let mut seen = HashSet::new();
        for entry in &self.taxonomies {
            if entry.name.is_empty() || sanitize_key(&entry.name) != entry.name {
                return invalid(format!("taxonomy name {:?} is not a valid key", entry.name));
            }
            if !seen.insert(entry.name.as_str()) {
                return invalid(format!("taxonomy {} is listed twice", entry.name));
            }
        }

        if let Some(default) = &self.default_taxonomy {
            if !seen.contains(default.as_str()) {
                return invalid(format!("default_taxonomy {} is not in taxonomies", default));
            }
        }

        if self.sortable.group.name.is_empty() {
            return invalid("sortable.group.name must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.sortable.swap_threshold) {
            return invalid(format!(
                "sortable.swap_threshold must be within 0..=1, got {}",
                self.sortable.swap_threshold
            ));
        }
        if self.classes.armed.is_empty() || self.classes.empty.is_empty() {
            return invalid("class names must not be empty".to_string());
        }
        Ok(())
    }

    /// The configured default, or the first taxonomy.
    pub fn default_taxonomy(&self) -> &str {
        self.default_taxonomy
            .as_deref()
            .or_else(|| self.taxonomies.first().map(|t| t.name.as_str()))
            .unwrap_or_default()
    }

    pub fn label(&self, taxonomy: &str) -> Option<&str> {
        self.taxonomies
            .iter()
            .find(|t| t.name == taxonomy)
            .map(|t| t.label.as_str())
    }
}
