//! Persistence backends behind the preference store.
//!
//! A backend owns the durable copy of one namespace. Every `commit_*` call
//! returns only after the change is durable; the store relies on that to
//! decide whether its in-memory copy may change.

pub mod json_file;
pub mod memory;

use std::collections::HashMap;

use crate::errors::StoreError;
use crate::value::PrefValue;

pub use json_file::{JsonFileBackend, JsonFileProvider};
pub use memory::{MemoryBackend, MemoryProvider};

pub trait PreferenceBackend: Send {
    /// Read every entry currently persisted.
    fn load_all(&mut self) -> Result<HashMap<String, PrefValue>, StoreError>;
    fn commit_put(&mut self, key: &str, value: &PrefValue) -> Result<(), StoreError>;
    fn commit_remove(&mut self, key: &str) -> Result<(), StoreError>;
    fn commit_clear(&mut self) -> Result<(), StoreError>;
}

/// Opens (creating if needed) the backend for a namespace.
pub trait BackendProvider: Send + Sync {
    fn open(&self, namespace: &str) -> Result<Box<dyn PreferenceBackend>, StoreError>;
}

/// Namespaces name files on disk, so they must be a single plain path component.
pub fn validate_namespace(namespace: &str) -> Result<(), StoreError> {
    let trimmed = namespace.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidNamespace("namespace is empty".into()));
    }
    if trimmed != namespace {
        return Err(StoreError::InvalidNamespace(format!("`{namespace}` has surrounding whitespace")));
    }
    if namespace == "." || namespace == ".." || namespace.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidNamespace(format!("`{namespace}` is not a plain name")));
    }
    Ok(())
}
