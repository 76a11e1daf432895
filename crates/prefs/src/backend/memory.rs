use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use super::{validate_namespace, BackendProvider, PreferenceBackend};
use crate::errors::StoreError;
use crate::value::PrefValue;

type Shared = Arc<Mutex<HashMap<String, PrefValue>>>;

/// Non-persistent backend. Backends opened from the same `MemoryProvider`
/// for the same namespace share contents, so a second store sees what the
/// first committed.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    entries: Shared,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with `entries`.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, PrefValue)>,
    {
        Self { entries: Arc::new(Mutex::new(entries.into_iter().collect())) }
    }

    pub fn snapshot(&self) -> HashMap<String, PrefValue> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl PreferenceBackend for MemoryBackend {
    fn load_all(&mut self) -> Result<HashMap<String, PrefValue>, StoreError> {
        Ok(self.snapshot())
    }

    fn commit_put(&mut self, key: &str, value: &PrefValue) -> Result<(), StoreError> {
        let mut map = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn commit_remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut map = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        map.remove(key);
        Ok(())
    }

    fn commit_clear(&mut self) -> Result<(), StoreError> {
        let mut map = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        map.clear();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryProvider {
    namespaces: Arc<DashMap<String, MemoryBackend>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a namespace before any store opens it.
    pub fn insert_backend(&self, namespace: &str, backend: MemoryBackend) {
        self.namespaces.insert(namespace.to_string(), backend);
    }

    /// Handle onto a namespace's contents, if it has been opened or seeded.
    pub fn backend(&self, namespace: &str) -> Option<MemoryBackend> {
        self.namespaces.get(namespace).map(|b| b.value().clone())
    }
}

impl BackendProvider for MemoryProvider {
    fn open(&self, namespace: &str) -> Result<Box<dyn PreferenceBackend>, StoreError> {
        validate_namespace(namespace)?;
        let backend = self.namespaces.entry(namespace.to_string()).or_default().value().clone();
        Ok(Box::new(backend))
    }
}
