#![cfg(test)]
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendProvider, MemoryProvider, PreferenceBackend};
use crate::errors::StoreError;
use crate::value::PrefValue;

/// Counts how many times a backend is opened and loaded.
#[derive(Clone)]
pub struct CountingProvider {
    inner: MemoryProvider,
    pub loads: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingProvider {
    pub fn new(inner: MemoryProvider) -> Self {
        Self { inner, loads: Arc::new(AtomicUsize::new(0)), delay: Duration::ZERO }
    }

    /// Stall each open so concurrent initialisers overlap.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }
}

impl BackendProvider for CountingProvider {
    fn open(&self, namespace: &str) -> Result<Box<dyn PreferenceBackend>, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.open(namespace)
    }
}

/// Provider whose backends start failing every operation while the switch is on.
#[derive(Clone)]
pub struct FlakyProvider {
    inner: MemoryProvider,
    failing: Arc<AtomicBool>,
}

impl FlakyProvider {
    pub fn new(inner: MemoryProvider) -> Self {
        Self { inner, failing: Arc::new(AtomicBool::new(false)) }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(failing: &AtomicBool) -> Result<(), StoreError> {
        if failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io("injected failure".into()));
        }
        Ok(())
    }
}

impl BackendProvider for FlakyProvider {
    fn open(&self, namespace: &str) -> Result<Box<dyn PreferenceBackend>, StoreError> {
        Self::check(&self.failing)?;
        let inner = self.inner.open(namespace)?;
        Ok(Box::new(FlakyBackend { inner, failing: self.failing.clone() }))
    }
}

struct FlakyBackend {
    inner: Box<dyn PreferenceBackend>,
    failing: Arc<AtomicBool>,
}

impl PreferenceBackend for FlakyBackend {
    fn load_all(&mut self) -> Result<HashMap<String, PrefValue>, StoreError> {
        FlakyProvider::check(&self.failing)?;
        self.inner.load_all()
    }

    fn commit_put(&mut self, key: &str, value: &PrefValue) -> Result<(), StoreError> {
        FlakyProvider::check(&self.failing)?;
        self.inner.commit_put(key, value)
    }

    fn commit_remove(&mut self, key: &str) -> Result<(), StoreError> {
        FlakyProvider::check(&self.failing)?;
        self.inner.commit_remove(key)
    }

    fn commit_clear(&mut self) -> Result<(), StoreError> {
        FlakyProvider::check(&self.failing)?;
        self.inner.commit_clear()
    }
}
