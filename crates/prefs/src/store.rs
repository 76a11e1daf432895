use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::backend::{BackendProvider, PreferenceBackend};
use crate::errors::StoreError;
use crate::value::{PrefValue, Scalar};

/// What `init` needs to open the backing storage: the namespace that names it
/// and the provider that knows how to open it.
#[derive(Clone)]
pub struct StoreContext {
    namespace: String,
    provider: Arc<dyn BackendProvider>,
}

impl StoreContext {
    pub fn new<P>(namespace: impl Into<String>, provider: P) -> Self
    where
        P: BackendProvider + 'static,
    {
        Self { namespace: namespace.into(), provider: Arc::new(provider) }
    }

    pub fn with_shared_provider(namespace: impl Into<String>, provider: Arc<dyn BackendProvider>) -> Self {
        Self { namespace: namespace.into(), provider }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext").field("namespace", &self.namespace).finish_non_exhaustive()
    }
}

struct Ready {
    namespace: String,
    /// Commits are serialised here; the memory update for a write happens
    /// while this lock is held so both sides apply writes in the same order.
    backend: Mutex<Box<dyn PreferenceBackend>>,
    data: DashMap<String, PrefValue>,
}

impl Ready {
    fn backend(&self) -> MutexGuard<'_, Box<dyn PreferenceBackend>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write-through preference cache.
///
/// Starts uninitialised; `init` opens the backend and loads it into memory
/// exactly once. Reads are served from memory only. Writes reach memory only
/// after the backend has committed them.
#[derive(Default)]
pub struct PreferenceStore {
    state: OnceCell<Ready>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self { state: OnceCell::new() }
    }

    /// Open and load the backend described by `context`.
    ///
    /// Only the first successful call does any work; later calls return the
    /// already loaded store and ignore their context. Concurrent callers block
    /// until the single load has finished. A failed load leaves the store
    /// uninitialised so `init` can be retried.
    pub fn init(&self, context: Option<&StoreContext>) -> Result<&Self, StoreError> {
        let context = context.ok_or(StoreError::MissingContext)?;
        self.state.get_or_try_init(|| Self::load(context))?;
        Ok(self)
    }

    fn load(context: &StoreContext) -> Result<Ready, StoreError> {
        let mut backend = context.provider.open(&context.namespace)?;
        let entries = backend.load_all()?;
        let data = DashMap::with_capacity(entries.len());
        for (key, value) in entries {
            data.insert(key, value);
        }
        info!(namespace = %context.namespace, entries = data.len(), "preference store initialized");
        Ok(Ready { namespace: context.namespace.clone(), backend: Mutex::new(backend), data })
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    fn ready(&self) -> Result<&Ready, StoreError> {
        self.state.get().ok_or(StoreError::Uninitialized)
    }

    pub fn namespace(&self) -> Result<&str, StoreError> {
        Ok(self.ready()?.namespace.as_str())
    }

    /// Commit `value` under `key`, then mirror it in memory.
    ///
    /// Returns `Ok(false)` when the backend refused the write; memory is left
    /// as it was.
    pub fn put_value(&self, key: &str, value: PrefValue) -> Result<bool, StoreError> {
        let ready = self.ready()?;
        let mut backend = ready.backend();
        if let Err(e) = backend.commit_put(key, &value) {
            warn!(namespace = %ready.namespace, %key, kind = %value.kind(), error = %e, "preference write failed");
            return Ok(false);
        }
        debug!(namespace = %ready.namespace, %key, kind = %value.kind(), "preference committed");
        ready.data.insert(key.to_string(), value);
        Ok(true)
    }

    pub fn put<T: Scalar>(&self, key: &str, value: T) -> Result<bool, StoreError> {
        self.put_value(key, value.into_value())
    }

    /// Store a dynamically typed value. Values that are not one of the five
    /// scalar kinds are dropped and reported as an unsuccessful write.
    pub fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<bool, StoreError> {
        self.ready()?;
        match PrefValue::from_json(value) {
            Some(v) => self.put_value(key, v),
            None => {
                debug!(%key, "ignoring write of unsupported value type");
                Ok(false)
            }
        }
    }

    pub fn put_float(&self, key: &str, value: f32) -> Result<bool, StoreError> {
        self.put(key, value)
    }

    pub fn put_int(&self, key: &str, value: i32) -> Result<bool, StoreError> {
        self.put(key, value)
    }

    pub fn put_long(&self, key: &str, value: i64) -> Result<bool, StoreError> {
        self.put(key, value)
    }

    pub fn put_bool(&self, key: &str, value: bool) -> Result<bool, StoreError> {
        self.put(key, value)
    }

    pub fn put_string(&self, key: &str, value: impl Into<String>) -> Result<bool, StoreError> {
        self.put(key, value.into())
    }

    pub fn get_value(&self, key: &str) -> Result<Option<PrefValue>, StoreError> {
        Ok(self.ready()?.data.get(key).map(|v| v.value().clone()))
    }

    /// Value of `key` if present and of kind `T`, otherwise `default`.
    pub fn get<T: Scalar>(&self, key: &str, default: T) -> Result<T, StoreError> {
        let ready = self.ready()?;
        let found = ready.data.get(key).and_then(|v| T::from_value(v.value()));
        Ok(found.unwrap_or(default))
    }

    pub fn get_float(&self, key: &str, default: f32) -> Result<f32, StoreError> {
        self.get(key, default)
    }

    pub fn get_int(&self, key: &str, default: i32) -> Result<i32, StoreError> {
        self.get(key, default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> Result<i64, StoreError> {
        self.get(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, StoreError> {
        self.get(key, default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> Result<String, StoreError> {
        let ready = self.ready()?;
        let found = ready.data.get(key).and_then(|v| String::from_value(v.value()));
        Ok(found.unwrap_or_else(|| default.to_string()))
    }

    pub fn contains_key(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.ready()?.data.contains_key(key))
    }

    /// Remove `key` from the backend and then from memory.
    pub fn remove_at(&self, key: &str) -> Result<bool, StoreError> {
        let ready = self.ready()?;
        let mut backend = ready.backend();
        if let Err(e) = backend.commit_remove(key) {
            warn!(namespace = %ready.namespace, %key, error = %e, "preference removal failed");
            return Ok(false);
        }
        ready.data.remove(key);
        debug!(namespace = %ready.namespace, %key, "preference removed");
        Ok(true)
    }

    /// Empty the backend and then memory.
    pub fn clear_all(&self) -> Result<bool, StoreError> {
        let ready = self.ready()?;
        let mut backend = ready.backend();
        if let Err(e) = backend.commit_clear() {
            warn!(namespace = %ready.namespace, error = %e, "clearing preferences failed");
            return Ok(false);
        }
        ready.data.clear();
        debug!(namespace = %ready.namespace, "preferences cleared");
        Ok(true)
    }

    /// Snapshot of every cached entry, sorted by key.
    pub fn entries(&self) -> Result<Vec<(String, PrefValue)>, StoreError> {
        let ready = self.ready()?;
        let mut out: Vec<(String, PrefValue)> =
            ready.data.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.ready()?.data.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.ready()?.data.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryProvider;
    use crate::test_support::{CountingProvider, FlakyProvider};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Barrier;

    fn ready_store() -> Result<PreferenceStore, StoreError> {
        let store = PreferenceStore::new();
        store.init(Some(&StoreContext::new("app", MemoryProvider::new())))?;
        Ok(store)
    }

    #[test]
    fn scenario_count_and_name() -> Result<(), anyhow::Error> {
        let store = ready_store()?;
        assert!(store.put_int("count", 5)?);
        assert_eq!(store.get_int("count", -1)?, 5);
        assert!(store.remove_at("count")?);
        assert_eq!(store.get_int("count", -1)?, -1);
        assert!(!store.contains_key("count")?);
        assert!(store.put_string("name", "a")?);
        assert_eq!(store.get_int("name", 0)?, 0);
        Ok(())
    }

    #[test]
    fn removing_absent_key_succeeds_and_changes_nothing() -> Result<(), anyhow::Error> {
        let store = ready_store()?;
        store.put_int("kept", 1)?;
        assert!(store.remove_at("never-set")?);
        assert!(!store.contains_key("never-set")?);
        assert_eq!(store.len()?, 1);
        assert_eq!(store.get_int("kept", 0)?, 1);
        Ok(())
    }

    #[test]
    fn every_kind_round_trips() -> Result<(), anyhow::Error> {
        let store = ready_store()?;
        store.put_float("f", 1.25)?;
        store.put_int("i", -7)?;
        store.put_long("l", i64::MAX)?;
        store.put_bool("b", true)?;
        store.put_string("s", "hello")?;

        assert_eq!(store.get_float("f", 0.0)?, 1.25);
        assert_eq!(store.get_int("i", 0)?, -7);
        assert_eq!(store.get_long("l", 0)?, i64::MAX);
        assert!(store.get_bool("b", false)?);
        assert_eq!(store.get_string("s", "")?, "hello");
        assert_eq!(store.len()?, 5);
        Ok(())
    }

    #[test]
    fn absent_and_mismatched_keys_return_default() -> Result<(), anyhow::Error> {
        let store = ready_store()?;
        assert_eq!(store.get_float("missing", 2.5)?, 2.5);
        assert_eq!(store.get_long("missing", 9)?, 9);
        assert!(store.get_bool("missing", true)?);
        assert_eq!(store.get_string("missing", "dflt")?, "dflt");

        store.put_int("n", 5)?;
        assert_eq!(store.get_long("n", -1)?, -1);
        assert_eq!(store.get_float("n", -1.0)?, -1.0);
        assert_eq!(store.get_string("n", "x")?, "x");
        assert!(store.contains_key("n")?);
        Ok(())
    }

    #[test]
    fn overwriting_changes_kind() -> Result<(), anyhow::Error> {
        let store = ready_store()?;
        store.put_int("k", 1)?;
        store.put_bool("k", true)?;
        assert_eq!(store.get_int("k", 0)?, 0);
        assert!(store.get_bool("k", false)?);
        assert_eq!(store.len()?, 1);
        Ok(())
    }

    #[test]
    fn clear_all_removes_every_key() -> Result<(), anyhow::Error> {
        let provider = MemoryProvider::new();
        let store = PreferenceStore::new();
        store.init(Some(&StoreContext::new("app", provider.clone())))?;
        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            store.put_int(key, i as i32)?;
        }
        assert!(store.clear_all()?);
        for key in ["a", "b", "c"] {
            assert!(!store.contains_key(key)?);
        }
        assert!(store.is_empty()?);
        assert!(provider.backend("app").map(|b| b.snapshot().is_empty()).unwrap_or(false));
        Ok(())
    }

    #[test]
    fn accessors_before_init_are_rejected() {
        let store = PreferenceStore::new();
        assert!(!store.is_initialized());
        assert!(matches!(store.get_int("k", 0), Err(StoreError::Uninitialized)));
        assert!(matches!(store.put_int("k", 1), Err(StoreError::Uninitialized)));
        assert!(matches!(store.put_json("k", &json!([1])), Err(StoreError::Uninitialized)));
        assert!(matches!(store.contains_key("k"), Err(StoreError::Uninitialized)));
        assert!(matches!(store.remove_at("k"), Err(StoreError::Uninitialized)));
        assert!(matches!(store.clear_all(), Err(StoreError::Uninitialized)));
        assert!(matches!(store.entries(), Err(StoreError::Uninitialized)));
    }

    #[test]
    fn init_without_context_fails_and_stays_uninitialized() {
        let store = PreferenceStore::new();
        let err = store.init(None).err();
        assert!(matches!(err, Some(StoreError::MissingContext)));
        assert!(err.map(|e| e.is_misuse()).unwrap_or(false));
        assert!(!store.is_initialized());
    }

    #[test]
    fn init_loads_existing_contents_once() -> Result<(), anyhow::Error> {
        let provider = MemoryProvider::new();
        let first = PreferenceStore::new();
        first.init(Some(&StoreContext::new("app", provider.clone())))?;
        first.put_string("name", "a")?;

        let counting = CountingProvider::new(provider.clone());
        let second = PreferenceStore::new();
        let ctx = StoreContext::new("app", counting.clone());
        second.init(Some(&ctx))?;
        second.init(Some(&ctx))?;
        second.init(Some(&StoreContext::new("elsewhere", MemoryProvider::new())))?;

        assert_eq!(counting.loads.load(Ordering::SeqCst), 1);
        assert_eq!(second.namespace()?, "app");
        assert_eq!(second.get_string("name", "")?, "a");
        Ok(())
    }

    #[test]
    fn concurrent_init_loads_exactly_once() -> Result<(), anyhow::Error> {
        let provider = MemoryProvider::new();
        {
            let seed = PreferenceStore::new();
            seed.init(Some(&StoreContext::new("app", provider.clone())))?;
            seed.put_int("count", 5)?;
            seed.put_string("name", "a")?;
        }

        let counting = CountingProvider::new(provider).with_delay_ms(20);
        let ctx = StoreContext::new("app", counting.clone());
        let store = PreferenceStore::new();
        let threads = 8;
        let barrier = Barrier::new(threads);

        let (store, ctx, barrier) = (&store, &ctx, &barrier);
        let seen: Vec<Vec<(String, PrefValue)>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        store.init(Some(ctx)).and_then(|st| st.entries())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("init thread panicked")).collect::<Result<Vec<_>, StoreError>>()
        })?;

        assert_eq!(counting.loads.load(Ordering::SeqCst), 1);
        assert_eq!(seen.len(), threads);
        for entries in &seen {
            assert_eq!(entries, &seen[0]);
            assert_eq!(entries.len(), 2);
        }
        Ok(())
    }

    #[test]
    fn failed_load_can_be_retried() -> Result<(), anyhow::Error> {
        let flaky = FlakyProvider::new(MemoryProvider::new());
        flaky.set_failing(true);
        let store = PreferenceStore::new();
        let ctx = StoreContext::new("app", flaky.clone());

        assert!(matches!(store.init(Some(&ctx)), Err(StoreError::Io(_))));
        assert!(!store.is_initialized());

        flaky.set_failing(false);
        store.init(Some(&ctx))?;
        assert!(store.is_initialized());
        Ok(())
    }

    #[test]
    fn failed_commits_leave_memory_untouched() -> Result<(), anyhow::Error> {
        let flaky = FlakyProvider::new(MemoryProvider::new());
        let store = PreferenceStore::new();
        store.init(Some(&StoreContext::new("app", flaky.clone())))?;
        store.put_int("count", 1)?;

        flaky.set_failing(true);
        assert!(!store.put_int("count", 2)?);
        assert!(!store.put_string("fresh", "x")?);
        assert!(!store.remove_at("count")?);
        assert!(!store.clear_all()?);

        assert_eq!(store.get_int("count", -1)?, 1);
        assert!(!store.contains_key("fresh")?);
        assert_eq!(store.len()?, 1);

        flaky.set_failing(false);
        assert!(store.put_int("count", 2)?);
        assert_eq!(store.get_int("count", -1)?, 2);
        Ok(())
    }

    #[test]
    fn unsupported_json_values_are_ignored() -> Result<(), anyhow::Error> {
        let store = ready_store()?;
        assert!(!store.put_json("list", &json!([1, 2]))?);
        assert!(!store.put_json("nothing", &json!(null))?);
        assert!(!store.contains_key("list")?);

        assert!(store.put_json("n", &json!(3))?);
        assert!(store.put_json("big", &json!(10_000_000_000i64))?);
        assert_eq!(store.get_int("n", 0)?, 3);
        assert_eq!(store.get_long("big", 0)?, 10_000_000_000);
        Ok(())
    }

    #[test]
    fn concurrent_writers_keep_memory_and_backend_in_step() -> Result<(), anyhow::Error> {
        let provider = MemoryProvider::new();
        let store = PreferenceStore::new();
        store.init(Some(&StoreContext::new("app", provider.clone())))?;

        std::thread::scope(|s| {
            for t in 0..4 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..50 {
                        let _ = store.put_int(&format!("k{}", i % 10), t * 100 + i);
                        if i % 7 == 0 {
                            let _ = store.remove_at(&format!("k{}", i % 10));
                        }
                    }
                });
            }
        });

        let on_backend = provider.backend("app").map(|b| b.snapshot()).unwrap_or_default();
        let in_memory: std::collections::HashMap<_, _> = store.entries()?.into_iter().collect();
        assert_eq!(in_memory, on_backend);
        Ok(())
    }
}
