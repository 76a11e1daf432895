use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use super::{validate_namespace, BackendProvider, PreferenceBackend};
use crate::errors::StoreError;
use crate::value::PrefValue;

/// JSON file holding one namespace as a map of `key -> tagged value`.
///
/// Each commit writes a sibling temp file, syncs it and renames it over the
/// original, so a crash leaves either the old or the new contents. Entries
/// that do not decode to a known kind are kept on disk untouched but never
/// handed to the store.
pub struct JsonFileBackend {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl JsonFileBackend {
    /// Open the file at `path`, creating it (and its parent directory) with an empty map if missing.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
        }

        let mut backend = Self { path, entries: BTreeMap::new() };
        if backend.path.exists() {
            backend.entries = read_entries(&backend.path)?;
        } else {
            backend.persist(&BTreeMap::new())?;
            debug!(path = %backend.path.display(), "created empty preference file");
        }
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(entries).map_err(|e| StoreError::io(&self.path, e))?;
        let tmp = self.temp_path();
        let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(&data).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }

    /// Persist `next` and adopt it only once it is on disk.
    fn commit(&mut self, next: BTreeMap<String, Value>) -> Result<(), StoreError> {
        self.persist(&next)?;
        self.entries = next;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, Value>, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(BTreeMap::new());
    }
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
}

impl PreferenceBackend for JsonFileBackend {
    fn load_all(&mut self) -> Result<HashMap<String, PrefValue>, StoreError> {
        self.entries = read_entries(&self.path)?;
        let mut out = HashMap::with_capacity(self.entries.len());
        for (key, raw) in &self.entries {
            match serde_json::from_value::<PrefValue>(raw.clone()) {
                Ok(value) => {
                    out.insert(key.clone(), value);
                }
                Err(e) => {
                    warn!(path = %self.path.display(), %key, error = %e, "skipping preference entry of unsupported type");
                }
            }
        }
        Ok(out)
    }

    fn commit_put(&mut self, key: &str, value: &PrefValue) -> Result<(), StoreError> {
        // JSON has no NaN or infinity; serde_json would write them as null.
        if let PrefValue::Float(f) = value {
            if !f.is_finite() {
                return Err(StoreError::Unrepresentable(format!("`{key}` = {f} cannot be stored as JSON")));
            }
        }
        let encoded = serde_json::to_value(value).map_err(|e| StoreError::io(&self.path, e))?;
        let mut next = self.entries.clone();
        next.insert(key.to_string(), encoded);
        self.commit(next)
    }

    fn commit_remove(&mut self, key: &str) -> Result<(), StoreError> {
        if !self.entries.contains_key(key) {
            return Ok(());
        }
        let mut next = self.entries.clone();
        next.remove(key);
        self.commit(next)
    }

    fn commit_clear(&mut self) -> Result<(), StoreError> {
        self.commit(BTreeMap::new())
    }
}

/// Opens `<data_dir>/<namespace>.json`.
///
/// Keep one store per namespace: each backend rewrites the whole file from
/// its own snapshot, so two open on the same file overwrite each other.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    data_dir: PathBuf,
}

impl JsonFileProvider {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn path_for(&self, namespace: &str) -> PathBuf {
        self.data_dir.join(format!("{namespace}.json"))
    }
}

impl BackendProvider for JsonFileProvider {
    fn open(&self, namespace: &str) -> Result<Box<dyn PreferenceBackend>, StoreError> {
        validate_namespace(namespace)?;
        let backend = JsonFileBackend::open(self.path_for(namespace))?;
        Ok(Box::new(backend))
    }
}
