//! Write-through preference cache.
//! - Mirrors a persistent key-value backend into memory; reads never hit the backend.
//! - Writes are committed to the backend before memory changes.
//! - Values are one of five scalar kinds, see [`PrefValue`].

pub mod errors;
pub mod value;
pub mod backend;
pub mod store;
#[cfg(test)]
pub mod test_support;

use once_cell::sync::Lazy;

pub use backend::{BackendProvider, JsonFileProvider, MemoryProvider, PreferenceBackend};
pub use errors::StoreError;
pub use store::{PreferenceStore, StoreContext};
pub use value::{PrefKind, PrefValue, Scalar};

static GLOBAL: Lazy<PreferenceStore> = Lazy::new(PreferenceStore::new);

/// Process-wide store for callers that want one shared instance.
///
/// It lives until process exit and starts uninitialised; call
/// `global().init(Some(&ctx))` once during startup.
pub fn global() -> &'static PreferenceStore {
    &GLOBAL
}
