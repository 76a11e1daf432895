use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no context supplied; call init with a StoreContext first")]
    MissingContext,
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
    #[error("preference store used before init()")]
    Uninitialized,
    #[error("io error: {0}")]
    Io(String),
    #[error("value cannot be persisted: {0}")]
    Unrepresentable(String),
    #[error("corrupt preference file: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn io(path: &std::path::Path, e: impl std::fmt::Display) -> Self {
        Self::Io(format!("{}: {}", path.display(), e))
    }

    /// Whether the error means the caller misused the store rather than the backend failing.
    pub fn is_misuse(&self) -> bool {
        matches!(self, StoreError::MissingContext | StoreError::InvalidNamespace(_) | StoreError::Uninitialized)
    }
}
