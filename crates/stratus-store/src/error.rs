//! Error type for store substrate operations.

/// Convenience result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the index and object services.
///
/// Callers of the gateway core distinguish [`StoreError::NotFound`] and
/// [`StoreError::AlreadyExists`] from genuine transport failures; everything
/// else propagates unchanged.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed index, key, or object does not exist.
    #[error("entity not found")]
    NotFound,

    /// A create (or non-overwriting put) hit an existing entity.
    #[error("entity already exists")]
    AlreadyExists,

    /// The layout catalog has no layout suitable for the requested size.
    #[error("no layout available for object size {size}")]
    NoLayout {
        /// The object size that could not be matched.
        size: u64,
    },

    /// A malformed argument reached the service boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A persisted buffer failed to decode.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The service transport failed.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl StoreError {
    /// Whether this error denotes a missing entity rather than a failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether this error denotes an existing entity on create.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }
}
