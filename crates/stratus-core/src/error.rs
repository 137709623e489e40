//! Error taxonomy of the translation core.
//!
//! Each variant corresponds to an error class the S3 front-end maps onto a
//! wire response (404 variants, 409, 412, ...). Lower-layer store failures
//! travel unchanged inside [`CoreError::Transport`]; call sites that need
//! to distinguish "absent" from "broken" use [`CoreError::is_not_found`].

use stratus_store::StoreError;

/// Convenience result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the translation core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // -----------------------------------------------------------------------
    // Absent entities
    // -----------------------------------------------------------------------
    /// The user record does not exist.
    #[error("no such user: {user_id}")]
    NoSuchUser {
        /// The user ID that was not found.
        user_id: String,
    },

    /// The bucket does not exist.
    #[error("no such bucket: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The object (or the requested version of it) does not exist.
    #[error("no such key: {key}")]
    NoSuchKey {
        /// The object key that was not found.
        key: String,
    },

    /// The multipart upload does not exist.
    #[error("no such upload: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------
    /// A create hit an entity that already exists.
    #[error("already exists: {entity}")]
    AlreadyExists {
        /// Description of the conflicting entity.
        entity: String,
    },

    /// A bucket delete was attempted while objects remain.
    #[error("bucket not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket that still contains objects.
        bucket: String,
    },

    /// An optimistic version check failed; the caller should reload and
    /// retry.
    #[error("version check failed, concurrent update detected")]
    VersionConflict,

    // -----------------------------------------------------------------------
    // Request errors
    // -----------------------------------------------------------------------
    /// A conditional check (if-match and friends) did not hold.
    #[error("precondition failed")]
    PreconditionFailed,

    /// A malformed argument: bad tag, illegal version-id marker,
    /// mismatched part list, ...
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// A non-final multipart part is below the minimum part size.
    #[error("part below the minimum multipart part size")]
    EntityTooSmall,

    /// The operation is not valid against this entity (a delete marker
    /// addressed by explicit version, for instance).
    #[error("method not allowed against this resource")]
    MethodNotAllowed,

    /// The requested behaviour exists in the protocol but not here.
    #[error("not implemented: {feature}")]
    NotImplemented {
        /// The unimplemented feature.
        feature: String,
    },

    // -----------------------------------------------------------------------
    // Record and transport failures
    // -----------------------------------------------------------------------
    /// A persisted record failed to decode.
    #[error("record decode failed: {message}")]
    Decode {
        /// What went wrong.
        message: String,
    },

    /// A store-layer failure, surfaced unchanged.
    #[error(transparent)]
    Transport(#[from] StoreError),

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether this error means "the entity is absent" rather than a
    /// failure, across both core and store layers.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NoSuchUser { .. }
            | Self::NoSuchBucket { .. }
            | Self::NoSuchKey { .. }
            | Self::NoSuchUpload { .. } => true,
            Self::Transport(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Whether this error means a create collided with an extant entity.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::AlreadyExists { .. } => true,
            Self::Transport(e) => e.is_already_exists(),
            _ => false,
        }
    }

    /// Shorthand for [`CoreError::Decode`].
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Shorthand for [`CoreError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
