//! Cache error types.
//!
//! Mirrors the distinction the source draws between a real failure
//! (allocation, export/import) and a programming error (nested lock,
//! unlock-without-lock, out-of-order lock, null key): the latter are logged
//! at `error` level at the call site *and* returned here so a caller that
//! wants the historical "log and carry on" behavior can discard the `Err`
//! with a clear conscience — cache state is left untouched in every variant.

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An internal allocation/insertion failed; no partial state was left.
    #[error("cache allocation failed: {0}")]
    AllocationFailed(String),

    /// Attempted to acquire a lock already held by the same name.
    #[error("nested locking attempted on {0}")]
    NestedLock(String),

    /// Attempted to release a lock that was never acquired.
    #[error("attempt to unlock unheld lock {0}")]
    UnlockNotHeld(String),

    /// Acquiring `attempted` while `held` is held would violate lock
    /// acquisition ordering.
    #[error("lock {attempted} must be requested before {held}, not after")]
    LockOrderViolation { attempted: String, held: String },

    /// A registered entry was handed a null/empty key where one is required.
    #[error("null key handed to cache")]
    NullKey,

    /// The metadata exporter failed to serialize a VG.
    #[error("failed to export VG metadata: {0}")]
    ExportFailed(String),

    /// The metadata parser failed to reimport a previously exported VG.
    #[error("failed to import VG metadata: {0}")]
    ImportFailed(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
