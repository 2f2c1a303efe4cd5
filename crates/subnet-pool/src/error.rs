/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Configuration errors raised while building layouts, batches and loaders.
///
/// These are detected up front, before any store call is made.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The partition layout cannot produce a valid, non-empty plan.
    #[error("invalid partition layout: {reason}")]
    InvalidLayout { reason: String },

    /// Batches must hold at least one record.
    #[error("batch limit must be greater than 0")]
    InvalidBatchLimit,

    /// The loader configuration conflicts with itself or with the store.
    #[error("invalid loader configuration: {reason}")]
    InvalidConfig { reason: String },
}
