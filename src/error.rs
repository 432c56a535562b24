use thiserror::Error;

/// Error variants shared by all builders and readers.
#[derive(Debug, Error)]
pub enum Error {
    /// Two distinct inputs produced the same 64-bit hash, or a build retry
    /// budget was exhausted. Retry with a different seed or parameters.
    #[error("two distinct inputs share a 64-bit hash")]
    HashCollision,

    /// A serialized buffer was truncated, misaligned or internally
    /// inconsistent.
    #[error("truncated or misaligned serialized data")]
    CorruptData,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
