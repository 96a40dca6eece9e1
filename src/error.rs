/// Error type for this crate.
///
/// Only constructors surface these to callers. The admission and timing
/// queries convert every variant into a safe default.
#[derive(Debug, thiserror::Error)]
pub enum SwarmLimitError {
    /// The shared store could not be reached, or a command timed out.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] redis::RedisError),

    /// The store answered with a value of an unexpected shape.
    #[error("malformed store response: {0}")]
    MalformedStoreResponse(String),

    /// The call deadline expired or the cancellation token fired.
    #[error("operation canceled")]
    Canceled,

    /// Invalid max hits.
    #[error("invalid max hits: {0}")]
    InvalidMaxHits(String),

    /// Invalid window size.
    #[error("invalid window size: {0}")]
    InvalidWindowSize(String),

    /// Invalid store options.
    #[error("invalid store options: {0}")]
    InvalidStoreOptions(String),
}

impl SwarmLimitError {
    pub(crate) fn timed_out(after: std::time::Duration) -> Self {
        let io = std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("store command timed out after {after:?}"),
        );

        Self::StoreUnavailable(redis::RedisError::from(io))
    }
}
