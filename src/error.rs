/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with buckets, queues and controllers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A constructor or an operation received an out-of-range argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The request cannot be processed right now.
    #[error("Cannot process the request for {tokens} tokens")]
    RateLimit {
        /// The amount of tokens that was requested.
        tokens: f64,
    },
    /// The scheduler already holds as many pending requests as it allows.
    #[error("Reached the maximum of {max_pending} pending requests")]
    ReachedMaxPending {
        /// The configured pending limit.
        max_pending: usize,
    },
    /// A queue was accessed while empty.
    #[error("Queue is empty")]
    Empty,
    /// The element to remove is not in the queue.
    #[error("Element is not present in the queue")]
    NotInQueue,
    /// The scope has to be entered before it can be used.
    #[error("The scope has not been entered")]
    NotEntered,
    /// The scope can only be entered once.
    #[error("The scope cannot be entered more than once")]
    AlreadyEntered,
    /// The scope has been exited and cannot be used or reopened.
    #[error("The scope has been closed")]
    Closed,
    /// Entering a scope requires a running tokio runtime.
    #[error("No tokio runtime is available to run background tasks")]
    NoRuntime,
}
