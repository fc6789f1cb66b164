use thiserror::Error;

/// Error type for pool and queue construction and task completion.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A constructor was given an unusable configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A submitted task was dropped before it produced a result.
    ///
    /// This happens when the task loses a race with pool shutdown, or
    /// when its closure panics before sending the result back.
    #[error("task was canceled before completion")]
    TaskCanceled,
}

/// Result type alias for shardpool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
