//! Error types shared by every solver backend.

use thiserror::Error;

/// Result type for solver operations
pub type Result<T> = std::result::Result<T, SolveError>;

/// Errors that can occur while searching for the longest chain
#[derive(Debug, Error)]
pub enum SolveError {
    /// The ceiling must be a positive integer
    #[error("ceiling must be at least 1, got {ceiling}")]
    InvalidCeiling { ceiling: u64 },

    /// The parallel backend needs at least one worker
    #[error("worker count must be at least 1")]
    NoWorkers,

    /// A term of the chain did not fit in 64 bits
    #[error("chain starting at {number} overflowed 64-bit arithmetic")]
    Overflow { number: u64 },

    /// The memo table for this ceiling cannot be allocated
    #[error("ceiling {ceiling} is too large for an in-memory table")]
    TableTooLarge { ceiling: u64 },

    /// Zero has no Collatz chain
    #[error("{number} has no Collatz chain")]
    InvalidNumber { number: u64 },

    /// Lookup beyond the end of a memo table
    #[error("number {number} is outside the table (ceiling {ceiling})")]
    OutOfRange { number: u64, ceiling: u64 },

    /// A private table was read before the entry was computed
    #[error("chain length of {number} has not been computed yet")]
    Unresolved { number: u64 },

    /// A shared table was abandoned by a failed worker
    #[error("memo table was poisoned by a failed worker")]
    TablePoisoned,

    /// A worker reported an error instead of a result
    #[error("worker {worker} failed: {source}")]
    WorkerFailed {
        worker: usize,
        #[source]
        source: Box<SolveError>,
    },

    /// A worker terminated without reporting
    #[error("worker {worker} exited before reporting")]
    WorkerExited { worker: usize },

    /// A worker was handed work before it was given a table
    #[error("worker {worker} received work before its table")]
    NotInitialised { worker: usize },

    /// The number of queues does not match the number of workers
    #[error("{queues} queues for {workers} workers")]
    QueueMismatch { queues: usize, workers: usize },

    /// Every worker hung up before the completion barrier was reached
    #[error("worker pool disconnected after {completed} of {expected} reports")]
    PoolDisconnected { completed: usize, expected: usize },

    /// The thread running an asynchronous solve panicked
    #[error("asynchronous solve was abandoned")]
    Abandoned,

    /// Spawning a worker thread failed
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Unrecognised backend, aggregation or partition name
    #[error("unknown {kind} `{name}`")]
    UnknownOption { kind: &'static str, name: String },
}

impl SolveError {
    pub fn worker_failed(worker: usize, source: SolveError) -> Self {
        SolveError::WorkerFailed {
            worker,
            source: Box::new(source),
        }
    }

    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        SolveError::UnknownOption {
            kind,
            name: name.into(),
        }
    }
}
