//! Error types shared by the transport, the strategies and the orchestrator.

use thiserror::Error;

/// Problems with the requested run that are detected before any communication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Matrix size (n) must be divisible by the number of workers: n = {n}, workers = {workers}")]
    NotDivisible { n: usize, workers: usize },

    #[error("Matrix size (n) must be greater than zero")]
    EmptyMatrix,

    #[error("At least one worker is required")]
    NoWorkers,

    #[error("At least one repetition is required")]
    NoRepetitions,

    #[error("Transport '{0}' is not available in this build")]
    TransportUnavailable(&'static str),
}

/// Failures of a message-passing operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("rank {peer} disconnected before the operation completed")]
    Disconnected { peer: usize },

    #[error("message from rank {peer} has {actual} elements, expected {expected}")]
    SizeMismatch {
        peer: usize,
        expected: usize,
        actual: usize,
    },

    #[error("rank {rank} is out of range for a group of {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("root rank must supply the {0} buffer")]
    MissingRootBuffer(&'static str),

    #[error("worker group must contain at least one rank")]
    EmptyGroup,

    #[error("rank {rank} panicked")]
    WorkerPanicked { rank: usize },

    #[error("failed to start rank {rank}: {reason}")]
    SpawnFailed { rank: usize, reason: String },
}

/// Top-level error of a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to allocate a buffer of {elements} elements")]
    Allocation { elements: usize },

    #[error("Matrix {0} is only available on the coordinator")]
    MissingMatrix(&'static str),
}

impl BenchError {
    /// Whether this error merely reflects another rank having gone away.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            BenchError::Transport(TransportError::Disconnected { .. })
        )
    }
}
