//! Error types for pmap.

use {super::context::Cancelled, thiserror::Error};

/// Invalid executor configuration, reported before any thread is started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The worker count was zero.
    #[error("worker count must be at least 1")]
    ZeroWorkers,
}

/// Errors a parallel map can terminate with.
///
/// Exactly one error is reported per run, and partial output is never
/// returned alongside it.
#[derive(Debug, Error)]
pub enum Error<E> {
    /// The executor was misconfigured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transformation failed for the input at `index`. When several
    /// inputs fail, this is the first failure recorded.
    #[error("transformation failed for item {index}: {error}")]
    Failed { index: usize, error: E },

    /// The caller's context was cancelled or its deadline passed before
    /// the run completed.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl<E> Error<E> {
    /// Returns the transformation error, if that is what ended the run.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Error::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns the failing input position for [`Error::Failed`].
    pub fn index(&self) -> Option<usize> {
        match self {
            Error::Failed { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}
