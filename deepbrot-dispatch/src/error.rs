//! Dispatch error types.

use deepbrot_compute::{ArenaError, ModuleError, RenderError};
use deepbrot_core::GeometryError;
use thiserror::Error;

/// Why a single `execute` call on a worker channel failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint answered with status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Arena(#[from] ArenaError),

    #[error(transparent)]
    Module(ModuleError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("worker reported failure: {0}")]
    Worker(String),

    #[error("worker {0} is gone")]
    WorkerGone(String),

    #[error("compute task panicked or was cancelled: {0}")]
    Join(String),
}

impl ChannelError {
    /// Failures worth another attempt: the endpoint or its transport
    /// misbehaved. Anything else would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChannelError::Transport(_) | ChannelError::Status(_) | ChannelError::Malformed(_)
        )
    }
}

impl From<ModuleError> for ChannelError {
    fn from(e: ModuleError) -> Self {
        match e {
            ModuleError::Arena(arena) => ChannelError::Arena(arena),
            ModuleError::Render(render) => ChannelError::Render(render),
            other => ChannelError::Module(other),
        }
    }
}

impl From<tokio::task::JoinError> for ChannelError {
    fn from(e: tokio::task::JoinError) -> Self {
        ChannelError::Join(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("band height must be at least 1")]
    ZeroBandHeight,

    #[error("render region is empty ({width}x{height})")]
    EmptyRegion { width: u32, height: u32 },

    #[error("worker pool has no channels")]
    NoWorkers,

    #[error("no job is running")]
    NoJob,

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("invalid pool config: {0}")]
    Config(String),
}
