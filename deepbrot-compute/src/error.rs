//! Compute error types.

use deepbrot_core::{FixedPointError, GeometryError, JobNumber};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("arena exhausted: requested {requested} words, {available} available")]
    Exhausted { requested: u32, available: u32 },

    #[error("arena handle from generation {handle} is no longer live (now {current})")]
    StaleHandle { handle: u32, current: u32 },

    #[error("only the most recent allocation can be freed")]
    OutOfOrderFree,

    #[error("access of {len} words at byte {offset} is outside linear memory")]
    OutOfBounds { offset: u32, len: u32 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("task {task_id} arrived before any setup")]
    NotSetUp { task_id: u32 },

    #[error("task belongs to job {task} but the worker is set up for job {setup}")]
    JobMismatch { setup: JobNumber, task: JobNumber },

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("invalid fixed-point operand: {0}")]
    Operand(#[from] FixedPointError),

    #[error("request covers {cells} cells, more than the limit of {limit}")]
    TooManyCells { cells: u64, limit: u64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Arena(#[from] ArenaError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("module does not export `{0}`")]
    MissingExport(String),

    #[error("failed to load module: {0}")]
    Load(String),

    #[error("module call trapped: {0}")]
    Trap(String),

    #[error("kernel rejected its input with status {0}")]
    Rejected(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("the compute service needs at least one thread")]
    NoThreads,

    #[error("failed to start the compute thread pool: {0}")]
    ThreadPool(String),
}
