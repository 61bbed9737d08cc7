pub mod config;
pub mod fixed_point;
pub mod geometry;
pub mod grid;
pub mod job;
pub mod messages;
pub mod precision;
pub mod task;
pub mod wire;

pub use config::{KernelConfig, MANDELBROT_KERNEL};
pub use fixed_point::{FixedPoint, FixedPointError, MulScratch};
pub use geometry::{BandGeometry, GeometryError};
pub use grid::IterationGrid;
pub use job::{JobConfig, JobNumber, PrecisionMode, RenderRequest, WorkerSetup};
pub use messages::{MainToWorker, WorkerToMain};
pub use precision::recommended_precision;
pub use task::{ResultStatus, Task, TaskResult, COMPUTE_FAILED, NOT_ESCAPED};
pub use wire::{ComputeCall, ComputeRequest, ComputeResponse};
