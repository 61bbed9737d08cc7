//! Job identity and the immutable per-job configuration handed to workers.

use crate::geometry::BandGeometry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation id of a render request. Higher numbers supersede lower ones.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobNumber(pub u32);

impl JobNumber {
    pub fn next(self) -> Self {
        JobNumber(self.0.wrapping_add(1))
    }
}

impl fmt::Display for JobNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which escape kernel a job runs, and at what precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PrecisionMode {
    /// Plain `f64` arithmetic.
    Standard,
    /// [`FixedPoint`](crate::FixedPoint) arithmetic with `limbs` 16-bit limbs.
    FixedPoint { limbs: usize },
}

impl PrecisionMode {
    pub fn limbs(&self) -> Option<usize> {
        match self {
            PrecisionMode::Standard => None,
            PrecisionMode::FixedPoint { limbs } => Some(*limbs),
        }
    }

    pub fn is_fixed_point(&self) -> bool {
        matches!(self, PrecisionMode::FixedPoint { .. })
    }
}

/// Read-only parameters shared by every Task of one job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub job_number: JobNumber,
    pub max_iterations: u32,
    pub precision: PrecisionMode,
}

/// Payload of the setup message each worker receives once per job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSetup {
    pub job: JobConfig,
    pub worker_number: u32,
}

/// A render request as handed over by the caller: pixel extent, iteration
/// budget and the coordinate frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub width: u32,
    pub height: u32,
    pub max_iterations: u32,
    pub geometry: BandGeometry,
}

impl RenderRequest {
    pub fn precision(&self) -> PrecisionMode {
        self.geometry.precision()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
