//! JSON shapes of the remote compute call.
//!
//! A remote endpoint receives one band as `{xmin, dx, ymax, dy, columns,
//! firstRow, rows, maxIterations}` and answers with an array of rows of
//! iteration counts. Row `i` of the band sits at `y = ymax - (firstRow + i)·dy`.
//! The fixed-point endpoint takes the same body with the four coordinates as
//! limb arrays.

use crate::geometry::{BandGeometry, GeometryError};
use crate::{FixedPoint, JobNumber, Task};
use serde::{Deserialize, Serialize};

/// Endpoint path for `f64` bands.
pub const STANDARD_ENDPOINT: &str = "mb-compute";

/// Endpoint path for fixed-point bands.
pub const FIXED_POINT_ENDPOINT: &str = "mb-computeHP";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeRequest<C> {
    pub xmin: C,
    pub dx: C,
    pub ymax: C,
    pub dy: C,
    pub columns: u32,
    pub first_row: u32,
    pub rows: u32,
    pub max_iterations: u32,
}

/// Response body: one array of counts per row.
pub type ComputeResponse = Vec<Vec<i32>>;

impl ComputeRequest<f64> {
    /// Rebuild the Task this request describes.
    pub fn to_task(&self, job_number: JobNumber) -> Result<Task, GeometryError> {
        Ok(Task {
            job_number,
            task_id: self.first_row,
            columns: self.columns,
            rows: self.rows,
            geometry: BandGeometry::standard(self.xmin, self.dx, self.ymax, self.dy)?,
        })
    }
}

impl ComputeRequest<FixedPoint> {
    pub fn to_task(&self, job_number: JobNumber) -> Result<Task, GeometryError> {
        Ok(Task {
            job_number,
            task_id: self.first_row,
            columns: self.columns,
            rows: self.rows,
            geometry: BandGeometry::fixed_point(
                self.xmin.clone(),
                self.dx.clone(),
                self.ymax.clone(),
                self.dy.clone(),
            )?,
        })
    }
}

/// A request ready to post, with the endpoint it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub enum ComputeCall {
    Standard(ComputeRequest<f64>),
    FixedPoint(ComputeRequest<FixedPoint>),
}

impl ComputeCall {
    pub fn for_task(task: &Task, max_iterations: u32) -> Self {
        match &task.geometry {
            BandGeometry::Standard {
                x_origin,
                dx,
                y_max,
                dy,
            } => ComputeCall::Standard(ComputeRequest {
                xmin: *x_origin,
                dx: *dx,
                ymax: *y_max,
                dy: *dy,
                columns: task.columns,
                first_row: task.task_id,
                rows: task.rows,
                max_iterations,
            }),
            BandGeometry::FixedPoint {
                x_origin,
                dx,
                y_max,
                dy,
            } => ComputeCall::FixedPoint(ComputeRequest {
                xmin: x_origin.clone(),
                dx: dx.clone(),
                ymax: y_max.clone(),
                dy: dy.clone(),
                columns: task.columns,
                first_row: task.task_id,
                rows: task.rows,
                max_iterations,
            }),
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            ComputeCall::Standard(_) => STANDARD_ENDPOINT,
            ComputeCall::FixedPoint(_) => FIXED_POINT_ENDPOINT,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            ComputeCall::Standard(request) => serde_json::to_string(request),
            ComputeCall::FixedPoint(request) => serde_json::to_string(request),
        }
    }
}
