//! Tasks (row bands) and the results workers send back for them.

use crate::geometry::BandGeometry;
use crate::job::JobNumber;
use serde::{Deserialize, Serialize};

/// Iteration count of a point that did not escape within the budget.
pub const NOT_ESCAPED: i32 = -1;

/// Iteration count written for every cell of a Task that could not be
/// computed. Distinct from [`NOT_ESCAPED`] so failed regions stay visible.
pub const COMPUTE_FAILED: i32 = -2;

/// One dispatchable band of rows. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub job_number: JobNumber,
    /// First absolute row of the band; doubles as the Task's id.
    pub task_id: u32,
    pub columns: u32,
    pub rows: u32,
    pub geometry: BandGeometry,
}

impl Task {
    pub fn first_row(&self) -> u32 {
        self.task_id
    }

    /// Rows of `COMPUTE_FAILED` covering the whole band.
    pub fn failed_counts(&self) -> Vec<Vec<i32>> {
        vec![vec![COMPUTE_FAILED; self.columns as usize]; self.rows as usize]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultStatus {
    Computed,
    /// Every attempt failed; the counts are all [`COMPUTE_FAILED`].
    Failed { attempts: u32, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub job_number: JobNumber,
    pub task_id: u32,
    pub iteration_counts: Vec<Vec<i32>>,
    pub worker_number: u32,
    pub row_count: u32,
    pub status: ResultStatus,
}

impl TaskResult {
    pub fn computed(task: &Task, worker_number: u32, iteration_counts: Vec<Vec<i32>>) -> Self {
        Self {
            job_number: task.job_number,
            task_id: task.task_id,
            row_count: iteration_counts.len() as u32,
            iteration_counts,
            worker_number,
            status: ResultStatus::Computed,
        }
    }

    /// Synthesized result for a Task whose every attempt failed.
    pub fn failed(
        task: &Task,
        worker_number: u32,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            job_number: task.job_number,
            task_id: task.task_id,
            iteration_counts: task.failed_counts(),
            worker_number,
            row_count: task.rows,
            status: ResultStatus::Failed {
                attempts,
                reason: reason.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ResultStatus::Failed { .. })
    }

    /// Whether the counts cover exactly the Task's band.
    pub fn matches_shape(&self, task: &Task) -> bool {
        self.row_count == task.rows
            && self.iteration_counts.len() == task.rows as usize
            && self
                .iteration_counts
                .iter()
                .all(|row| row.len() == task.columns as usize)
    }
}
