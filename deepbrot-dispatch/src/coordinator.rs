//! Job lifecycle: which bands are outstanding, where their rows go, and
//! which arrivals belong to a job that has since been superseded.
//!
//! Cancellation is cooperative. Starting a job does not stop work already in
//! flight for the previous one; its results are simply dropped on arrival
//! because their job number no longer matches.

use crate::error::DispatchError;
use crate::partition::partition;
use crate::progress::RenderProgress;
use deepbrot_core::{
    IterationGrid, JobConfig, JobNumber, RenderRequest, ResultStatus, Task, TaskResult,
    COMPUTE_FAILED,
};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No job, or the last one was cancelled or handed off.
    Idle,
    Awaiting,
    /// Every band is in the grid.
    Complete,
}

/// What happened to one arrival.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// For a job other than the current one; dropped.
    Stale,
    /// The band was already filled; dropped.
    Duplicate,
    /// No such band in the current job; dropped.
    Unknown,
    Accepted { remaining: usize },
    /// This arrival filled the last band.
    Completed,
}

impl Delivery {
    pub fn was_recorded(&self) -> bool {
        matches!(self, Delivery::Accepted { .. } | Delivery::Completed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskFailure {
    pub task_id: u32,
    pub attempts: u32,
    pub reason: String,
}

struct ActiveJob {
    config: JobConfig,
    pending: BTreeMap<u32, Task>,
    finished: BTreeSet<u32>,
    total: u32,
    grid: IterationGrid,
    failures: Vec<TaskFailure>,
    started: Instant,
}

pub struct JobCoordinator {
    last_job: JobNumber,
    active: Option<ActiveJob>,
    state: CoordinatorState,
}

impl Default for JobCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl JobCoordinator {
    pub fn new() -> Self {
        Self {
            last_job: JobNumber(0),
            active: None,
            state: CoordinatorState::Idle,
        }
    }

    /// Supersede whatever is running and cut `request` into bands.
    ///
    /// Returns the new job's config and its Tasks, in row order.
    pub fn start_job(
        &mut self,
        request: &RenderRequest,
        band_height: u32,
    ) -> Result<(JobConfig, Vec<Task>), DispatchError> {
        let job_number = self.last_job.next();
        let tasks = partition(job_number, request, band_height)?;
        self.last_job = job_number;

        let config = JobConfig {
            job_number,
            max_iterations: request.max_iterations,
            precision: request.precision(),
        };
        if let Some(previous) = &self.active {
            if self.state == CoordinatorState::Awaiting {
                info!(
                    "Job {} superseded with {} bands outstanding",
                    previous.config.job_number,
                    previous.pending.len()
                );
            }
        }
        info!(
            "Starting job {} with {} bands ({}x{})",
            job_number,
            tasks.len(),
            request.width,
            request.height
        );

        self.active = Some(ActiveJob {
            config,
            pending: tasks.iter().map(|task| (task.task_id, task.clone())).collect(),
            finished: BTreeSet::new(),
            total: tasks.len() as u32,
            grid: IterationGrid::filled(request.width, request.height, 0),
            failures: Vec::new(),
            started: Instant::now(),
        });
        self.state = CoordinatorState::Awaiting;
        Ok((config, tasks))
    }

    /// Drop the current job without starting another. Its results become
    /// stale.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            info!("Cancelled job {}", active.config.job_number);
        }
        self.state = CoordinatorState::Idle;
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == CoordinatorState::Complete
    }

    pub fn current_job(&self) -> Option<JobNumber> {
        self.active.as_ref().map(|active| active.config.job_number)
    }

    pub fn job_config(&self) -> Option<&JobConfig> {
        self.active.as_ref().map(|active| &active.config)
    }

    /// Ids of bands not yet returned, in row order.
    pub fn pending_tasks(&self) -> Vec<u32> {
        self.active
            .as_ref()
            .map(|active| active.pending.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn failures(&self) -> &[TaskFailure] {
        self.active
            .as_ref()
            .map(|active| active.failures.as_slice())
            .unwrap_or_default()
    }

    pub fn grid(&self) -> Option<&IterationGrid> {
        self.active.as_ref().map(|active| &active.grid)
    }

    /// Hand off the finished grid. Only a complete job gives one up.
    pub fn take_grid(&mut self) -> Option<IterationGrid> {
        if self.state != CoordinatorState::Complete {
            return None;
        }
        self.state = CoordinatorState::Idle;
        self.active.take().map(|active| active.grid)
    }

    pub fn progress(&self) -> RenderProgress {
        match &self.active {
            Some(active) => RenderProgress {
                completed_bands: active.finished.len() as u32,
                failed_bands: active.failures.len() as u32,
                total_bands: active.total,
                elapsed_ms: active.started.elapsed().as_secs_f64() * 1000.0,
                is_complete: self.state == CoordinatorState::Complete,
            },
            None => RenderProgress::default(),
        }
    }

    /// Record a result from a worker.
    pub fn deliver(&mut self, result: TaskResult) -> Delivery {
        let task = match self.claim(result.job_number, result.task_id) {
            Ok(task) => task,
            Err(delivery) => return delivery,
        };
        let Some(active) = self.active.as_mut() else {
            return Delivery::Stale;
        };

        if !result.matches_shape(&task) {
            warn!(
                "Band {} of job {} came back as {} rows, expected {}x{}",
                task.task_id, task.job_number, result.row_count, task.rows, task.columns
            );
            active.record_failure(&task, 1, "result does not match the band's shape");
        } else if let ResultStatus::Failed { attempts, reason } = &result.status {
            active.record_failure(&task, *attempts, reason);
        } else {
            active.grid.write_rows(task.task_id, &result.iteration_counts);
        }
        self.finish(task.task_id)
    }

    /// Record that a band could not be computed at all. Its rows are filled
    /// with the failure sentinel and it counts toward completion.
    pub fn fail_task(
        &mut self,
        job_number: JobNumber,
        task_id: u32,
        reason: impl Into<String>,
    ) -> Delivery {
        let task = match self.claim(job_number, task_id) {
            Ok(task) => task,
            Err(delivery) => return delivery,
        };
        if let Some(active) = self.active.as_mut() {
            active.record_failure(&task, 1, reason);
        }
        self.finish(task_id)
    }

    /// Take band `task_id` out of the pending set, or say why not.
    fn claim(&mut self, job_number: JobNumber, task_id: u32) -> Result<Task, Delivery> {
        let Some(active) = self.active.as_mut() else {
            debug!("Dropping band {task_id} of job {job_number}: no job running");
            return Err(Delivery::Stale);
        };
        if job_number != active.config.job_number {
            debug!(
                "Dropping stale band {} (job {} vs current {})",
                task_id, job_number, active.config.job_number
            );
            return Err(Delivery::Stale);
        }
        if active.finished.contains(&task_id) {
            debug!("Ignoring duplicate band {task_id} of job {job_number}");
            return Err(Delivery::Duplicate);
        }
        active.pending.remove(&task_id).ok_or_else(|| {
            warn!("Job {job_number} has no band {task_id}");
            Delivery::Unknown
        })
    }

    fn finish(&mut self, task_id: u32) -> Delivery {
        let Some(active) = self.active.as_mut() else {
            return Delivery::Stale;
        };
        active.finished.insert(task_id);
        if active.pending.is_empty() {
            self.state = CoordinatorState::Complete;
            info!(
                "Job {} complete in {:.1}ms ({} failed bands)",
                active.config.job_number,
                active.started.elapsed().as_secs_f64() * 1000.0,
                active.failures.len()
            );
            Delivery::Completed
        } else {
            Delivery::Accepted {
                remaining: active.pending.len(),
            }
        }
    }
}

impl ActiveJob {
    fn record_failure(&mut self, task: &Task, attempts: u32, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(
            "Band {} of job {} failed after {} attempts: {}",
            task.task_id, task.job_number, attempts, reason
        );
        self.grid.fill_rows(task.task_id, task.rows, COMPUTE_FAILED);
        self.failures.push(TaskFailure {
            task_id: task.task_id,
            attempts,
            reason,
        });
    }
}
