//! Worker pool: dispatches a job's bands across channels and assembles what
//! comes back.
//!
//! Every Task runs in its own spawned future, so a slow or retrying band
//! never holds up the others. Outcomes flow back over one unbounded channel
//! and pass through the [`JobCoordinator`], which drops anything from a
//! superseded job. Must be driven from inside a tokio runtime.

use crate::channel::{LocalChannel, ModuleChannel, ThreadChannel, WorkerChannel};
use crate::config::PoolConfig;
use crate::coordinator::{CoordinatorState, Delivery, JobCoordinator, TaskFailure};
use crate::error::{ChannelError, DispatchError};
use crate::partition::calculate_band_height;
use crate::progress::RenderProgress;
use crate::remote::RemoteChannel;
use crate::retry::RetryingDispatcher;
use deepbrot_core::{IterationGrid, JobNumber, RenderRequest, TaskResult, WorkerSetup};
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::mpsc;

struct Completion {
    job_number: JobNumber,
    task_id: u32,
    worker_number: u32,
    outcome: Result<TaskResult, ChannelError>,
}

/// One processed arrival.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolEvent {
    pub job_number: JobNumber,
    pub task_id: u32,
    pub worker_number: u32,
    pub delivery: Delivery,
    pub progress: RenderProgress,
}

/// A finished job: its grid plus the bands that could not be computed.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedRender {
    pub job_number: JobNumber,
    pub grid: IterationGrid,
    pub failures: Vec<TaskFailure>,
    pub progress: RenderProgress,
}

pub struct WorkerPool {
    channels: Vec<Arc<dyn WorkerChannel>>,
    coordinator: JobCoordinator,
    sender: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    band_height: Option<u32>,
    next_channel: usize,
    stale_results: u64,
}

impl WorkerPool {
    pub fn new(
        channels: Vec<Arc<dyn WorkerChannel>>,
        config: &PoolConfig,
    ) -> Result<Self, DispatchError> {
        if channels.is_empty() {
            return Err(DispatchError::NoWorkers);
        }
        if config.band_height == Some(0) {
            return Err(DispatchError::ZeroBandHeight);
        }
        info!("Creating WorkerPool with {} workers", channels.len());
        let (sender, completions) = mpsc::unbounded_channel();
        Ok(Self {
            channels,
            coordinator: JobCoordinator::new(),
            sender,
            completions,
            band_height: config.band_height,
            next_channel: 0,
            stale_results: 0,
        })
    }

    /// `workers` in-process channels on the blocking pool.
    pub fn local(workers: usize, config: &PoolConfig) -> Result<Self, DispatchError> {
        let channels = (0..workers)
            .map(|i| Arc::new(LocalChannel::new(format!("local-{i}"))) as Arc<dyn WorkerChannel>)
            .collect();
        Self::new(channels, config)
    }

    /// `workers` dedicated message-worker threads.
    pub fn threads(workers: usize, config: &PoolConfig) -> Result<Self, DispatchError> {
        let mut channels: Vec<Arc<dyn WorkerChannel>> = Vec::with_capacity(workers);
        for i in 0..workers {
            let channel = ThreadChannel::spawn(format!("worker-{i}"))
                .map_err(|e| DispatchError::Config(e.to_string()))?;
            channels.push(Arc::new(channel));
        }
        Self::new(channels, config)
    }

    /// `workers` in-process foreign modules, each with its own arena.
    pub fn native_modules(workers: usize, config: &PoolConfig) -> Result<Self, DispatchError> {
        let channels = (0..workers)
            .map(|i| {
                let channel = ModuleChannel::native(format!("module-{i}"), config.arena_words);
                Arc::new(channel) as Arc<dyn WorkerChannel>
            })
            .collect();
        Self::new(channels, config)
    }

    /// `workers` retrying channels to the configured remote endpoint.
    pub fn remote(workers: usize, config: &PoolConfig) -> Result<Self, DispatchError> {
        let remote = config
            .remote
            .as_ref()
            .ok_or_else(|| DispatchError::Config("no remote endpoint configured".to_string()))?;
        let channels = (0..workers)
            .map(|i| {
                let channel = RemoteChannel::http(format!("remote-{i}"), remote);
                Arc::new(RetryingDispatcher::new(channel, config.retry)) as Arc<dyn WorkerChannel>
            })
            .collect();
        Self::new(channels, config)
    }

    pub fn worker_count(&self) -> usize {
        self.channels.len()
    }

    /// Supersede the running job and dispatch `request`'s bands round-robin.
    pub fn start_render(&mut self, request: &RenderRequest) -> Result<JobNumber, DispatchError> {
        let band_height = self.band_height.unwrap_or_else(|| {
            calculate_band_height(request.width, request.max_iterations, request.precision())
        });
        let (job, tasks) = self.coordinator.start_job(request, band_height)?;

        for task in tasks {
            let index = self.next_channel % self.channels.len();
            self.next_channel = self.next_channel.wrapping_add(1);

            let channel = Arc::clone(&self.channels[index]);
            let sender = self.sender.clone();
            let setup = WorkerSetup {
                job,
                worker_number: index as u32,
            };
            tokio::spawn(async move {
                let job_number = task.job_number;
                let task_id = task.task_id;
                let outcome = channel.execute(setup, task).await;
                let completion = Completion {
                    job_number,
                    task_id,
                    worker_number: setup.worker_number,
                    outcome,
                };
                if sender.send(completion).is_err() {
                    debug!("Pool dropped before band {task_id} of job {job_number} finished");
                }
            });
        }
        Ok(job.job_number)
    }

    /// Abandon the running job. Work in flight finishes but is discarded.
    pub fn cancel_current_render(&mut self) {
        self.coordinator.cancel();
    }

    /// Wait for the next arrival and record it.
    pub async fn next_event(&mut self) -> Option<PoolEvent> {
        let completion = self.completions.recv().await?;
        let delivery = match completion.outcome {
            Ok(result) => self.coordinator.deliver(result),
            Err(e) => self
                .coordinator
                .fail_task(completion.job_number, completion.task_id, e.to_string()),
        };
        if delivery == Delivery::Stale {
            self.stale_results += 1;
        }
        Some(PoolEvent {
            job_number: completion.job_number,
            task_id: completion.task_id,
            worker_number: completion.worker_number,
            delivery,
            progress: self.coordinator.progress(),
        })
    }

    /// Drive the running job to completion and take its grid.
    pub async fn wait_for_completion(&mut self) -> Result<CompletedRender, DispatchError> {
        while self.coordinator.state() == CoordinatorState::Awaiting {
            if self.next_event().await.is_none() {
                break;
            }
        }
        let job_number = self.coordinator.current_job().ok_or(DispatchError::NoJob)?;
        let failures = self.coordinator.failures().to_vec();
        let progress = self.coordinator.progress();
        let grid = self.coordinator.take_grid().ok_or(DispatchError::NoJob)?;
        Ok(CompletedRender {
            job_number,
            grid,
            failures,
            progress,
        })
    }

    /// Start `request` and wait for it to finish.
    pub async fn render(
        &mut self,
        request: &RenderRequest,
    ) -> Result<CompletedRender, DispatchError> {
        self.start_render(request)?;
        self.wait_for_completion().await
    }

    pub fn current_job(&self) -> Option<JobNumber> {
        self.coordinator.current_job()
    }

    pub fn progress(&self) -> RenderProgress {
        self.coordinator.progress()
    }

    pub fn failures(&self) -> &[TaskFailure] {
        self.coordinator.failures()
    }

    /// Arrivals dropped because their job had been superseded.
    pub fn stale_results(&self) -> u64 {
        self.stale_results
    }
}
