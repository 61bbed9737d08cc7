//! Message-driven worker: the setup / task / result protocol.
//!
//! A worker receives one `Setup` per job, then any number of `Task`s for that
//! job, and answers each Task with `TaskComplete` or `Error`. It keeps its
//! setup in its own state, so several workers can run side by side.

use crate::band_render::render_task;
use crate::error::RenderError;
use deepbrot_core::{MainToWorker, Task, WorkerSetup, WorkerToMain};
use log::{debug, error, info};
use std::sync::mpsc::Receiver;

#[derive(Debug, Default)]
pub struct Worker {
    setup: Option<WorkerSetup>,
    terminated: bool,
}

impl Worker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn setup(&self) -> Option<&WorkerSetup> {
        self.setup.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Apply one message. Returns the reply to post, if any.
    pub fn handle(&mut self, message: MainToWorker) -> Option<WorkerToMain> {
        match message {
            MainToWorker::Setup(setup) => {
                debug!(
                    "Worker {} set up for job {}",
                    setup.worker_number, setup.job.job_number
                );
                self.setup = Some(setup);
                None
            }
            MainToWorker::Task(task) => Some(self.run(&task)),
            MainToWorker::Terminate => {
                self.terminated = true;
                None
            }
        }
    }

    /// [`handle`](Self::handle) for JSON-encoded messages.
    pub fn handle_json(&mut self, message_json: &str) -> Result<Option<String>, serde_json::Error> {
        let message: MainToWorker = serde_json::from_str(message_json)?;
        self.handle(message)
            .map(|reply| serde_json::to_string(&reply))
            .transpose()
    }

    fn run(&self, task: &Task) -> WorkerToMain {
        let result = match &self.setup {
            Some(setup) => render_task(setup, task),
            None => Err(RenderError::NotSetUp {
                task_id: task.task_id,
            }),
        };
        match result {
            Ok(result) => WorkerToMain::TaskComplete(result),
            Err(e) => {
                error!("Task {} of job {} failed: {}", task.task_id, task.job_number, e);
                WorkerToMain::Error {
                    job_number: task.job_number,
                    task_id: task.task_id,
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Run a worker over a stream of JSON messages until `Terminate` arrives or
/// the sender hangs up. Replies are handed to `post`, starting with `Ready`.
pub fn run_message_loop(inbox: Receiver<String>, mut post: impl FnMut(String)) {
    let mut worker = Worker::new();
    if let Ok(ready) = serde_json::to_string(&WorkerToMain::Ready) {
        post(ready);
    }

    for message in inbox {
        match worker.handle_json(&message) {
            Ok(Some(reply)) => post(reply),
            Ok(None) => {}
            Err(e) => error!("Worker could not parse message: {e}"),
        }
        if worker.is_terminated() {
            break;
        }
    }
    info!("Worker message loop stopped");
}
