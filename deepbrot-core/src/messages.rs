use crate::{JobNumber, Task, TaskResult, WorkerSetup};
use serde::{Deserialize, Serialize};

/// Messages sent from the coordinator to a worker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum MainToWorker {
    /// Job parameters, sent once per job before any of its Tasks.
    Setup(WorkerSetup),

    /// Compute one band.
    Task(Task),

    /// Terminate worker.
    Terminate,
}

/// Messages sent from a worker back to the coordinator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum WorkerToMain {
    /// Worker is loaded and ready for setup.
    Ready,

    /// Worker finished a band.
    TaskComplete(TaskResult),

    /// Worker could not compute a band.
    Error {
        job_number: JobNumber,
        task_id: u32,
        message: String,
    },
}
