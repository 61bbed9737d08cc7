//! Retries with linear backoff around any worker channel.
//!
//! Failures that another attempt could fix (transport errors, non-200
//! status, malformed bodies) are retried up to `retry_limit` times, the k-th
//! retry after `k × backoff_step_ms`. The wait is a timer, so other Tasks
//! keep running meanwhile. When every attempt fails the Task still
//! completes, with a result whose cells all read `COMPUTE_FAILED` and whose
//! status says why. Other errors are returned at once.

use crate::channel::WorkerChannel;
use crate::config::RetryPolicy;
use crate::error::ChannelError;
use deepbrot_core::{Task, TaskResult, WorkerSetup};
use futures::future::BoxFuture;
use log::{error, warn};

pub struct RetryingDispatcher<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: WorkerChannel> RetryingDispatcher<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: WorkerChannel> WorkerChannel for RetryingDispatcher<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn execute(
        &self,
        setup: WorkerSetup,
        task: Task,
    ) -> BoxFuture<'_, Result<TaskResult, ChannelError>> {
        Box::pin(async move {
            let mut retries = 0;
            loop {
                let error = match self.inner.execute(setup, task.clone()).await {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() => e,
                    Err(e) => return Err(e),
                };

                if retries >= self.policy.retry_limit {
                    error!(
                        "{}: band {} of job {} failed after {} attempts: {}",
                        self.name(),
                        task.task_id,
                        task.job_number,
                        retries + 1,
                        error
                    );
                    return Ok(TaskResult::failed(
                        &task,
                        setup.worker_number,
                        retries + 1,
                        error.to_string(),
                    ));
                }

                retries += 1;
                let delay = self.policy.backoff(retries);
                warn!(
                    "{}: band {} of job {} failed ({}), retry {}/{} in {}ms",
                    self.name(),
                    task.task_id,
                    task.job_number,
                    error,
                    retries,
                    self.policy.retry_limit,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        })
    }
}
