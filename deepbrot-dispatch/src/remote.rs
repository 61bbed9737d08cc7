//! Remote compute endpoints.
//!
//! One Task is one JSON POST to `mb-compute` (f64 frames) or `mb-computeHP`
//! (fixed-point frames). Status 200 with a well-formed body is success;
//! anything else is a failed attempt, left to [`crate::retry`] to repeat.

use crate::channel::WorkerChannel;
use crate::config::RemoteConfig;
use crate::error::ChannelError;
use deepbrot_compute::band_render::check_task;
use deepbrot_compute::{ComputeService, ServiceConfig, ServiceError};
use deepbrot_core::{ComputeCall, ComputeResponse, Task, TaskResult, WorkerSetup};
use futures::future::BoxFuture;
use log::debug;
use std::sync::Arc;

/// Status and body of one exchange with an endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Carries a JSON body to a named endpoint and brings back the answer.
pub trait ComputeTransport: Send + Sync {
    fn post(
        &self,
        endpoint: &'static str,
        body: String,
    ) -> BoxFuture<'_, Result<TransportResponse, ChannelError>>;
}

/// HTTP via `ureq`, on the blocking pool.
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(config: &RemoteConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout()).build();
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }
}

impl ComputeTransport for HttpTransport {
    fn post(
        &self,
        endpoint: &'static str,
        body: String,
    ) -> BoxFuture<'_, Result<TransportResponse, ChannelError>> {
        let agent = self.agent.clone();
        let url = self.url(endpoint);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || -> Result<TransportResponse, ChannelError> {
                let response = agent
                    .post(&url)
                    .set("Content-Type", "application/json")
                    .send_string(&body);
                match response {
                    Ok(response) => {
                        let status = response.status();
                        let body = response
                            .into_string()
                            .map_err(|e| ChannelError::Transport(e.to_string()))?;
                        Ok(TransportResponse { status, body })
                    }
                    Err(ureq::Error::Status(status, response)) => Ok(TransportResponse {
                        status,
                        body: response.into_string().unwrap_or_default(),
                    }),
                    Err(ureq::Error::Transport(e)) => Err(ChannelError::Transport(e.to_string())),
                }
            })
            .await?
        })
    }
}

/// Hands requests straight to an in-process [`ComputeService`].
#[derive(Clone)]
pub struct LoopbackTransport {
    service: Arc<ComputeService>,
}

impl LoopbackTransport {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self::with_service(Arc::new(ComputeService::new(config)?)))
    }

    /// Share one service (and its thread pool) between transports.
    pub fn with_service(service: Arc<ComputeService>) -> Self {
        Self { service }
    }
}

impl ComputeTransport for LoopbackTransport {
    fn post(
        &self,
        endpoint: &'static str,
        body: String,
    ) -> BoxFuture<'_, Result<TransportResponse, ChannelError>> {
        let service = Arc::clone(&self.service);
        Box::pin(async move {
            let response =
                tokio::task::spawn_blocking(move || service.handle(endpoint, &body)).await?;
            Ok(TransportResponse {
                status: response.status,
                body: response.body,
            })
        })
    }
}

pub struct RemoteChannel<T> {
    name: String,
    transport: T,
}

impl<T: ComputeTransport> RemoteChannel<T> {
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        Self {
            name: name.into(),
            transport,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl RemoteChannel<HttpTransport> {
    pub fn http(name: impl Into<String>, config: &RemoteConfig) -> Self {
        Self::new(name, HttpTransport::new(config))
    }
}

/// Parse an endpoint's answer for `task`, insisting on the band's shape.
pub fn parse_rows(
    task: &Task,
    response: &TransportResponse,
) -> Result<ComputeResponse, ChannelError> {
    if response.status != 200 {
        return Err(ChannelError::Status(response.status));
    }
    let rows: ComputeResponse =
        serde_json::from_str(&response.body).map_err(|e| ChannelError::Malformed(e.to_string()))?;
    if rows.len() != task.rows as usize
        || rows.iter().any(|row| row.len() != task.columns as usize)
    {
        return Err(ChannelError::Malformed(format!(
            "expected {} rows of {} counts",
            task.rows, task.columns
        )));
    }
    Ok(rows)
}

impl<T: ComputeTransport> WorkerChannel for RemoteChannel<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        setup: WorkerSetup,
        task: Task,
    ) -> BoxFuture<'_, Result<TaskResult, ChannelError>> {
        Box::pin(async move {
            check_task(&setup.job, &task)?;
            let call = ComputeCall::for_task(&task, setup.job.max_iterations);
            let body = call
                .to_json()
                .map_err(|e| ChannelError::Worker(e.to_string()))?;
            debug!(
                "{} posting band {} of job {} to {}",
                self.name,
                task.task_id,
                task.job_number,
                call.endpoint()
            );

            let response = self.transport.post(call.endpoint(), body).await?;
            let rows = parse_rows(&task, &response)?;
            Ok(TaskResult::computed(&task, setup.worker_number, rows))
        })
    }
}
