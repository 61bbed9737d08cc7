//! Request handlers behind the `mb-compute` and `mb-computeHP` endpoints.
//!
//! HTTP routing is left to whatever server embeds these; [`ComputeService::handle`]
//! maps an endpoint name and a JSON body to a status code and a JSON body,
//! which is all a server (or a test transport) needs. The rows of each request
//! are spread across the service's own thread pool.

use crate::band_render::render_band_parallel;
use crate::error::{RenderError, ServiceError};
use deepbrot_core::wire::{FIXED_POINT_ENDPOINT, STANDARD_ENDPOINT};
use deepbrot_core::{ComputeRequest, ComputeResponse, FixedPoint, JobConfig, JobNumber};
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Requests to the service carry no job; their Tasks all use this number.
const SERVICE_JOB: JobNumber = JobNumber(0);

/// Threads rendering the rows of one request.
pub const DEFAULT_SERVICE_THREADS: usize = 2;

/// Largest `columns × rows` a single request may ask for.
pub const DEFAULT_MAX_CELLS: u64 = 1 << 22;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub threads: usize,
    pub max_cells: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_SERVICE_THREADS,
            max_cells: DEFAULT_MAX_CELLS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: String,
}

impl ServiceResponse {
    fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: message.into(),
        }
    }
}

pub struct ComputeService {
    config: ServiceConfig,
    pool: ThreadPool,
}

impl ComputeService {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        if config.threads == 0 {
            return Err(ServiceError::NoThreads);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("compute-{i}"))
            .build()
            .map_err(|e| ServiceError::ThreadPool(e.to_string()))?;
        info!(
            "Compute service on {} threads, at most {} cells per request",
            config.threads, config.max_cells
        );
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn compute_standard(
        &self,
        request: &ComputeRequest<f64>,
    ) -> Result<ComputeResponse, RenderError> {
        self.check_size(request.columns, request.rows)?;
        let task = request.to_task(SERVICE_JOB)?;
        let job = JobConfig {
            job_number: SERVICE_JOB,
            max_iterations: request.max_iterations,
            precision: task.geometry.precision(),
        };
        render_band_parallel(&job, &task, &self.pool)
    }

    pub fn compute_fixed_point(
        &self,
        request: &ComputeRequest<FixedPoint>,
    ) -> Result<ComputeResponse, RenderError> {
        self.check_size(request.columns, request.rows)?;
        let task = request.to_task(SERVICE_JOB)?;
        let job = JobConfig {
            job_number: SERVICE_JOB,
            max_iterations: request.max_iterations,
            precision: task.geometry.precision(),
        };
        render_band_parallel(&job, &task, &self.pool)
    }

    /// Route a request body to the handler for `endpoint`.
    pub fn handle(&self, endpoint: &str, body: &str) -> ServiceResponse {
        let endpoint = endpoint.trim_start_matches('/');
        let rows = match endpoint {
            STANDARD_ENDPOINT => parse(body).map(|request| self.compute_standard(&request)),
            FIXED_POINT_ENDPOINT => parse(body).map(|request| self.compute_fixed_point(&request)),
            _ => return ServiceResponse::error(404, format!("unknown endpoint {endpoint}")),
        };

        match rows {
            Err(response) => response,
            Ok(Err(e)) => {
                warn!("{endpoint}: {e}");
                ServiceResponse::error(400, e.to_string())
            }
            Ok(Ok(rows)) => match serde_json::to_string(&rows) {
                Ok(json) => {
                    debug!("{endpoint}: computed {} rows", rows.len());
                    ServiceResponse::ok(json)
                }
                Err(e) => ServiceResponse::error(500, e.to_string()),
            },
        }
    }

    fn check_size(&self, columns: u32, rows: u32) -> Result<(), RenderError> {
        let cells = u64::from(columns) * u64::from(rows);
        if cells > self.config.max_cells {
            return Err(RenderError::TooManyCells {
                cells,
                limit: self.config.max_cells,
            });
        }
        Ok(())
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, ServiceResponse> {
    serde_json::from_str(body).map_err(|e| ServiceResponse::error(400, format!("bad request: {e}")))
}
