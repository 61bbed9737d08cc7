pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod partition;
pub mod pool;
pub mod progress;
pub mod remote;
pub mod retry;

pub use channel::{LocalChannel, ModuleChannel, ModuleInstaller, ThreadChannel, WorkerChannel};
pub use config::{PoolConfig, RemoteConfig, RetryPolicy};
pub use coordinator::{CoordinatorState, Delivery, JobCoordinator, TaskFailure};
pub use error::{ChannelError, DispatchError};
pub use partition::{calculate_band_height, partition, MAX_BAND_HEIGHT};
pub use pool::{CompletedRender, PoolEvent, WorkerPool};
pub use progress::RenderProgress;
pub use remote::{ComputeTransport, HttpTransport, LoopbackTransport, RemoteChannel};
pub use retry::RetryingDispatcher;
