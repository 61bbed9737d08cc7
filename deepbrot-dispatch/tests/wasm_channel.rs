#![cfg(feature = "wasm")]

use deepbrot_compute::{render_band, ModuleError};
use deepbrot_core::{BandGeometry, JobConfig, JobNumber, PrecisionMode, Task, WorkerSetup};
use deepbrot_dispatch::{ChannelError, ModuleChannel, WorkerChannel};

const ROW_KERNELS: &str = include_str!("../../deepbrot-compute/tests/data/row_kernels.wat");

fn setup() -> WorkerSetup {
    WorkerSetup {
        job: JobConfig {
            job_number: JobNumber(6),
            max_iterations: 90,
            precision: PrecisionMode::Standard,
        },
        worker_number: 2,
    }
}

fn task() -> Task {
    Task {
        job_number: JobNumber(6),
        task_id: 1,
        columns: 12,
        rows: 4,
        geometry: BandGeometry::standard(-2.0, 0.25, 1.25, 0.25).unwrap(),
    }
}

#[tokio::test]
async fn loading_a_module_releases_waiting_tasks() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (channel, installer) = ModuleChannel::pending("wasm-0");
    assert!(!channel.is_loaded());

    let waiting = tokio::spawn(async move { channel.execute(setup(), task()).await });
    tokio::task::yield_now().await;
    assert!(!waiting.is_finished());

    installer.load_wasm(ROW_KERNELS.as_bytes().to_vec()).await.unwrap();
    let result = waiting.await.unwrap().unwrap();

    assert_eq!(result.worker_number, 2);
    assert_eq!(result.iteration_counts, render_band(&setup().job, &task()).unwrap());
}

#[tokio::test]
async fn failed_load_fails_waiting_tasks() {
    let (channel, installer) = ModuleChannel::pending("wasm-1");
    let waiting = tokio::spawn(async move { channel.execute(setup(), task()).await });

    let loaded = installer.load_wasm(b"not a module".to_vec()).await;
    assert!(matches!(loaded, Err(ChannelError::Module(ModuleError::Load(_)))));
    assert!(matches!(waiting.await.unwrap(), Err(ChannelError::WorkerGone(_))));
}
