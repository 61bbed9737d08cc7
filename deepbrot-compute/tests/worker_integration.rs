use deepbrot_compute::module::NATIVE_ARENA_BASE;
use deepbrot_compute::{
    render_band, render_task_in_module, run_message_loop, ArenaError, ComputeService,
    ForeignModule, LinearMemory, MemoryArena, ModuleError, NativeModule, ServiceConfig,
};
use deepbrot_core::{
    BandGeometry, ComputeCall, IterationGrid, JobConfig, JobNumber, MainToWorker, PrecisionMode,
    Task, WorkerSetup, WorkerToMain, NOT_ESCAPED,
};
use std::sync::mpsc;
use std::thread;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn job(job_number: u32, precision: PrecisionMode) -> JobConfig {
    JobConfig {
        job_number: JobNumber(job_number),
        max_iterations: 100,
        precision,
    }
}

fn band(job: &JobConfig, geometry: &BandGeometry, first_row: u32, rows: u32) -> Task {
    Task {
        job_number: job.job_number,
        task_id: first_row,
        columns: 16,
        rows,
        geometry: geometry.clone(),
    }
}

#[test]
fn worker_thread_renders_a_frame_band_by_band() {
    init_logging();
    let job = job(7, PrecisionMode::Standard);
    let geometry =
        BandGeometry::from_center("-0.5", "0", "0.25", 16, 8, PrecisionMode::Standard).unwrap();

    let (to_worker, inbox) = mpsc::channel();
    let (post, from_worker) = mpsc::channel();
    let handle = thread::spawn(move || {
        run_message_loop(inbox, |reply| {
            let _ = post.send(reply);
        })
    });

    let send = |message: MainToWorker| {
        to_worker
            .send(serde_json::to_string(&message).unwrap())
            .unwrap()
    };
    send(MainToWorker::Setup(WorkerSetup {
        job,
        worker_number: 2,
    }));
    send(MainToWorker::Task(band(&job, &geometry, 0, 3)));
    send(MainToWorker::Task(band(&job, &geometry, 3, 5)));
    send(MainToWorker::Terminate);
    handle.join().unwrap();

    let replies: Vec<WorkerToMain> = from_worker
        .iter()
        .map(|json| serde_json::from_str(&json).unwrap())
        .collect();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0], WorkerToMain::Ready);

    let mut grid = IterationGrid::filled(16, 8, 0);
    for reply in &replies[1..] {
        match reply {
            WorkerToMain::TaskComplete(result) => {
                assert_eq!(result.worker_number, 2);
                grid.write_rows(result.task_id, &result.iteration_counts);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    let whole = render_band(&job, &band(&job, &geometry, 0, 8)).unwrap();
    for (y, row) in whole.iter().enumerate() {
        assert_eq!(grid.row(y as u32).unwrap(), row.as_slice());
    }
    // Row 4 is the real axis and column 8 is c = -0.5.
    assert_eq!(grid.get(8, 4), Some(NOT_ESCAPED));
}

#[test]
fn native_module_matches_in_process_render_at_depth() {
    init_logging();
    let precision = PrecisionMode::FixedPoint { limbs: 6 };
    let job = job(1, precision);
    let geometry = BandGeometry::from_center(
        "-0.743643887037158704752191506114774",
        "0.131825904205311970493132056385139",
        "0.0000000000000000000001",
        16,
        8,
        precision,
    )
    .unwrap();

    let mut module = NativeModule::new(256);
    let mut arena = MemoryArena::new(module.arena_region());
    for first_row in [0, 4] {
        let task = band(&job, &geometry, first_row, 4);
        let in_module = render_task_in_module(&mut module, &mut arena, &job, &task).unwrap();
        assert_eq!(in_module, render_band(&job, &task).unwrap());
    }
}

#[test]
fn small_module_reports_exhaustion() {
    let precision = PrecisionMode::FixedPoint { limbs: 6 };
    let job = job(1, precision);
    let geometry = BandGeometry::from_center("0", "0", "0.001", 16, 4, precision).unwrap();
    let task = band(&job, &geometry, 0, 4);

    let mut module = NativeModule::new(20);
    let mut arena = MemoryArena::new(module.arena_region());
    let result = render_task_in_module(&mut module, &mut arena, &job, &task);
    assert_eq!(
        result,
        Err(ModuleError::Arena(ArenaError::Exhausted {
            requested: 16,
            available: 2
        }))
    );
}

#[test]
fn module_memory_is_little_endian_words() {
    let mut module = NativeModule::new(4);
    module.write_words(NATIVE_ARENA_BASE, &[0x0102_0304]).unwrap();
    let mut out = [0u32];
    module.read_words(NATIVE_ARENA_BASE, &mut out).unwrap();
    assert_eq!(out, [0x0102_0304]);
    assert_eq!(module.size_bytes(), NATIVE_ARENA_BASE as usize + 16);
}

#[test]
fn service_answers_calls_built_from_tasks() {
    init_logging();
    let service = ComputeService::new(ServiceConfig::default()).unwrap();
    for precision in [PrecisionMode::Standard, PrecisionMode::FixedPoint { limbs: 4 }] {
        let job = job(3, precision);
        let geometry = BandGeometry::from_center("-0.5", "0", "0.25", 16, 8, precision).unwrap();
        let task = band(&job, &geometry, 2, 3);

        let call = ComputeCall::for_task(&task, job.max_iterations);
        let response = service.handle(call.endpoint(), &call.to_json().unwrap());
        assert_eq!(response.status, 200);
        let rows: Vec<Vec<i32>> = serde_json::from_str(&response.body).unwrap();
        assert_eq!(rows, render_band(&job, &task).unwrap());
    }
}
