#![cfg(feature = "wasm")]

use deepbrot_compute::{
    render_band, render_task_in_module, ArenaError, ArenaRegion, ForeignModule, MemoryArena,
    ModuleError, WasmModule,
};
use deepbrot_core::{BandGeometry, FixedPoint, JobConfig, JobNumber, PrecisionMode, Task};

const ROW_KERNELS: &str = include_str!("data/row_kernels.wat");

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn load() -> WasmModule {
    WasmModule::from_bytes(ROW_KERNELS.as_bytes()).unwrap()
}

fn job(precision: PrecisionMode) -> JobConfig {
    JobConfig {
        job_number: JobNumber(4),
        max_iterations: 120,
        precision,
    }
}

fn task(precision: PrecisionMode, first_row: u32, rows: u32) -> Task {
    Task {
        job_number: JobNumber(4),
        task_id: first_row,
        columns: 20,
        rows,
        geometry: BandGeometry::from_center("-0.75", "0.1", "0.0625", 20, 12, precision).unwrap(),
    }
}

fn limb_sum(value: &FixedPoint) -> i32 {
    value.limbs().iter().map(|&limb| limb as i32).sum()
}

/// What the module's checksum kernel writes for `task`, worked out host-side.
fn expected_checksums(task: &Task) -> Vec<Vec<i32>> {
    let BandGeometry::FixedPoint {
        x_origin,
        dx,
        y_max,
        dy,
    } = &task.geometry
    else {
        panic!("not a fixed-point band");
    };
    let limbs = x_origin.limb_count();
    let mut down = dy.with_limbs(limbs);
    down.negate();

    (0..task.rows)
        .map(|offset| {
            let mut y = y_max.with_limbs(limbs);
            y.add_multiple(&down, task.first_row() + offset);
            let base =
                limb_sum(x_origin) + 2 * limb_sum(&dx.with_limbs(limbs)) + 3 * limb_sum(&y);
            (0..task.columns as i32).map(|column| base + column).collect()
        })
        .collect()
}

#[test]
fn module_exports_its_arena() {
    init_logging();
    let module = load();
    assert_eq!(
        module.arena_region(),
        ArenaRegion {
            base_byte: 1024,
            words: 1024
        }
    );
}

#[test]
fn standard_band_matches_in_process_render() {
    init_logging();
    let mut module = load();
    let mut arena = MemoryArena::new(module.arena_region());
    let job = job(PrecisionMode::Standard);

    for (first_row, rows) in [(0, 5), (5, 7)] {
        let task = task(PrecisionMode::Standard, first_row, rows);
        let rows = render_task_in_module(&mut module, &mut arena, &job, &task).unwrap();
        assert_eq!(rows, render_band(&job, &task).unwrap());
    }
}

#[test]
fn fixed_point_operands_reach_the_guest() {
    init_logging();
    let mut module = load();
    let mut arena = MemoryArena::new(module.arena_region());
    let precision = PrecisionMode::FixedPoint { limbs: 4 };
    let job = job(precision);

    // Two bands in a row also show the arena is reset between Tasks.
    for (first_row, rows) in [(0, 3), (3, 9)] {
        let task = task(precision, first_row, rows);
        let rows = render_task_in_module(&mut module, &mut arena, &job, &task).unwrap();
        assert_eq!(rows, expected_checksums(&task));
    }
}

#[test]
fn band_larger_than_the_arena_is_refused() {
    let mut module = load();
    let mut arena = MemoryArena::new(module.arena_region());
    let job = job(PrecisionMode::Standard);
    let task = Task {
        columns: 2000,
        ..task(PrecisionMode::Standard, 0, 1)
    };
    assert_eq!(
        render_task_in_module(&mut module, &mut arena, &job, &task),
        Err(ModuleError::Arena(ArenaError::Exhausted {
            requested: 2000,
            available: 1024
        }))
    );
}

#[test]
fn kernel_status_is_checked() {
    let mut module = load();
    assert_eq!(
        module.compute_row_hp(1024, 1024, 0, 4, 1024, 10, 1024),
        Err(ModuleError::Rejected(1))
    );
}

#[test]
fn missing_exports_are_named() {
    let without_hp = ROW_KERNELS.replace("(export \"compute_row_hp\")", "");
    assert_eq!(
        WasmModule::from_bytes(without_hp.as_bytes()).err(),
        Some(ModuleError::MissingExport("compute_row_hp".to_string()))
    );
    assert!(matches!(
        WasmModule::from_bytes(b"not a module").err(),
        Some(ModuleError::Load(_))
    ));
}
