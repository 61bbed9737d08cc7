//! Band rendering logic shared by every worker.
//!
//! In-process workers, the compute service and the foreign-module guest all
//! reach the kernels through these functions, so each one computes a band
//! exactly the same way.

use crate::error::RenderError;
use crate::escape::{iterate, EscapeKernel, FixedPointKernel};
use deepbrot_core::{
    BandGeometry, FixedPoint, FixedPointError, JobConfig, Task, TaskResult, WorkerSetup,
};
use rayon::prelude::*;
use rayon::ThreadPool;

/// y of absolute row `row` in an `f64` frame.
pub fn row_y(y_max: f64, dy: f64, row: u32) -> f64 {
    y_max - f64::from(row) * dy
}

/// Fill `out` with the counts of one `f64` row starting at `x_origin`.
pub fn standard_row(x_origin: f64, dx: f64, y: f64, max_iterations: u32, out: &mut [i32]) {
    for (column, count) in out.iter_mut().enumerate() {
        let x = x_origin + column as f64 * dx;
        *count = iterate(x, y, max_iterations);
    }
}

/// Fill `out` with the counts of one fixed-point row, one column per entry
/// of `xs`.
pub fn fixed_point_row(
    kernel: &mut FixedPointKernel,
    xs: &[FixedPoint],
    y: &FixedPoint,
    max_iterations: u32,
    out: &mut [i32],
) {
    for (x, count) in xs.iter().zip(out.iter_mut()) {
        *count = kernel.iterate(x, y, max_iterations);
    }
}

/// One fixed-point row from raw limbs, as a foreign kernel receives them.
pub fn fixed_point_row_from_limbs(
    x_origin: &[u32],
    dx: &[u32],
    y: &[u32],
    max_iterations: u32,
    out: &mut [i32],
) -> Result<(), FixedPointError> {
    let x_origin = FixedPoint::from_limbs(x_origin.to_vec())?;
    let dx = FixedPoint::from_limbs(dx.to_vec())?;
    let y = FixedPoint::from_limbs(y.to_vec())?;
    let xs = FixedPoint::ladder(&x_origin, &dx, out.len());
    let mut kernel = FixedPointKernel::new(x_origin.limb_count());
    fixed_point_row(&mut kernel, &xs, &y, max_iterations, out);
    Ok(())
}

/// Reject a Task that does not belong to `job` or whose frame has the
/// wrong precision.
pub fn check_task(job: &JobConfig, task: &Task) -> Result<(), RenderError> {
    if task.job_number != job.job_number {
        return Err(RenderError::JobMismatch {
            setup: job.job_number,
            task: task.job_number,
        });
    }
    task.geometry.check_precision(job.precision)?;
    Ok(())
}

/// A fixed-point band brought to one precision: the column ladder, the y of
/// its first row and the (negative) step to the next row.
struct FixedPointBand {
    limbs: usize,
    xs: Vec<FixedPoint>,
    first_y: FixedPoint,
    down: FixedPoint,
}

impl FixedPointBand {
    fn new(
        x_origin: &FixedPoint,
        dx: &FixedPoint,
        y_max: &FixedPoint,
        dy: &FixedPoint,
        task: &Task,
    ) -> Self {
        let limbs = x_origin.limb_count();
        let xs = FixedPoint::ladder(x_origin, &dx.with_limbs(limbs), task.columns as usize);

        let mut down = dy.with_limbs(limbs);
        down.negate();
        let mut first_y = y_max.with_limbs(limbs);
        first_y.add_multiple(&down, task.first_row());

        Self {
            limbs,
            xs,
            first_y,
            down,
        }
    }

    /// y of the row `offset` rows into the band. Exact, so it equals
    /// stepping down row by row.
    fn y(&self, offset: u32) -> FixedPoint {
        let mut y = self.first_y.clone();
        y.add_multiple(&self.down, offset);
        y
    }
}

/// Rows of iteration counts for `task`.
pub fn render_band(job: &JobConfig, task: &Task) -> Result<Vec<Vec<i32>>, RenderError> {
    check_task(job, task)?;
    let columns = task.columns as usize;
    let mut rows = Vec::with_capacity(task.rows as usize);

    match &task.geometry {
        BandGeometry::Standard {
            x_origin,
            dx,
            y_max,
            dy,
        } => {
            for offset in 0..task.rows {
                let y = row_y(*y_max, *dy, task.first_row() + offset);
                let mut row = vec![0; columns];
                standard_row(*x_origin, *dx, y, job.max_iterations, &mut row);
                rows.push(row);
            }
        }
        BandGeometry::FixedPoint {
            x_origin,
            dx,
            y_max,
            dy,
        } => {
            let band = FixedPointBand::new(x_origin, dx, y_max, dy, task);
            let mut y = band.first_y.clone();
            let mut kernel = FixedPointKernel::new(band.limbs);
            for _ in 0..task.rows {
                let mut row = vec![0; columns];
                fixed_point_row(&mut kernel, &band.xs, &y, job.max_iterations, &mut row);
                rows.push(row);
                y.add(&band.down);
            }
        }
    }

    Ok(rows)
}

/// [`render_band`] with the rows spread across `pool`. Produces the same rows.
pub fn render_band_parallel(
    job: &JobConfig,
    task: &Task,
    pool: &ThreadPool,
) -> Result<Vec<Vec<i32>>, RenderError> {
    check_task(job, task)?;
    let columns = task.columns as usize;
    let max_iterations = job.max_iterations;

    let rows: Vec<Vec<i32>> = match &task.geometry {
        BandGeometry::Standard {
            x_origin,
            dx,
            y_max,
            dy,
        } => pool.install(|| {
            (0..task.rows)
                .into_par_iter()
                .map(|offset| {
                    let y = row_y(*y_max, *dy, task.first_row() + offset);
                    let mut row = vec![0; columns];
                    standard_row(*x_origin, *dx, y, max_iterations, &mut row);
                    row
                })
                .collect()
        }),
        BandGeometry::FixedPoint {
            x_origin,
            dx,
            y_max,
            dy,
        } => {
            let band = FixedPointBand::new(x_origin, dx, y_max, dy, task);
            pool.install(|| {
                (0..task.rows)
                    .into_par_iter()
                    .map_init(
                        || FixedPointKernel::new(band.limbs),
                        |kernel, offset| {
                            let mut row = vec![0; columns];
                            let y = band.y(offset);
                            fixed_point_row(kernel, &band.xs, &y, max_iterations, &mut row);
                            row
                        },
                    )
                    .collect()
            })
        }
    };

    Ok(rows)
}

/// Render `task` and wrap the rows in a result from this worker.
pub fn render_task(setup: &WorkerSetup, task: &Task) -> Result<TaskResult, RenderError> {
    let rows = render_band(&setup.job, task)?;
    Ok(TaskResult::computed(task, setup.worker_number, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepbrot_core::{JobNumber, PrecisionMode, NOT_ESCAPED};

    fn job(precision: PrecisionMode) -> JobConfig {
        JobConfig {
            job_number: JobNumber(1),
            max_iterations: 64,
            precision,
        }
    }

    fn standard_task(first_row: u32, rows: u32) -> Task {
        Task {
            job_number: JobNumber(1),
            task_id: first_row,
            columns: 8,
            rows,
            geometry: BandGeometry::standard(-2.0, 0.5, 1.0, 0.25).unwrap(),
        }
    }

    fn fixed_task(first_row: u32, rows: u32, limbs: usize) -> Task {
        let fp = |v: f64| FixedPoint::from_f64(v, limbs).unwrap();
        Task {
            geometry: BandGeometry::fixed_point(fp(-2.0), fp(0.5), fp(1.0), fp(0.25)).unwrap(),
            ..standard_task(first_row, rows)
        }
    }

    #[test]
    fn band_has_task_shape() {
        let rows = render_band(&job(PrecisionMode::Standard), &standard_task(0, 3)).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.len() == 8));
    }

    #[test]
    fn rows_are_placed_by_absolute_row() {
        // Row 4 of the frame is y = 0: column 4 is c = 0, inside the set.
        let rows = render_band(&job(PrecisionMode::Standard), &standard_task(4, 1)).unwrap();
        assert_eq!(rows[0][4], NOT_ESCAPED);
        assert_eq!(rows[0][0], iterate(-2.0, 0.0, 64));
    }

    #[test]
    fn split_bands_match_one_band() {
        let whole = render_band(&job(PrecisionMode::Standard), &standard_task(0, 8)).unwrap();
        let top = render_band(&job(PrecisionMode::Standard), &standard_task(0, 5)).unwrap();
        let bottom = render_band(&job(PrecisionMode::Standard), &standard_task(5, 3)).unwrap();
        let joined: Vec<_> = top.into_iter().chain(bottom).collect();
        assert_eq!(joined, whole);
    }

    #[test]
    fn fixed_point_band_matches_standard_band() {
        let standard = render_band(&job(PrecisionMode::Standard), &standard_task(2, 4)).unwrap();
        let fixed = render_band(
            &job(PrecisionMode::FixedPoint { limbs: 4 }),
            &fixed_task(2, 4, 4),
        )
        .unwrap();
        assert_eq!(fixed, standard);
    }

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    #[test]
    fn parallel_band_matches_sequential_band() {
        let pool = pool(3);
        let standard = job(PrecisionMode::Standard);
        let fixed = job(PrecisionMode::FixedPoint { limbs: 5 });
        for (first_row, rows) in [(0, 8), (3, 5), (7, 1)] {
            let task = standard_task(first_row, rows);
            assert_eq!(
                render_band_parallel(&standard, &task, &pool).unwrap(),
                render_band(&standard, &task).unwrap()
            );
            let task = fixed_task(first_row, rows, 5);
            assert_eq!(
                render_band_parallel(&fixed, &task, &pool).unwrap(),
                render_band(&fixed, &task).unwrap()
            );
        }
    }

    #[test]
    fn parallel_band_checks_the_task() {
        let task = fixed_task(0, 1, 4);
        let result = render_band_parallel(&job(PrecisionMode::Standard), &task, &pool(2));
        assert!(matches!(result, Err(RenderError::Geometry(_))));
    }

    #[test]
    fn precision_mismatch_is_rejected() {
        let result = render_band(&job(PrecisionMode::Standard), &fixed_task(0, 1, 4));
        assert!(matches!(result, Err(RenderError::Geometry(_))));
    }

    #[test]
    fn foreign_job_is_rejected() {
        let task = Task {
            job_number: JobNumber(2),
            ..standard_task(0, 1)
        };
        assert_eq!(
            render_band(&job(PrecisionMode::Standard), &task),
            Err(RenderError::JobMismatch {
                setup: JobNumber(1),
                task: JobNumber(2),
            })
        );
    }

    #[test]
    fn row_from_limbs_matches_band() {
        let fp = |v: f64| FixedPoint::from_f64(v, 4).unwrap();
        let mut out = vec![0; 8];
        fixed_point_row_from_limbs(
            fp(-2.0).limbs(),
            fp(0.5).limbs(),
            fp(0.0).limbs(),
            64,
            &mut out,
        )
        .unwrap();
        let band = render_band(&job(PrecisionMode::Standard), &standard_task(4, 1)).unwrap();
        assert_eq!(out, band[0]);
    }

    #[test]
    fn row_from_bad_limbs_is_an_error() {
        let mut out = vec![0; 2];
        assert!(fixed_point_row_from_limbs(&[0x1_0000], &[0], &[0], 10, &mut out).is_err());
    }

    #[test]
    fn render_task_tags_worker() {
        let setup = WorkerSetup {
            job: job(PrecisionMode::Standard),
            worker_number: 3,
        };
        let result = render_task(&setup, &standard_task(0, 2)).unwrap();
        assert_eq!(result.worker_number, 3);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.task_id, 0);
    }
}
