use crate::error::DispatchError;
use deepbrot_core::{JobNumber, PrecisionMode, RenderRequest, Task};

/// Tallest band handed out, so progress keeps moving at shallow zoom.
pub const MAX_BAND_HEIGHT: u32 = 64;

/// Kernel work aimed for per Task, in `f64`-iteration equivalents.
const TARGET_BAND_WORK: u64 = 1 << 26;

/// Band height giving Tasks of roughly constant cost.
///
/// A fixed-point iteration is dominated by three `limbs²` multiplies, so it
/// is weighted by `limbs²` against an `f64` iteration.
pub fn calculate_band_height(width: u32, max_iterations: u32, precision: PrecisionMode) -> u32 {
    let iteration_cost = match precision {
        PrecisionMode::Standard => 1,
        PrecisionMode::FixedPoint { limbs } => (limbs as u64).pow(2).max(1),
    };
    let row_cost = u64::from(width.max(1))
        .saturating_mul(u64::from(max_iterations.max(1)))
        .saturating_mul(iteration_cost);
    let rows = TARGET_BAND_WORK / row_cost;
    rows.clamp(1, u64::from(MAX_BAND_HEIGHT)) as u32
}

/// Cut `request` into row bands of `band_height` rows, top to bottom.
///
/// Every row lands in exactly one Task; the last band holds the remainder.
pub fn partition(
    job_number: JobNumber,
    request: &RenderRequest,
    band_height: u32,
) -> Result<Vec<Task>, DispatchError> {
    if band_height == 0 {
        return Err(DispatchError::ZeroBandHeight);
    }
    if request.width == 0 || request.height == 0 {
        return Err(DispatchError::EmptyRegion {
            width: request.width,
            height: request.height,
        });
    }

    let tasks = (0..request.height)
        .step_by(band_height as usize)
        .map(|first_row| Task {
            job_number,
            task_id: first_row,
            columns: request.width,
            rows: band_height.min(request.height - first_row),
            geometry: request.geometry.clone(),
        })
        .collect();
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepbrot_core::BandGeometry;

    fn request(width: u32, height: u32) -> RenderRequest {
        RenderRequest {
            width,
            height,
            max_iterations: 500,
            geometry: BandGeometry::standard(-2.0, 0.01, 1.0, 0.01).unwrap(),
        }
    }

    #[test]
    fn bands_cover_rows_in_order() {
        let tasks = partition(JobNumber(4), &request(10, 25), 8).unwrap();
        let shape: Vec<_> = tasks.iter().map(|t| (t.task_id, t.rows)).collect();
        assert_eq!(shape, vec![(0, 8), (8, 8), (16, 8), (24, 1)]);
        assert!(tasks.iter().all(|t| t.job_number == JobNumber(4) && t.columns == 10));
    }

    #[test]
    fn exact_multiple_has_full_last_band() {
        let tasks = partition(JobNumber(1), &request(4, 16), 8).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].rows, 8);
    }

    #[test]
    fn band_taller_than_region_is_one_task() {
        let tasks = partition(JobNumber(1), &request(4, 5), 64).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].rows, 5);
    }

    #[test]
    fn zero_band_height_is_rejected() {
        assert_eq!(
            partition(JobNumber(1), &request(4, 4), 0),
            Err(DispatchError::ZeroBandHeight)
        );
    }

    #[test]
    fn empty_region_is_rejected() {
        assert!(matches!(
            partition(JobNumber(1), &request(0, 4), 2),
            Err(DispatchError::EmptyRegion { .. })
        ));
    }

    #[test]
    fn band_height_shrinks_with_cost() {
        let shallow = calculate_band_height(256, 100, PrecisionMode::Standard);
        let deep = calculate_band_height(256, 100_000, PrecisionMode::Standard);
        let wide_limbs = calculate_band_height(256, 1000, PrecisionMode::FixedPoint { limbs: 12 });
        let narrow_limbs = calculate_band_height(256, 1000, PrecisionMode::FixedPoint { limbs: 3 });
        assert_eq!(shallow, MAX_BAND_HEIGHT);
        assert!(deep < shallow);
        assert!(wide_limbs <= narrow_limbs);
    }

    #[test]
    fn band_height_stays_in_bounds() {
        assert_eq!(calculate_band_height(0, 0, PrecisionMode::Standard), MAX_BAND_HEIGHT);
        let deepest = PrecisionMode::FixedPoint { limbs: 64 };
        assert_eq!(calculate_band_height(u32::MAX, u32::MAX, deepest), 1);
    }
}
