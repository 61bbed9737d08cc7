//! Escape-time iteration of `z ← z² + c`, in `f64` and in fixed point.
//!
//! Both kernels start from `z = 0`, test `|z|² ≥ 8` before every step and
//! return the number of completed steps when the test fires. A point that
//! survives `max_iterations` steps reports [`NOT_ESCAPED`].

use deepbrot_core::{FixedPoint, MulScratch, MANDELBROT_KERNEL, NOT_ESCAPED};

/// A kernel classifying one point of the complex plane.
pub trait EscapeKernel {
    type Coordinate;

    fn iterate(&mut self, x: &Self::Coordinate, y: &Self::Coordinate, max_iterations: u32) -> i32;
}

/// `f64` kernel, for zoom levels where doubles still resolve a pixel.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardKernel;

impl EscapeKernel for StandardKernel {
    type Coordinate = f64;

    fn iterate(&mut self, x: &f64, y: &f64, max_iterations: u32) -> i32 {
        iterate(*x, *y, max_iterations)
    }
}

/// Escape count of `c = x + iy` in `f64`.
pub fn iterate(x: f64, y: f64, max_iterations: u32) -> i32 {
    let max_iterations = MANDELBROT_KERNEL.clamp_iterations(max_iterations);
    let radius_sq = MANDELBROT_KERNEL.escape_radius_sq;
    let mut zx = 0.0_f64;
    let mut zy = 0.0_f64;

    for count in 0..max_iterations {
        let zx_sq = zx * zx;
        let zy_sq = zy * zy;
        if zx_sq + zy_sq >= radius_sq {
            return count as i32;
        }

        // z = z^2 + c
        let new_zx = zx_sq - zy_sq + x;
        zy = 2.0 * zx * zy + y;
        zx = new_zx;
    }

    NOT_ESCAPED
}

/// Escape count of `c = x + iy` in fixed point, at the precision of `x`.
pub fn iterate_hp(x: &FixedPoint, y: &FixedPoint, max_iterations: u32) -> i32 {
    FixedPointKernel::new(x.limb_count()).iterate(x, y, max_iterations)
}

/// Fixed-point kernel owning its working registers, so a whole row reuses
/// one set of allocations.
///
/// The escape test has two parts, both reading only limb 0:
///
/// 1. Before squaring, a component of `z` whose integer part lies outside
///    `-3..=2` has a square of at least 9, so the orbit has escaped. This
///    also catches components that wrapped past ±32768 while adding `c`.
/// 2. Otherwise both components are below 3 in magnitude, `zr² + zi²` is
///    below 18 and cannot wrap, and the orbit has escaped iff any bit of
///    `limb0 & 0xFFF8` is set in the sum, i.e. its integer part is ≥ 8.
///
/// Together they give exactly `|z|² ≥ 8` for every representable `c`.
#[derive(Clone, Debug)]
pub struct FixedPointKernel {
    zr: FixedPoint,
    zi: FixedPoint,
    zr_sq: FixedPoint,
    zi_sq: FixedPoint,
    magnitude: FixedPoint,
    scratch: MulScratch,
}

impl FixedPointKernel {
    pub fn new(limbs: usize) -> Self {
        Self {
            zr: FixedPoint::zero(limbs),
            zi: FixedPoint::zero(limbs),
            zr_sq: FixedPoint::zero(limbs),
            zi_sq: FixedPoint::zero(limbs),
            magnitude: FixedPoint::zero(limbs),
            scratch: MulScratch::new(limbs),
        }
    }

    fn component_escaped(&self) -> bool {
        MANDELBROT_KERNEL.component_escaped(self.zr.integer_part())
            || MANDELBROT_KERNEL.component_escaped(self.zi.integer_part())
    }

    fn magnitude_escaped(&self) -> bool {
        self.magnitude.top_limb() & MANDELBROT_KERNEL.escape_limb_mask != 0
    }
}

impl EscapeKernel for FixedPointKernel {
    type Coordinate = FixedPoint;

    fn iterate(&mut self, x: &FixedPoint, y: &FixedPoint, max_iterations: u32) -> i32 {
        let max_iterations = MANDELBROT_KERNEL.clamp_iterations(max_iterations);
        let limbs = x.limb_count();
        self.zr.set_zero(limbs);
        self.zi.set_zero(limbs);

        for count in 0..max_iterations {
            if self.component_escaped() {
                return count as i32;
            }
            self.zr_sq.assign(&self.zr);
            self.zr_sq.square_with(&mut self.scratch);
            self.zi_sq.assign(&self.zi);
            self.zi_sq.square_with(&mut self.scratch);

            self.magnitude.assign(&self.zr_sq);
            self.magnitude.add(&self.zi_sq);
            if self.magnitude_escaped() {
                return count as i32;
            }

            // zi = 2·zr·zi + y
            self.zi.multiply_with(&self.zr, &mut self.scratch);
            self.zi.double();
            self.zi.add(y);

            // zr = zr² - zi² + x
            self.zr.assign(&self.zi_sq);
            self.zr.negate();
            self.zr.add(&self.zr_sq);
            self.zr.add(x);
        }

        NOT_ESCAPED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hp(value: f64) -> FixedPoint {
        FixedPoint::from_f64(value, 5).unwrap()
    }

    #[test]
    fn origin_is_in_set() {
        assert_eq!(iterate(0.0, 0.0, 100), NOT_ESCAPED);
        assert_eq!(iterate_hp(&hp(0.0), &hp(0.0), 100), NOT_ESCAPED);
    }

    #[test]
    fn main_cardioid_point_in_set() {
        assert_eq!(iterate(-0.5, 0.0, 500), NOT_ESCAPED);
        assert_eq!(iterate_hp(&hp(-0.5), &hp(0.0), 500), NOT_ESCAPED);
    }

    #[test]
    fn far_point_escapes_after_one_step() {
        // z1 = 2 + 2i, |z1|² = 8.
        assert_eq!(iterate(2.0, 2.0, 50), 1);
        assert_eq!(iterate_hp(&hp(2.0), &hp(2.0), 50), 1);
    }

    #[test]
    fn zero_budget_returns_sentinel() {
        assert_eq!(iterate(2.0, 2.0, 0), NOT_ESCAPED);
        assert_eq!(iterate_hp(&hp(2.0), &hp(2.0), 0), NOT_ESCAPED);
    }

    #[test]
    fn escape_at_last_allowed_step_is_counted() {
        // c = 2: z = 0, 2, 6; |z|² reaches 36 before step 2.
        assert_eq!(iterate(2.0, 0.0, 3), 2);
        assert_eq!(iterate(2.0, 0.0, 2), NOT_ESCAPED);
        assert_eq!(iterate_hp(&hp(2.0), &hp(0.0), 3), 2);
        assert_eq!(iterate_hp(&hp(2.0), &hp(0.0), 2), NOT_ESCAPED);
    }

    #[test]
    fn kernels_agree_near_the_neck() {
        let standard = iterate(-0.75, 0.1, 100);
        let fixed = iterate_hp(&hp(-0.75), &hp(0.1), 100);
        assert_eq!(standard, fixed);
        assert!(standard > 10, "slow escape near the neck, got {standard}");
    }

    #[test]
    fn kernels_agree_on_negative_coordinates() {
        for (x, y) in [(-2.5, 0.0), (-1.0, 0.0), (0.5, -0.5), (-0.1, -0.1)] {
            assert_eq!(
                iterate(x, y, 200),
                iterate_hp(&hp(x), &hp(y), 200),
                "({x}, {y})"
            );
        }
    }

    #[test]
    fn large_coordinates_escape_after_one_step() {
        for x in [256.0, -256.0, 256.01, 1000.5, -32767.0] {
            let fixed = FixedPoint::from_f64(x, 4).unwrap();
            let zero = FixedPoint::zero(4);
            assert_eq!(iterate(x, 0.0, 50), 1, "standard {x}");
            assert_eq!(iterate_hp(&fixed, &zero, 50), 1, "fixed point {x}");
            assert_eq!(iterate_hp(&zero, &fixed, 50), 1, "fixed point {x}i");
        }
    }

    #[test]
    fn component_test_agrees_at_its_edges() {
        // |c| just below and above 3 along each axis, and a diagonal point
        // whose components pass the component test but whose |c|² ≥ 8.
        for (x, y) in [(2.875, 0.0), (3.0, 0.0), (-3.0, 0.0), (0.0, -2.9375), (2.0, 2.5)] {
            assert_eq!(
                iterate(x, y, 50),
                iterate_hp(&hp(x), &hp(y), 50),
                "({x}, {y})"
            );
        }
    }

    #[test]
    fn kernel_reuses_registers_across_points() {
        let mut kernel = FixedPointKernel::new(5);
        let first = kernel.iterate(&hp(2.0), &hp(2.0), 50);
        let second = kernel.iterate(&hp(0.0), &hp(0.0), 50);
        assert_eq!(first, 1);
        assert_eq!(second, NOT_ESCAPED);
    }

    #[test]
    fn kernels_implement_escape_trait() {
        let mut standard = StandardKernel;
        assert_eq!(standard.iterate(&2.0, &2.0, 10), 1);
        let mut fixed = FixedPointKernel::new(3);
        assert_eq!(
            fixed.iterate(
                &FixedPoint::from_f64(2.0, 3).unwrap(),
                &FixedPoint::from_f64(2.0, 3).unwrap(),
                10
            ),
            1
        );
    }
}
