//! Precision selection for a render.
//!
//! Picks `f64` while it can still tell adjacent pixels apart, and otherwise a
//! fixed-point limb count large enough for the pixel step plus guard bits for
//! error accumulated over many iterations.

use crate::fixed_point::LIMB_BITS;
use crate::PrecisionMode;

/// log2 of the smallest pixel step `f64` resolves near |c| ≈ 2, with margin.
const STANDARD_MIN_PIXEL_LOG2: f64 = -42.0;

/// Extra fraction bits beyond the pixel step.
const GUARD_BITS: u32 = 24;

/// Precision to use for square pixels of `pixel_size`.
pub fn recommended_precision(pixel_size: f64) -> PrecisionMode {
    if !pixel_size.is_finite() || pixel_size <= 0.0 {
        return PrecisionMode::Standard;
    }
    let log2_pixel = pixel_size.log2();
    if log2_pixel >= STANDARD_MIN_PIXEL_LOG2 {
        return PrecisionMode::Standard;
    }
    let pixel_bits = (-log2_pixel).ceil() as u32;
    PrecisionMode::FixedPoint {
        limbs: limbs_for_fraction_bits(pixel_bits + GUARD_BITS),
    }
}

/// Limb count holding at least `bits` fraction bits (plus the integer limb).
pub fn limbs_for_fraction_bits(bits: u32) -> usize {
    1 + bits.div_ceil(LIMB_BITS) as usize
}
