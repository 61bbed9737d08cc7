//! Fixed-point arbitrary-precision numbers built from 16-bit limbs.
//!
//! A value with N limbs is a two's-complement integer of 16·N bits with the
//! radix point after the first limb. Limb 0 carries the sign and the integer
//! part, limbs 1..N carry the fraction, most significant first. Every limb is
//! stored in a `u32` so carries can be detected before masking, and products
//! are accumulated in `u64`.
//!
//! Arithmetic wraps modulo 2^16 in the integer part. The escape test relies on
//! that: a magnitude that overflows still produces a recognisable top limb
//! instead of a panic.

use dashu::integer::IBig;
use dashu_base::Approximation;
use dashu_float::DBig;
use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Mul, Neg};
use thiserror::Error;

/// Significant bits held by each limb.
pub const LIMB_BITS: u32 = 16;

/// Mask selecting the significant bits of a limb.
pub const LIMB_MASK: u32 = 0xFFFF;

/// Sign bit, found in limb 0.
pub const SIGN_BIT: u32 = 0x8000;

/// Scale of one limb step.
const LIMB_RADIX: f64 = 65536.0;

/// Largest magnitude (exclusive) a seed may have.
const MAX_SEED_MAGNITUDE: f64 = 32768.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FixedPointError {
    #[error("a fixed-point value needs at least one limb")]
    NoLimbs,

    #[error("limb {index} holds {value:#x}, which does not fit in 16 bits")]
    LimbOutOfRange { index: usize, value: u32 },

    #[error("cannot seed a fixed-point value from non-finite {0}")]
    NotFinite(f64),

    #[error("{0} is outside the representable range (-32768, 32768)")]
    OutOfRange(String),

    #[error("failed to parse decimal seed: {0}")]
    Parse(String),
}

/// Signed fixed-point number with a fixed limb count.
///
/// All values taking part in one computation must share the same limb count.
/// When two operands differ, the right-hand side is read as if zero-extended
/// (or truncated) to the left-hand side's precision, which is exact for the
/// two's-complement fraction layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct FixedPoint {
    limbs: Vec<u32>,
}

/// Reusable buffers for [`FixedPoint::multiply_with`].
///
/// The escape kernel multiplies millions of times per band; keeping the
/// magnitude copies and the accumulator here avoids an allocation per call.
#[derive(Clone, Debug, Default)]
pub struct MulScratch {
    lhs: Vec<u32>,
    rhs: Vec<u32>,
    acc: Vec<u64>,
}

impl MulScratch {
    pub fn new(limbs: usize) -> Self {
        Self {
            lhs: Vec::with_capacity(limbs),
            rhs: Vec::with_capacity(limbs),
            acc: Vec::with_capacity(limbs),
        }
    }
}

impl FixedPoint {
    /// Zero with the given limb count (at least one limb).
    pub fn zero(limbs: usize) -> Self {
        Self {
            limbs: vec![0; limbs.max(1)],
        }
    }

    /// Build from raw limbs, most significant first.
    pub fn from_limbs(limbs: Vec<u32>) -> Result<Self, FixedPointError> {
        if limbs.is_empty() {
            return Err(FixedPointError::NoLimbs);
        }
        if let Some((index, &value)) = limbs
            .iter()
            .enumerate()
            .find(|(_, &limb)| limb > LIMB_MASK)
        {
            return Err(FixedPointError::LimbOutOfRange { index, value });
        }
        Ok(Self { limbs })
    }

    /// Seed from an `f64`, placing every mantissa bit that fits exactly.
    ///
    /// Bits below the last limb are truncated toward zero.
    pub fn from_f64(value: f64, limbs: usize) -> Result<Self, FixedPointError> {
        if !value.is_finite() {
            return Err(FixedPointError::NotFinite(value));
        }
        if value.abs() >= MAX_SEED_MAGNITUDE {
            return Err(FixedPointError::OutOfRange(value.to_string()));
        }

        let mut result = Self::zero(limbs);
        if value == 0.0 {
            return Ok(result);
        }

        let bits = value.abs().to_bits();
        let biased_exponent = ((bits >> 52) & 0x7FF) as i64;
        let fraction = bits & ((1u64 << 52) - 1);
        // |value| = mantissa * 2^exponent
        let (mantissa, exponent) = if biased_exponent == 0 {
            (fraction, -1074)
        } else {
            (fraction | (1u64 << 52), biased_exponent - 1075)
        };

        let count = result.limbs.len();
        let fraction_bits = (count as i64 - 1) * i64::from(LIMB_BITS);
        for bit in 0u32..53 {
            if (mantissa >> bit) & 1 == 0 {
                continue;
            }
            // Bit position counted from the least significant bit of the last limb.
            let position = exponent + i64::from(bit) + fraction_bits;
            if position < 0 {
                continue;
            }
            let position = position as usize;
            let index = count - 1 - position / LIMB_BITS as usize;
            result.limbs[index] |= 1 << (position % LIMB_BITS as usize);
        }

        if value < 0.0 {
            result.negate();
        }
        Ok(result)
    }

    /// Seed from a decimal string such as `"-0.7436438870371587"`.
    ///
    /// Digits beyond what `f64` can carry survive the conversion, which is
    /// the point of seeding deep-zoom coordinates from text.
    pub fn from_decimal_str(text: &str, limbs: usize) -> Result<Self, FixedPointError> {
        let limbs = limbs.max(1);
        let decimal = text
            .trim()
            .parse::<DBig>()
            .map_err(|e| FixedPointError::Parse(e.to_string()))?;

        let precision = (limbs + 1) * LIMB_BITS as usize;
        let binary = match decimal.with_base_and_precision::<2>(precision) {
            Approximation::Exact(v) => v,
            Approximation::Inexact(v, _) => v,
        };

        let repr = binary.repr();
        let negative = *repr.significand() < IBig::ZERO;
        let mut magnitude = if negative {
            -repr.significand().clone()
        } else {
            repr.significand().clone()
        };

        let shift = repr.exponent() + ((limbs - 1) * LIMB_BITS as usize) as isize;
        if shift >= 0 {
            magnitude = magnitude << shift as usize;
        } else {
            magnitude = magnitude >> shift.unsigned_abs();
        }

        let limit = IBig::ONE << (limbs * LIMB_BITS as usize - 1);
        if magnitude >= limit {
            return Err(FixedPointError::OutOfRange(text.trim().to_string()));
        }

        let mut result = Self::zero(limbs);
        for limb in result.limbs.iter_mut().rev() {
            let high = magnitude.clone() >> LIMB_BITS as usize;
            let low = magnitude - (high.clone() << LIMB_BITS as usize);
            *limb = u32::try_from(low).map_err(|e| FixedPointError::Parse(e.to_string()))?;
            magnitude = high;
        }

        if negative {
            result.negate();
        }
        Ok(result)
    }

    /// Decode to the nearest `f64`. Precision beyond 53 bits is lost.
    pub fn to_f64(&self) -> f64 {
        if self.is_negative() {
            let mut magnitude = self.clone();
            magnitude.negate();
            return -magnitude.magnitude_to_f64();
        }
        self.magnitude_to_f64()
    }

    fn magnitude_to_f64(&self) -> f64 {
        let mut scale = 1.0;
        let mut total = 0.0;
        for &limb in &self.limbs {
            total += f64::from(limb) * scale;
            scale /= LIMB_RADIX;
        }
        total
    }

    /// Same value at a different precision: extra limbs are zero, dropped
    /// limbs are truncated.
    pub fn with_limbs(&self, limbs: usize) -> Self {
        let mut resized = self.limbs.clone();
        resized.resize(limbs.max(1), 0);
        Self { limbs: resized }
    }

    pub fn limbs(&self) -> &[u32] {
        &self.limbs
    }

    pub fn limb_count(&self) -> usize {
        self.limbs.len()
    }

    /// Limb 0: sign and integer part.
    pub fn top_limb(&self) -> u32 {
        self.limbs[0]
    }

    /// Signed integer part: limb 0 read as an `i16`, i.e. `floor(self)`.
    pub fn integer_part(&self) -> i16 {
        self.limbs[0] as u16 as i16
    }

    pub fn is_negative(&self) -> bool {
        self.limbs[0] & SIGN_BIT != 0
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&limb| limb == 0)
    }

    fn limb_or_zero(&self, index: usize) -> u32 {
        self.limbs.get(index).copied().unwrap_or(0)
    }

    /// `self += rhs`, wrapping past limb 0.
    pub fn add(&mut self, rhs: &Self) {
        let mut carry = 0;
        for (index, limb) in self.limbs.iter_mut().enumerate().rev() {
            let sum = *limb + rhs.limb_or_zero(index) + carry;
            *limb = sum & LIMB_MASK;
            carry = sum >> LIMB_BITS;
        }
    }

    /// `self = -self` (two's complement).
    pub fn negate(&mut self) {
        let mut carry = 1;
        for limb in self.limbs.iter_mut().rev() {
            let value = (!*limb & LIMB_MASK) + carry;
            *limb = value & LIMB_MASK;
            carry = value >> LIMB_BITS;
        }
    }

    /// `self = self * rhs`, truncated to this value's limb count.
    pub fn multiply(&mut self, rhs: &Self) {
        let mut scratch = MulScratch::new(self.limbs.len());
        self.multiply_with(rhs, &mut scratch);
    }

    /// [`multiply`](Self::multiply) using caller-owned buffers.
    ///
    /// Both operands are reduced to magnitudes, multiplied with schoolbook
    /// long multiplication, and the sign is restored from the XOR of the
    /// operand signs. Products landing below the last limb are dropped except
    /// for the carry they contribute from the first discarded position.
    pub fn multiply_with(&mut self, rhs: &Self, scratch: &mut MulScratch) {
        let n = self.limbs.len();
        load_magnitude(&mut scratch.lhs, self, n);
        load_magnitude(&mut scratch.rhs, rhs, n);
        let negative = self.is_negative() != rhs.is_negative();
        self.store_product(negative, scratch);
    }

    /// `self = self²`. The operand is copied into `scratch` first, so the
    /// value is never multiplied in place with itself.
    pub fn square_with(&mut self, scratch: &mut MulScratch) {
        let n = self.limbs.len();
        load_magnitude(&mut scratch.lhs, self, n);
        scratch.rhs.clone_from(&scratch.lhs);
        self.store_product(false, scratch);
    }

    fn store_product(&mut self, negative: bool, scratch: &mut MulScratch) {
        let n = self.limbs.len();
        scratch.acc.clear();
        scratch.acc.resize(n, 0);
        let mut spill: u64 = 0;
        for (i, &a) in scratch.lhs.iter().enumerate() {
            if a == 0 {
                continue;
            }
            for (j, &b) in scratch.rhs.iter().enumerate().take(n + 1 - i) {
                let product = u64::from(a) * u64::from(b);
                if i + j < n {
                    scratch.acc[i + j] += product;
                } else {
                    spill += product;
                }
            }
        }
        scratch.acc[n - 1] += spill >> LIMB_BITS;

        for k in (1..n).rev() {
            let carry = scratch.acc[k] >> LIMB_BITS;
            scratch.acc[k] &= u64::from(LIMB_MASK);
            scratch.acc[k - 1] += carry;
        }
        scratch.acc[0] &= u64::from(LIMB_MASK);

        for (limb, &value) in self.limbs.iter_mut().zip(&scratch.acc) {
            *limb = value as u32;
        }
        if negative {
            self.negate();
        }
    }

    /// `self = 2·self`, wrapping like [`add`](Self::add).
    pub fn double(&mut self) {
        let mut carry = 0;
        for limb in self.limbs.iter_mut().rev() {
            let value = (*limb << 1) | carry;
            *limb = value & LIMB_MASK;
            carry = value >> LIMB_BITS;
        }
    }

    /// Reset to zero at `limbs` precision, reusing this value's storage.
    pub fn set_zero(&mut self, limbs: usize) {
        self.limbs.clear();
        self.limbs.resize(limbs.max(1), 0);
    }

    /// Overwrite with `other`, reusing this value's storage.
    pub fn assign(&mut self, other: &Self) {
        self.limbs.clear();
        self.limbs.extend_from_slice(&other.limbs);
    }

    /// `self += count * step`, by double-and-add.
    ///
    /// Exactly equal to `count` repeated additions because addition wraps.
    pub fn add_multiple(&mut self, step: &Self, count: u32) {
        let mut addend = step.with_limbs(self.limbs.len());
        let mut remaining = count;
        while remaining > 0 {
            if remaining & 1 == 1 {
                self.add(&addend);
            }
            remaining >>= 1;
            if remaining > 0 {
                addend.double();
            }
        }
    }

    /// `count` values `base, base + step, base + 2·step, ...`, each one the
    /// previous plus `step`.
    pub fn ladder(base: &Self, step: &Self, count: usize) -> Vec<Self> {
        let mut values = Vec::with_capacity(count);
        let mut current = base.clone();
        for _ in 0..count {
            values.push(current.clone());
            current.add(step);
        }
        values
    }
}

/// Copy `value` into `buf` as an `n`-limb magnitude.
fn load_magnitude(buf: &mut Vec<u32>, value: &FixedPoint, n: usize) {
    buf.clear();
    buf.extend((0..n).map(|index| value.limb_or_zero(index)));
    if value.is_negative() {
        let mut carry = 1;
        for limb in buf.iter_mut().rev() {
            let sum = (!*limb & LIMB_MASK) + carry;
            *limb = sum & LIMB_MASK;
            carry = sum >> LIMB_BITS;
        }
    }
}

impl TryFrom<Vec<u32>> for FixedPoint {
    type Error = FixedPointError;

    fn try_from(limbs: Vec<u32>) -> Result<Self, Self::Error> {
        Self::from_limbs(limbs)
    }
}

impl From<FixedPoint> for Vec<u32> {
    fn from(value: FixedPoint) -> Self {
        value.limbs
    }
}

impl AddAssign<&FixedPoint> for FixedPoint {
    fn add_assign(&mut self, rhs: &FixedPoint) {
        FixedPoint::add(self, rhs);
    }
}

impl Mul for &FixedPoint {
    type Output = FixedPoint;

    fn mul(self, rhs: &FixedPoint) -> FixedPoint {
        let mut product = self.clone();
        product.multiply(rhs);
        product
    }
}

impl Neg for &FixedPoint {
    type Output = FixedPoint;

    fn neg(self) -> FixedPoint {
        let mut negated = self.clone();
        negated.negate();
        negated
    }
}
