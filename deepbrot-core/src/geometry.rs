//! Coordinate frame of a render region.
//!
//! Column `c` of absolute row `r` maps to `x = x_origin + c·dx` and
//! `y = y_max - r·dy`: rows run downward from the top edge of the region.
//! Every Task cut from a region carries the same frame and only differs in
//! its first row.

use crate::fixed_point::{FixedPoint, FixedPointError};
use crate::job::PrecisionMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("geometry is {found:?} but the job expects {expected:?}")]
    PrecisionMismatch {
        expected: PrecisionMode,
        found: PrecisionMode,
    },

    #[error("fixed-point coordinates disagree on limb count: {0:?}")]
    InconsistentLimbs([usize; 4]),

    #[error("coordinate {0} is not a finite number")]
    NonFinite(String),

    #[error("invalid coordinate seed: {0}")]
    Seed(#[from] FixedPointError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BandGeometry {
    Standard {
        x_origin: f64,
        dx: f64,
        y_max: f64,
        dy: f64,
    },
    FixedPoint {
        x_origin: FixedPoint,
        dx: FixedPoint,
        y_max: FixedPoint,
        dy: FixedPoint,
    },
}

impl BandGeometry {
    pub fn standard(x_origin: f64, dx: f64, y_max: f64, dy: f64) -> Result<Self, GeometryError> {
        for value in [x_origin, dx, y_max, dy] {
            if !value.is_finite() {
                return Err(GeometryError::NonFinite(value.to_string()));
            }
        }
        Ok(BandGeometry::Standard {
            x_origin,
            dx,
            y_max,
            dy,
        })
    }

    /// Fixed-point frame. All four values must share one limb count.
    pub fn fixed_point(
        x_origin: FixedPoint,
        dx: FixedPoint,
        y_max: FixedPoint,
        dy: FixedPoint,
    ) -> Result<Self, GeometryError> {
        let counts = [
            x_origin.limb_count(),
            dx.limb_count(),
            y_max.limb_count(),
            dy.limb_count(),
        ];
        if counts.iter().any(|&count| count != counts[0]) {
            return Err(GeometryError::InconsistentLimbs(counts));
        }
        Ok(BandGeometry::FixedPoint {
            x_origin,
            dx,
            y_max,
            dy,
        })
    }

    /// Frame of a `width`×`height` region centred on (`center_x`, `center_y`)
    /// with square pixels of `pixel_size`. Seeds are decimal strings so that
    /// deep-zoom centres keep digits `f64` would drop.
    pub fn from_center(
        center_x: &str,
        center_y: &str,
        pixel_size: &str,
        width: u32,
        height: u32,
        precision: PrecisionMode,
    ) -> Result<Self, GeometryError> {
        match precision {
            PrecisionMode::Standard => {
                let cx = parse_f64(center_x)?;
                let cy = parse_f64(center_y)?;
                let pixel = parse_f64(pixel_size)?;
                Self::standard(
                    cx - f64::from(width / 2) * pixel,
                    pixel,
                    cy + f64::from(height / 2) * pixel,
                    pixel,
                )
            }
            PrecisionMode::FixedPoint { limbs } => {
                let pixel = FixedPoint::from_decimal_str(pixel_size, limbs)?;
                let mut left_step = pixel.clone();
                left_step.negate();

                let mut x_origin = FixedPoint::from_decimal_str(center_x, limbs)?;
                x_origin.add_multiple(&left_step, width / 2);
                let mut y_max = FixedPoint::from_decimal_str(center_y, limbs)?;
                y_max.add_multiple(&pixel, height / 2);

                Self::fixed_point(x_origin, pixel.clone(), y_max, pixel)
            }
        }
    }

    pub fn precision(&self) -> PrecisionMode {
        match self {
            BandGeometry::Standard { .. } => PrecisionMode::Standard,
            BandGeometry::FixedPoint { x_origin, .. } => PrecisionMode::FixedPoint {
                limbs: x_origin.limb_count(),
            },
        }
    }

    /// Reject a frame that does not match the job's precision.
    pub fn check_precision(&self, expected: PrecisionMode) -> Result<(), GeometryError> {
        let found = self.precision();
        if found != expected {
            return Err(GeometryError::PrecisionMismatch { expected, found });
        }
        Ok(())
    }
}

fn parse_f64(text: &str) -> Result<f64, GeometryError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| GeometryError::NonFinite(text.to_string()))?;
    if !value.is_finite() {
        return Err(GeometryError::NonFinite(text.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_from_center_places_top_left() {
        let geometry =
            BandGeometry::from_center("-0.5", "0", "0.25", 8, 4, PrecisionMode::Standard).unwrap();
        assert_eq!(
            geometry,
            BandGeometry::Standard {
                x_origin: -1.5,
                dx: 0.25,
                y_max: 0.5,
                dy: 0.25,
            }
        );
    }

    #[test]
    fn fixed_point_from_center_matches_standard() {
        let geometry = BandGeometry::from_center(
            "-0.5",
            "0",
            "0.25",
            8,
            4,
            PrecisionMode::FixedPoint { limbs: 4 },
        )
        .unwrap();
        match geometry {
            BandGeometry::FixedPoint {
                x_origin,
                dx,
                y_max,
                dy,
            } => {
                assert_eq!(x_origin.to_f64(), -1.5);
                assert_eq!(dx.to_f64(), 0.25);
                assert_eq!(y_max.to_f64(), 0.5);
                assert_eq!(dy.to_f64(), 0.25);
            }
            other => panic!("expected fixed-point geometry, got {other:?}"),
        }
    }

    #[test]
    fn precision_reflects_limb_count() {
        let geometry = BandGeometry::from_center(
            "0",
            "0",
            "0.001",
            4,
            4,
            PrecisionMode::FixedPoint { limbs: 5 },
        )
        .unwrap();
        assert_eq!(geometry.precision(), PrecisionMode::FixedPoint { limbs: 5 });
        assert!(geometry
            .check_precision(PrecisionMode::FixedPoint { limbs: 5 })
            .is_ok());
        assert!(matches!(
            geometry.check_precision(PrecisionMode::Standard),
            Err(GeometryError::PrecisionMismatch { .. })
        ));
    }

    #[test]
    fn mixed_limb_counts_are_rejected() {
        let result = BandGeometry::fixed_point(
            FixedPoint::zero(3),
            FixedPoint::zero(3),
            FixedPoint::zero(4),
            FixedPoint::zero(3),
        );
        assert_eq!(result, Err(GeometryError::InconsistentLimbs([3, 3, 4, 3])));
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        assert!(BandGeometry::standard(f64::NAN, 1.0, 0.0, 1.0).is_err());
        assert!(
            BandGeometry::from_center("abc", "0", "1", 2, 2, PrecisionMode::Standard).is_err()
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let geometry = BandGeometry::standard(-2.0, 0.5, 1.0, 0.5).unwrap();
        let json = serde_json::to_string(&geometry).unwrap();
        assert!(json.contains(r#""kind":"standard""#));
        let parsed: BandGeometry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, geometry);
    }
}
