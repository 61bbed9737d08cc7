//! Escape kernel configuration.
//!
//! Constants shared by both kernels and by everything that interprets their
//! output.

/// Parameters of the escape-time iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelConfig {
    /// Squared escape radius. Greater than 4 so escaping orbits are caught
    /// one step earlier than strictly necessary, never later.
    pub escape_radius_sq: f64,
    /// Bits of limb 0 of `|z|²` that must all be clear for a fixed-point
    /// orbit to count as bounded. `0xFFF8` leaves integer parts 0..=7, which
    /// is exactly `|z|² < escape_radius_sq` while the sum cannot wrap.
    pub escape_limb_mask: u32,
    /// Integer parts a component of `z` may have while `|z|² < 8` is still
    /// possible. A component with `floor` outside this range has a square of
    /// at least 9.
    pub bounded_component: (i16, i16),
    /// Largest iteration budget; counts must fit an `i32`.
    pub max_iterations_limit: u32,
}

/// Mandelbrot kernel configuration.
pub static MANDELBROT_KERNEL: KernelConfig = KernelConfig {
    escape_radius_sq: 8.0,
    escape_limb_mask: 0xFFF8,
    bounded_component: (-3, 2),
    max_iterations_limit: i32::MAX as u32,
};

impl KernelConfig {
    /// Clamp a requested budget to what counts can express.
    pub fn clamp_iterations(&self, max_iterations: u32) -> u32 {
        max_iterations.min(self.max_iterations_limit)
    }

    /// Whether a component with this integer part alone puts `|z|²` past
    /// the escape radius.
    pub fn component_escaped(&self, integer_part: i16) -> bool {
        let (low, high) = self.bounded_component;
        !(low..=high).contains(&integer_part)
    }
}
