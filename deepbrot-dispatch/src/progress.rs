/// Progress of the current job, counted in bands.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderProgress {
    /// Bands whose rows are in the grid, failed ones included.
    pub completed_bands: u32,
    /// Bands filled with the failure sentinel.
    pub failed_bands: u32,
    pub total_bands: u32,
    pub elapsed_ms: f64,
    pub is_complete: bool,
}

impl RenderProgress {
    pub fn new(total_bands: u32) -> Self {
        Self {
            completed_bands: 0,
            failed_bands: 0,
            total_bands,
            elapsed_ms: 0.0,
            is_complete: false,
        }
    }

    /// Completion percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f32 {
        if self.total_bands == 0 {
            0.0
        } else {
            (self.completed_bands as f32 / self.total_bands as f32) * 100.0
        }
    }

    pub fn remaining_bands(&self) -> u32 {
        self.total_bands.saturating_sub(self.completed_bands)
    }
}
