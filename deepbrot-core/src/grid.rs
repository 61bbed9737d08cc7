use serde::{Deserialize, Serialize};

/// Row-major iteration counts for a whole render region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationGrid {
    pub width: u32,
    pub height: u32,
    pub counts: Vec<i32>,
}

impl IterationGrid {
    /// A grid with every cell set to `fill`.
    pub fn filled(width: u32, height: u32, fill: i32) -> Self {
        Self {
            width,
            height,
            counts: vec![fill; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<i32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.counts
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn row(&self, y: u32) -> Option<&[i32]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.width as usize;
        self.counts.get(start..start + self.width as usize)
    }

    /// Copy `rows` into the grid starting at `first_row`. Rows falling
    /// outside the grid are ignored, and each row is clipped to the width.
    /// Returns the number of rows written.
    pub fn write_rows(&mut self, first_row: u32, rows: &[Vec<i32>]) -> u32 {
        let width = self.width as usize;
        let mut written = 0;
        for (offset, row) in rows.iter().enumerate() {
            let y = first_row as usize + offset;
            if y >= self.height as usize {
                break;
            }
            let columns = row.len().min(width);
            let start = y * width;
            self.counts[start..start + columns].copy_from_slice(&row[..columns]);
            written += 1;
        }
        written
    }

    /// Set `row_count` rows starting at `first_row` to `value`.
    pub fn fill_rows(&mut self, first_row: u32, row_count: u32, value: i32) {
        let width = self.width as usize;
        let start = (first_row as usize * width).min(self.counts.len());
        let end = ((first_row as usize + row_count as usize) * width).min(self.counts.len());
        self.counts[start..end].fill(value);
    }
}
