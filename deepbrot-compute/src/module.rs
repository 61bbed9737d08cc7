//! Kernels living in a foreign linear memory.
//!
//! A [`ForeignModule`] exposes the two row kernels through a pointer-based
//! ABI, the same one the `deepbrot-wasm` guest exports:
//!
//! * `compute_row(xmin, dx, columns, y, max_iterations, out_ptr) -> i32`
//! * `compute_row_hp(xmin_ptr, dx_ptr, limbs, columns, y_ptr, max_iterations,
//!   out_ptr) -> i32`
//!
//! Pointers are byte offsets into the module's memory, fixed-point operands
//! are `limbs` little-endian `u32` words, and `out_ptr` receives `columns`
//! `i32` counts. A non-zero status means the kernel rejected its input.
//! [`render_task_in_module`] drives a whole Task through a module, staging
//! operands with a [`MemoryArena`] that is reset per Task.

use crate::arena::{read_le_words, write_le_words, ArenaRegion, LinearMemory, MemoryArena};
use crate::band_render::{check_task, fixed_point_row_from_limbs, row_y, standard_row};
use crate::error::{ArenaError, ModuleError};
use deepbrot_core::{BandGeometry, JobConfig, Task};

/// Status a kernel returns when it accepted its input.
pub const KERNEL_OK: i32 = 0;

/// Status a kernel returns for operands it could not decode.
pub const KERNEL_BAD_INPUT: i32 = 1;

pub trait ForeignModule: LinearMemory + Send {
    /// Where the module reserves memory for the host's arena.
    fn arena_region(&self) -> ArenaRegion;

    fn compute_row(
        &mut self,
        xmin: f64,
        dx: f64,
        columns: u32,
        y: f64,
        max_iterations: u32,
        out_ptr: u32,
    ) -> Result<(), ModuleError>;

    #[allow(clippy::too_many_arguments)]
    fn compute_row_hp(
        &mut self,
        xmin_ptr: u32,
        dx_ptr: u32,
        limbs: u32,
        columns: u32,
        y_ptr: u32,
        max_iterations: u32,
        out_ptr: u32,
    ) -> Result<(), ModuleError>;
}

/// First byte of the arena in a [`NativeModule`]; the bytes below it stay
/// unused like a guest's static data would.
pub const NATIVE_ARENA_BASE: u32 = 64;

/// A module whose memory is a plain byte buffer and whose kernels are this
/// crate's, called through the same pointer ABI as a WebAssembly guest.
pub struct NativeModule {
    memory: Vec<u8>,
    arena_words: u32,
}

impl NativeModule {
    pub fn new(arena_words: u32) -> Self {
        let size = NATIVE_ARENA_BASE as usize + arena_words as usize * 4;
        Self {
            memory: vec![0; size],
            arena_words,
        }
    }

    fn read_vec(&self, ptr: u32, len: u32) -> Result<Vec<u32>, ArenaError> {
        let mut words = vec![0; len as usize];
        read_le_words(&self.memory, ptr, &mut words)?;
        Ok(words)
    }

    fn write_counts(&mut self, out_ptr: u32, counts: &[i32]) -> Result<(), ArenaError> {
        let words: Vec<u32> = counts.iter().map(|&count| count as u32).collect();
        write_le_words(&mut self.memory, out_ptr, &words)
    }
}

impl LinearMemory for NativeModule {
    fn size_bytes(&self) -> usize {
        self.memory.len()
    }

    fn read_words(&self, byte_offset: u32, out: &mut [u32]) -> Result<(), ArenaError> {
        read_le_words(&self.memory, byte_offset, out)
    }

    fn write_words(&mut self, byte_offset: u32, words: &[u32]) -> Result<(), ArenaError> {
        write_le_words(&mut self.memory, byte_offset, words)
    }
}

impl ForeignModule for NativeModule {
    fn arena_region(&self) -> ArenaRegion {
        ArenaRegion {
            base_byte: NATIVE_ARENA_BASE,
            words: self.arena_words,
        }
    }

    fn compute_row(
        &mut self,
        xmin: f64,
        dx: f64,
        columns: u32,
        y: f64,
        max_iterations: u32,
        out_ptr: u32,
    ) -> Result<(), ModuleError> {
        let mut counts = vec![0; columns as usize];
        standard_row(xmin, dx, y, max_iterations, &mut counts);
        self.write_counts(out_ptr, &counts)?;
        Ok(())
    }

    fn compute_row_hp(
        &mut self,
        xmin_ptr: u32,
        dx_ptr: u32,
        limbs: u32,
        columns: u32,
        y_ptr: u32,
        max_iterations: u32,
        out_ptr: u32,
    ) -> Result<(), ModuleError> {
        let xmin = self.read_vec(xmin_ptr, limbs)?;
        let dx = self.read_vec(dx_ptr, limbs)?;
        let y = self.read_vec(y_ptr, limbs)?;
        let mut counts = vec![0; columns as usize];
        if fixed_point_row_from_limbs(&xmin, &dx, &y, max_iterations, &mut counts).is_err() {
            return Err(ModuleError::Rejected(KERNEL_BAD_INPUT));
        }
        self.write_counts(out_ptr, &counts)?;
        Ok(())
    }
}

/// Map a kernel status to a result.
pub fn check_status(status: i32) -> Result<(), ModuleError> {
    match status {
        KERNEL_OK => Ok(()),
        other => Err(ModuleError::Rejected(other)),
    }
}

/// Compute every row of `task` inside `module`.
///
/// The arena is reset first, so handles never outlive the Task. A band too
/// large for the arena fails with [`ArenaError::Exhausted`] before any
/// kernel runs.
pub fn render_task_in_module(
    module: &mut dyn ForeignModule,
    arena: &mut MemoryArena,
    job: &JobConfig,
    task: &Task,
) -> Result<Vec<Vec<i32>>, ModuleError> {
    check_task(job, task)?;
    arena.reset();

    let columns = task.columns;
    let mut words = vec![0u32; columns as usize];
    let mut rows = Vec::with_capacity(task.rows as usize);

    match &task.geometry {
        BandGeometry::Standard {
            x_origin,
            dx,
            y_max,
            dy,
        } => {
            let out = arena.allocate(columns)?;
            for offset in 0..task.rows {
                let y = row_y(*y_max, *dy, task.first_row() + offset);
                let out_ptr = out.byte_offset();
                module.compute_row(*x_origin, *dx, columns, y, job.max_iterations, out_ptr)?;
                arena.read(&*module, &out, &mut words)?;
                rows.push(words.iter().map(|&word| word as i32).collect());
            }
        }
        BandGeometry::FixedPoint {
            x_origin,
            dx,
            y_max,
            dy,
        } => {
            let limbs = x_origin.limb_count();
            let x_handle = arena.copy_in(&mut *module, x_origin.limbs())?;
            let dx_handle = arena.copy_in(&mut *module, dx.with_limbs(limbs).limbs())?;
            let y_handle = arena.allocate(limbs as u32)?;
            let out = arena.allocate(columns)?;

            let mut down = dy.with_limbs(limbs);
            down.negate();
            let mut y = y_max.with_limbs(limbs);
            y.add_multiple(&down, task.first_row());

            for _ in 0..task.rows {
                arena.write(&mut *module, &y_handle, y.limbs())?;
                module.compute_row_hp(
                    x_handle.byte_offset(),
                    dx_handle.byte_offset(),
                    limbs as u32,
                    columns,
                    y_handle.byte_offset(),
                    job.max_iterations,
                    out.byte_offset(),
                )?;
                arena.read(&*module, &out, &mut words)?;
                rows.push(words.iter().map(|&word| word as i32).collect());
                y.add(&down);
            }
        }
    }

    Ok(rows)
}
