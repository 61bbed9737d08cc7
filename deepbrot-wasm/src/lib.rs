//! Row kernels compiled to a WebAssembly module.
//!
//! Exports, all addresses being byte offsets into this module's memory:
//!
//! * `arena_base() -> u32`, `arena_words() -> u32`: the region the host may
//!   use for staging operands
//! * `compute_row(xmin, dx, columns, y, max_iterations, out_ptr) -> i32`
//! * `compute_row_hp(xmin_ptr, dx_ptr, limbs, columns, y_ptr, max_iterations,
//!   out_ptr) -> i32`
//!
//! A kernel returns `0` when it wrote `columns` counts to `out_ptr`, and a
//! non-zero status when it refused its input.

use deepbrot_compute::band_render::{fixed_point_row_from_limbs, standard_row};
use deepbrot_compute::module::{KERNEL_BAD_INPUT, KERNEL_OK};
use std::ptr::addr_of_mut;

const ARENA_WORDS: usize = 64 * 1024;

static mut ARENA: [u32; ARENA_WORDS] = [0; ARENA_WORDS];

#[no_mangle]
pub extern "C" fn arena_base() -> u32 {
    // Linear-memory addresses are 32 bits on wasm32.
    unsafe { addr_of_mut!(ARENA) as usize as u32 }
}

#[no_mangle]
pub extern "C" fn arena_words() -> u32 {
    ARENA_WORDS as u32
}

/// # Safety
///
/// `out_ptr` must address `columns` writable, aligned `i32`s.
#[no_mangle]
pub unsafe extern "C" fn compute_row(
    xmin: f64,
    dx: f64,
    columns: u32,
    y: f64,
    max_iterations: u32,
    out_ptr: u32,
) -> i32 {
    let Some(out) = words_mut::<i32>(out_ptr, columns) else {
        return KERNEL_BAD_INPUT;
    };
    row(xmin, dx, y, max_iterations, out)
}

/// # Safety
///
/// `xmin_ptr`, `dx_ptr` and `y_ptr` must each address `limbs` readable,
/// aligned `u32`s and `out_ptr` `columns` writable `i32`s, none of them
/// overlapping the output.
#[no_mangle]
pub unsafe extern "C" fn compute_row_hp(
    xmin_ptr: u32,
    dx_ptr: u32,
    limbs: u32,
    columns: u32,
    y_ptr: u32,
    max_iterations: u32,
    out_ptr: u32,
) -> i32 {
    let (Some(xmin), Some(dx), Some(y)) = (
        words::<u32>(xmin_ptr, limbs),
        words::<u32>(dx_ptr, limbs),
        words::<u32>(y_ptr, limbs),
    ) else {
        return KERNEL_BAD_INPUT;
    };
    let Some(out) = words_mut::<i32>(out_ptr, columns) else {
        return KERNEL_BAD_INPUT;
    };
    row_hp(xmin, dx, y, max_iterations, out)
}

fn row(xmin: f64, dx: f64, y: f64, max_iterations: u32, out: &mut [i32]) -> i32 {
    standard_row(xmin, dx, y, max_iterations, out);
    KERNEL_OK
}

fn row_hp(xmin: &[u32], dx: &[u32], y: &[u32], max_iterations: u32, out: &mut [i32]) -> i32 {
    if xmin.is_empty() || dx.len() != xmin.len() || y.len() != xmin.len() {
        return KERNEL_BAD_INPUT;
    }
    match fixed_point_row_from_limbs(xmin, dx, y, max_iterations, out) {
        Ok(()) => KERNEL_OK,
        Err(_) => KERNEL_BAD_INPUT,
    }
}

unsafe fn words<'a, T>(ptr: u32, len: u32) -> Option<&'a [T]> {
    let ptr = ptr as usize as *const T;
    if ptr.is_null() || (ptr as usize) % std::mem::align_of::<T>() != 0 {
        return None;
    }
    Some(std::slice::from_raw_parts(ptr, len as usize))
}

unsafe fn words_mut<'a, T>(ptr: u32, len: u32) -> Option<&'a mut [T]> {
    let ptr = ptr as usize as *mut T;
    if ptr.is_null() || (ptr as usize) % std::mem::align_of::<T>() != 0 {
        return None;
    }
    Some(std::slice::from_raw_parts_mut(ptr, len as usize))
}
