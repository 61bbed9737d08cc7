pub mod arena;
pub mod band_render;
pub mod error;
pub mod escape;
pub mod module;
pub mod service;
#[cfg(feature = "wasm")]
pub mod wasm_host;
pub mod worker;

pub use arena::{ArenaHandle, ArenaRegion, LinearMemory, MemoryArena};
pub use band_render::{render_band, render_band_parallel, render_task};
pub use error::{ArenaError, ModuleError, RenderError, ServiceError};
pub use escape::{iterate, iterate_hp, EscapeKernel, FixedPointKernel, StandardKernel};
pub use module::{render_task_in_module, ForeignModule, NativeModule};
pub use service::{ComputeService, ServiceConfig, ServiceResponse};
#[cfg(feature = "wasm")]
pub use wasm_host::WasmModule;
pub use worker::{run_message_loop, Worker};

// Re-export core types for convenience
pub use deepbrot_core::*;
