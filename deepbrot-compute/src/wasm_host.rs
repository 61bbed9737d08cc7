//! [`ForeignModule`] backed by a `deepbrot-wasm` instance running in wasmtime.

use crate::arena::{read_le_words, write_le_words, ArenaRegion, LinearMemory};
use crate::error::{ArenaError, ModuleError};
use crate::module::{check_status, ForeignModule};
use log::info;
use std::path::Path;
use wasmtime::{Engine, Instance, Memory, Module, Store, TypedFunc};

type RowFn = TypedFunc<(f64, f64, u32, f64, u32, u32), i32>;
type RowHpFn = TypedFunc<(u32, u32, u32, u32, u32, u32, u32), i32>;

pub struct WasmModule {
    store: Store<()>,
    memory: Memory,
    region: ArenaRegion,
    compute_row: RowFn,
    compute_row_hp: RowHpFn,
}

impl WasmModule {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| ModuleError::Load(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Compile and instantiate a module. It must export its memory as
    /// `memory`, the arena bounds as `arena_base` / `arena_words` and both
    /// row kernels.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModuleError> {
        let engine = Engine::default();
        let module = Module::new(&engine, bytes).map_err(|e| ModuleError::Load(e.to_string()))?;
        let mut store = Store::new(&engine, ());
        let instance = Instance::new(&mut store, &module, &[])
            .map_err(|e| ModuleError::Load(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| ModuleError::MissingExport("memory".to_string()))?;
        let arena_base = export::<(), u32>(&instance, &mut store, "arena_base")?;
        let arena_words = export::<(), u32>(&instance, &mut store, "arena_words")?;
        let compute_row = export(&instance, &mut store, "compute_row")?;
        let compute_row_hp = export(&instance, &mut store, "compute_row_hp")?;

        let region = ArenaRegion {
            base_byte: arena_base.call(&mut store, ()).map_err(trap)?,
            words: arena_words.call(&mut store, ()).map_err(trap)?,
        };
        info!(
            "Loaded compute module: arena of {} words at byte {}",
            region.words, region.base_byte
        );

        Ok(Self {
            store,
            memory,
            region,
            compute_row,
            compute_row_hp,
        })
    }
}

fn export<P, R>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &str,
) -> Result<TypedFunc<P, R>, ModuleError>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<P, R>(&mut *store, name)
        .map_err(|_| ModuleError::MissingExport(name.to_string()))
}

fn trap(e: impl std::fmt::Display) -> ModuleError {
    ModuleError::Trap(e.to_string())
}

impl LinearMemory for WasmModule {
    fn size_bytes(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    fn read_words(&self, byte_offset: u32, out: &mut [u32]) -> Result<(), ArenaError> {
        read_le_words(self.memory.data(&self.store), byte_offset, out)
    }

    fn write_words(&mut self, byte_offset: u32, words: &[u32]) -> Result<(), ArenaError> {
        write_le_words(self.memory.data_mut(&mut self.store), byte_offset, words)
    }
}

impl ForeignModule for WasmModule {
    fn arena_region(&self) -> ArenaRegion {
        self.region
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
        let params = (xmin, dx, columns, y, max_iterations, out_ptr);
        let status = self.compute_row.call(&mut self.store, params).map_err(trap)?;
        check_status(status)
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
        let params = (xmin_ptr, dx_ptr, limbs, columns, y_ptr, max_iterations, out_ptr);
        let status = self.compute_row_hp.call(&mut self.store, params).map_err(trap)?;
        check_status(status)
    }
}
