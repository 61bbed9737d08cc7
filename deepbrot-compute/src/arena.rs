//! Bump allocation of fixed-point operands inside a foreign linear memory.
//!
//! A foreign kernel (a WebAssembly instance or a native memory image) only
//! sees its own memory, so every operand is copied into a reserved region of
//! it before the call and results are read back out afterwards. The region is
//! managed as a bump allocator that is reset at the start of every Task.
//! Handles carry the generation they were allocated in; a reset bumps the
//! generation so handles from an earlier Task are rejected instead of
//! silently aliasing new allocations.

use crate::error::ArenaError;

const WORD_BYTES: u32 = 4;

/// Byte-addressed memory holding little-endian `u32` words.
pub trait LinearMemory {
    fn size_bytes(&self) -> usize;

    fn read_words(&self, byte_offset: u32, out: &mut [u32]) -> Result<(), ArenaError>;

    fn write_words(&mut self, byte_offset: u32, words: &[u32]) -> Result<(), ArenaError>;
}

/// Byte range of `len` words at `byte_offset`, if it fits in `size`.
fn word_range(
    byte_offset: u32,
    len: usize,
    size: usize,
) -> Result<std::ops::Range<usize>, ArenaError> {
    let start = byte_offset as usize;
    let end = len
        .checked_mul(WORD_BYTES as usize)
        .and_then(|bytes| start.checked_add(bytes))
        .filter(|&end| end <= size);
    match end {
        Some(end) => Ok(start..end),
        None => Err(ArenaError::OutOfBounds {
            offset: byte_offset,
            len: len as u32,
        }),
    }
}

/// Read `out.len()` little-endian words from `bytes`.
pub fn read_le_words(bytes: &[u8], byte_offset: u32, out: &mut [u32]) -> Result<(), ArenaError> {
    let range = word_range(byte_offset, out.len(), bytes.len())?;
    for (word, chunk) in out.iter_mut().zip(bytes[range].chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(())
}

/// Write `words` into `bytes` as little-endian.
pub fn write_le_words(
    bytes: &mut [u8],
    byte_offset: u32,
    words: &[u32],
) -> Result<(), ArenaError> {
    let range = word_range(byte_offset, words.len(), bytes.len())?;
    for (chunk, word) in bytes[range].chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    Ok(())
}

impl LinearMemory for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len()
    }

    fn read_words(&self, byte_offset: u32, out: &mut [u32]) -> Result<(), ArenaError> {
        read_le_words(self, byte_offset, out)
    }

    fn write_words(&mut self, byte_offset: u32, words: &[u32]) -> Result<(), ArenaError> {
        write_le_words(self, byte_offset, words)
    }
}

/// The part of a foreign memory reserved for the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaRegion {
    pub base_byte: u32,
    pub words: u32,
}

/// A live allocation: `len` words starting at `byte_offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaHandle {
    start: u32,
    len: u32,
    byte_offset: u32,
    generation: u32,
}

impl ArenaHandle {
    /// Address to hand to the foreign kernel.
    pub fn byte_offset(&self) -> u32 {
        self.byte_offset
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct MemoryArena {
    region: ArenaRegion,
    /// Words handed out so far.
    cursor: u32,
    generation: u32,
}

impl MemoryArena {
    pub fn new(region: ArenaRegion) -> Self {
        Self {
            region,
            cursor: 0,
            generation: 0,
        }
    }

    /// Reserve `len` words.
    pub fn allocate(&mut self, len: u32) -> Result<ArenaHandle, ArenaError> {
        let available = self.available();
        if len > available {
            return Err(ArenaError::Exhausted {
                requested: len,
                available,
            });
        }
        let handle = ArenaHandle {
            start: self.cursor,
            len,
            byte_offset: self.region.base_byte + self.cursor * WORD_BYTES,
            generation: self.generation,
        };
        self.cursor += len;
        Ok(handle)
    }

    /// Allocate room for `limbs` and copy them in.
    pub fn copy_in<M>(&mut self, memory: &mut M, limbs: &[u32]) -> Result<ArenaHandle, ArenaError>
    where
        M: LinearMemory + ?Sized,
    {
        let handle = self.allocate(limbs.len() as u32)?;
        memory.write_words(handle.byte_offset, limbs)?;
        Ok(handle)
    }

    /// Overwrite the start of an allocation.
    pub fn write<M>(
        &self,
        memory: &mut M,
        handle: &ArenaHandle,
        words: &[u32],
    ) -> Result<(), ArenaError>
    where
        M: LinearMemory + ?Sized,
    {
        self.check(handle, words.len())?;
        memory.write_words(handle.byte_offset, words)
    }

    /// Read the start of an allocation into `out`.
    pub fn read<M>(
        &self,
        memory: &M,
        handle: &ArenaHandle,
        out: &mut [u32],
    ) -> Result<(), ArenaError>
    where
        M: LinearMemory + ?Sized,
    {
        self.check(handle, out.len())?;
        memory.read_words(handle.byte_offset, out)
    }

    /// Release the most recent allocation. Anything else is refused, so the
    /// cursor can never move below a live allocation.
    pub fn free(&mut self, handle: ArenaHandle) -> Result<(), ArenaError> {
        self.check(&handle, 0)?;
        if handle.start + handle.len != self.cursor {
            return Err(ArenaError::OutOfOrderFree);
        }
        self.cursor = handle.start;
        Ok(())
    }

    /// Drop every allocation and invalidate outstanding handles.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Words currently allocated.
    pub fn used(&self) -> u32 {
        self.cursor
    }

    pub fn available(&self) -> u32 {
        self.region.words - self.cursor
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn region(&self) -> ArenaRegion {
        self.region
    }

    fn check(&self, handle: &ArenaHandle, words: usize) -> Result<(), ArenaError> {
        if handle.generation != self.generation || handle.start + handle.len > self.cursor {
            return Err(ArenaError::StaleHandle {
                handle: handle.generation,
                current: self.generation,
            });
        }
        if words > handle.len as usize {
            return Err(ArenaError::OutOfBounds {
                offset: handle.byte_offset,
                len: words as u32,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(words: u32) -> (MemoryArena, Vec<u8>) {
        let region = ArenaRegion {
            base_byte: 64,
            words,
        };
        (MemoryArena::new(region), vec![0; 64 + words as usize * 4])
    }

    #[test]
    fn allocations_do_not_overlap() {
        let (mut arena, _) = arena(16);
        let a = arena.allocate(4).unwrap();
        let b = arena.allocate(3).unwrap();
        assert_eq!(a.byte_offset(), 64);
        assert_eq!(b.byte_offset(), 64 + 16);
        assert_eq!(arena.used(), 7);
        assert_eq!(arena.available(), 9);
    }

    #[test]
    fn copy_in_and_read_back() {
        let (mut arena, mut memory) = arena(8);
        let handle = arena.copy_in(&mut memory, &[1, 0xFFFF, 0x8000]).unwrap();
        let mut out = [0u32; 3];
        arena.read(&memory, &handle, &mut out).unwrap();
        assert_eq!(out, [1, 0xFFFF, 0x8000]);
        // Little-endian at the handle's address.
        assert_eq!(&memory[64..68], &[1, 0, 0, 0]);
    }

    #[test]
    fn exhaustion_is_an_error_not_an_overlap() {
        let (mut arena, _) = arena(4);
        arena.allocate(3).unwrap();
        assert_eq!(
            arena.allocate(2),
            Err(ArenaError::Exhausted {
                requested: 2,
                available: 1
            })
        );
        assert_eq!(arena.used(), 3);
    }

    #[test]
    fn reset_invalidates_old_handles() {
        let (mut arena, mut memory) = arena(8);
        let old = arena.copy_in(&mut memory, &[7, 7]).unwrap();
        arena.reset();
        assert_eq!(arena.used(), 0);
        let mut out = [0u32; 2];
        assert!(matches!(
            arena.read(&memory, &old, &mut out),
            Err(ArenaError::StaleHandle { .. })
        ));
        assert!(matches!(
            arena.free(old),
            Err(ArenaError::StaleHandle { .. })
        ));
    }

    #[test]
    fn free_is_lifo_only() {
        let (mut arena, _) = arena(8);
        let first = arena.allocate(2).unwrap();
        let second = arena.allocate(2).unwrap();
        assert_eq!(arena.free(first), Err(ArenaError::OutOfOrderFree));
        assert_eq!(arena.used(), 4);
        arena.free(second).unwrap();
        arena.free(first).unwrap();
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn freed_handle_cannot_be_used() {
        let (mut arena, mut memory) = arena(8);
        let handle = arena.allocate(2).unwrap();
        arena.free(handle).unwrap();
        assert!(matches!(
            arena.write(&mut memory, &handle, &[1, 2]),
            Err(ArenaError::StaleHandle { .. })
        ));
    }

    #[test]
    fn writes_are_bounded_by_the_allocation() {
        let (mut arena, mut memory) = arena(8);
        let handle = arena.allocate(2).unwrap();
        assert!(matches!(
            arena.write(&mut memory, &handle, &[1, 2, 3]),
            Err(ArenaError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn memory_outside_the_buffer_is_rejected() {
        let region = ArenaRegion {
            base_byte: 0,
            words: 100,
        };
        let mut arena = MemoryArena::new(region);
        let mut memory = vec![0u8; 16];
        assert!(matches!(
            arena.copy_in(&mut memory, &[0; 8]),
            Err(ArenaError::OutOfBounds { .. })
        ));
    }
}
