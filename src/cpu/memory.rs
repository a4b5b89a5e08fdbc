//! Memory boundary.
//!
//! The CPU never owns its memory. A host implements [`MemoryBus`] over
//! whatever backing store it likes and installs it on the CPU before
//! running. [`FlatMemory`] is the simple Vec-backed store used by the CLI,
//! the debugger, and the tests.

use crate::cpu::registers::Registers;
use crate::cpu::Word;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default size of a [`FlatMemory`], in words.
pub const DEFAULT_MEMORY_SIZE: usize = 64 * 1024;

/// Host-supplied storage for instructions and data.
///
/// `cpu` is a read-only view of the register file at the time of the
/// access. Both methods default to [`MemoryError::NotInstalled`], so a
/// host may provide only one direction (a ROM, for instance).
pub trait MemoryBus {
    /// Fetch one cell.
    fn get_memory(&mut self, cpu: &Registers, address: Word) -> Result<Word, MemoryError> {
        let _ = (cpu, address);
        Err(MemoryError::NotInstalled)
    }

    /// Store one cell.
    fn set_memory(&mut self, cpu: &Registers, address: Word, value: Word) -> Result<(), MemoryError> {
        let _ = (cpu, address, value);
        Err(MemoryError::NotInstalled)
    }
}

impl<T: MemoryBus + ?Sized> MemoryBus for &mut T {
    fn get_memory(&mut self, cpu: &Registers, address: Word) -> Result<Word, MemoryError> {
        (**self).get_memory(cpu, address)
    }

    fn set_memory(&mut self, cpu: &Registers, address: Word, value: Word) -> Result<(), MemoryError> {
        (**self).set_memory(cpu, address, value)
    }
}

/// Bounds-checked, zero-initialized word array.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatMemory {
    cells: Vec<Word>,
}

impl FlatMemory {
    /// Create `size` zeroed cells.
    pub fn new(size: usize) -> Self {
        Self { cells: vec![0; size] }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn index(&self, address: Word) -> Result<usize, MemoryError> {
        usize::try_from(address)
            .ok()
            .filter(|&index| index < self.cells.len())
            .ok_or(MemoryError::OutOfBounds { address })
    }

    /// Read a cell.
    #[inline]
    pub fn read(&self, address: Word) -> Result<Word, MemoryError> {
        let index = self.index(address)?;
        Ok(self.cells[index])
    }

    /// Write a cell.
    #[inline]
    pub fn write(&mut self, address: Word, value: Word) -> Result<(), MemoryError> {
        let index = self.index(address)?;
        self.cells[index] = value;
        Ok(())
    }

    /// Copy `program` into memory starting at `start`.
    pub fn load_program(&mut self, start: Word, program: &[Word]) -> Result<(), MemoryError> {
        let start = usize::try_from(start).unwrap_or(usize::MAX);
        let available = self.cells.len().saturating_sub(start);
        if program.len() > available {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available,
            });
        }
        if program.is_empty() {
            return Ok(());
        }

        self.cells[start..start + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Write a byte string one byte per cell, followed by a zero cell.
    pub fn load_cstring(&mut self, start: Word, bytes: &[u8]) -> Result<(), MemoryError> {
        let cells: Vec<Word> = bytes
            .iter()
            .map(|&b| Word::from(b))
            .chain(std::iter::once(0))
            .collect();
        self.load_program(start, &cells)
    }

    /// Zero every cell.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// `(address, value)` pairs for `count` cells starting at `start`.
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(self.cells.len());
        (start.min(end)..end).map(|i| (i, self.cells[i])).collect()
    }

    pub fn as_slice(&self) -> &[Word] {
        &self.cells
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE)
    }
}

impl MemoryBus for FlatMemory {
    fn get_memory(&mut self, _cpu: &Registers, address: Word) -> Result<Word, MemoryError> {
        self.read(address)
    }

    fn set_memory(&mut self, _cpu: &Registers, address: Word, value: Word) -> Result<(), MemoryError> {
        self.write(address, value)
    }
}

impl std::fmt::Debug for FlatMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("FlatMemory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors reported across the memory boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The addressed cell does not exist.
    #[error("memory address {address:#x} out of bounds")]
    OutOfBounds { address: Word },

    /// No callback is installed for this direction of access.
    #[error("no memory callback installed")]
    NotInstalled,

    /// Program is too large to fit in memory.
    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rom(Vec<Word>);

    impl MemoryBus for Rom {
        fn get_memory(&mut self, _cpu: &Registers, address: Word) -> Result<Word, MemoryError> {
            self.0
                .get(address as usize)
                .copied()
                .ok_or(MemoryError::OutOfBounds { address })
        }
    }

    #[test]
    fn test_memory_read_write() {
        let mut mem = FlatMemory::new(16);
        mem.write(10, 42).unwrap();
        assert_eq!(mem.read(10), Ok(42));
    }

    #[test]
    fn test_memory_bounds() {
        let mut mem = FlatMemory::new(16);
        assert!(mem.read(15).is_ok());
        assert_eq!(mem.read(16), Err(MemoryError::OutOfBounds { address: 16 }));
        assert_eq!(
            mem.write(u64::MAX, 1),
            Err(MemoryError::OutOfBounds { address: u64::MAX })
        );
    }

    #[test]
    fn test_load_program() {
        let mut mem = FlatMemory::new(8);
        mem.load_program(2, &[1, 2, 3]).unwrap();
        assert_eq!(mem.dump(1, 5), vec![(1, 0), (2, 1), (3, 2), (4, 3), (5, 0)]);

        assert_eq!(
            mem.load_program(6, &[1, 2, 3]),
            Err(MemoryError::ProgramTooLarge { size: 3, available: 2 })
        );
        assert_eq!(
            mem.load_program(100, &[1]),
            Err(MemoryError::ProgramTooLarge { size: 1, available: 0 })
        );
    }

    #[test]
    fn test_load_cstring_terminates() {
        let mut mem = FlatMemory::new(8);
        mem.write(3, 99).unwrap();
        mem.load_cstring(0, b"hi!").unwrap();
        assert_eq!(&mem.as_slice()[..4], &[b'h' as Word, b'i' as Word, b'!' as Word, 0]);
    }

    #[test]
    fn test_partial_bus_defaults_to_not_installed() {
        let regs = Registers::new();
        let mut rom = Rom(vec![5, 6]);
        assert_eq!(rom.get_memory(&regs, 1), Ok(6));
        assert_eq!(rom.set_memory(&regs, 1, 0), Err(MemoryError::NotInstalled));
    }

    #[test]
    fn test_clear() {
        let mut mem = FlatMemory::new(4);
        mem.load_program(0, &[1, 2, 3, 4]).unwrap();
        mem.clear();
        assert!(mem.as_slice().iter().all(|&c| c == 0));
    }
}
