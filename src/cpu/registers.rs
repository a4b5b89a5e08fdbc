//! Register file, status flags, and the reserved call stack.
//!
//! The machine has 16 general-purpose word registers addressed by index.
//! Two of them are given special roles by [`CpuConfig`]: the program
//! counter and the stack pointer.

use crate::cpu::Word;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 16;

/// Default capacity of the reserved stack, in words.
pub const DEFAULT_STACK_SIZE: usize = 256;

/// Register holding the device descriptor for `Syscall`.
pub const SYSCALL_DESCRIPTOR_REGISTER: usize = 3;

/// Register holding the data address for `Syscall`.
pub const SYSCALL_POINTER_REGISTER: usize = 4;

/// 16-bit status word.
///
/// Only [`Flags::RUNNING`] is driven by the current instruction set. The
/// other bits are carried as-is from cycle to cycle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Flags(u16);

impl Flags {
    pub const RUNNING: u16 = 1 << 0;
    pub const CARRY: u16 = 1 << 1;
    pub const ZERO: u16 = 1 << 2;
    pub const NEGATIVE: u16 = 1 << 3;
    pub const OVERFLOW: u16 = 1 << 4;
    pub const INTERRUPT: u16 = 1 << 5;

    const NAMES: [(u16, &'static str); 6] = [
        (Self::RUNNING, "RUNNING"),
        (Self::CARRY, "CARRY"),
        (Self::ZERO, "ZERO"),
        (Self::NEGATIVE, "NEGATIVE"),
        (Self::OVERFLOW, "OVERFLOW"),
        (Self::INTERRUPT, "INTERRUPT"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    /// True if every bit of `mask` is set.
    pub const fn contains(self, mask: u16) -> bool {
        self.0 & mask == mask
    }

    pub fn insert(&mut self, mask: u16) {
        self.0 |= mask;
    }

    pub fn remove(&mut self, mask: u16) {
        self.0 &= !mask;
    }

    pub fn set(&mut self, mask: u16, on: bool) {
        if on {
            self.insert(mask);
        } else {
            self.remove(mask);
        }
    }

    /// Names of the set flags, lowest bit first.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({:#06x} {})", self.0, self)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// The register file and status word.
///
/// This is the view of the CPU handed to the memory and I/O callbacks.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    /// General-purpose registers.
    pub file: [Word; REGISTER_COUNT],
    /// Status flags.
    pub flags: Flags,
}

impl Registers {
    /// All registers zero, all flags clear.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.file = [0; REGISTER_COUNT];
        self.flags = Flags::empty();
    }

    /// Read a register by instruction operand. `None` if out of range.
    #[inline]
    pub fn get(&self, index: u16) -> Option<Word> {
        self.file.get(index as usize).copied()
    }

    /// Write a register by instruction operand. `None` if out of range.
    #[inline]
    pub fn set(&mut self, index: u16, value: Word) -> Option<()> {
        let slot = self.file.get_mut(index as usize)?;
        *slot = value;
        Some(())
    }

    pub fn is_running(&self) -> bool {
        self.flags.contains(Flags::RUNNING)
    }
}

/// Which registers carry the program counter and stack pointer.
///
/// Fixed for the lifetime of a CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub pc_register: usize,
    pub sp_register: usize,
}

impl CpuConfig {
    /// Validate a register assignment.
    pub fn new(pc_register: usize, sp_register: usize) -> Result<Self, ConfigError> {
        let config = Self { pc_register, sp_register };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for index in [self.pc_register, self.sp_register] {
            if index >= REGISTER_COUNT {
                return Err(ConfigError::RegisterOutOfRange(index));
            }
        }
        if self.pc_register == self.sp_register {
            return Err(ConfigError::SharedRegister(self.pc_register));
        }
        Ok(())
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self { pc_register: 0, sp_register: 1 }
    }
}

/// Fixed-capacity word stack.
///
/// No instruction touches it yet; it is sized and owned by the CPU so that
/// call/return support can be added without changing the layout.
#[derive(Clone, PartialEq, Eq)]
pub struct Stack<const N: usize> {
    slots: [Word; N],
    len: usize,
}

impl<const N: usize> Stack<N> {
    pub const fn new() -> Self {
        Self { slots: [0; N], len: 0 }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Push a word. Returns `false` if the stack is full.
    pub fn push(&mut self, value: Word) -> bool {
        if self.len == N {
            return false;
        }
        self.slots[self.len] = value;
        self.len += 1;
        true
    }

    pub fn pop(&mut self) -> Option<Word> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.slots[self.len])
    }

    pub fn peek(&self) -> Option<Word> {
        self.len.checked_sub(1).map(|top| self.slots[top])
    }

    /// Live entries, bottom first.
    pub fn as_slice(&self) -> &[Word] {
        &self.slots[..self.len]
    }

    pub fn clear(&mut self) {
        self.slots = [0; N];
        self.len = 0;
    }
}

impl<const N: usize> Default for Stack<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for Stack<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("len", &self.len)
            .field("capacity", &N)
            .finish()
    }
}

/// Invalid special-register assignment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("register index {0} out of range (0-15)")]
    RegisterOutOfRange(usize),

    #[error("program counter and stack pointer both assigned to register {0}")]
    SharedRegister(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_preserve_other_bits() {
        let mut flags = Flags::from_bits(Flags::CARRY | Flags::OVERFLOW);
        flags.insert(Flags::RUNNING);
        flags.remove(Flags::RUNNING);
        assert_eq!(flags.bits(), Flags::CARRY | Flags::OVERFLOW);
        assert!(!flags.contains(Flags::RUNNING));
    }

    #[test]
    fn test_flags_display() {
        assert_eq!(Flags::empty().to_string(), "-");
        let flags = Flags::from_bits(Flags::RUNNING | Flags::ZERO);
        assert_eq!(flags.to_string(), "RUNNING|ZERO");
    }

    #[test]
    fn test_register_bounds() {
        let mut regs = Registers::new();
        assert_eq!(regs.set(15, 7), Some(()));
        assert_eq!(regs.get(15), Some(7));
        assert_eq!(regs.get(16), None);
        assert_eq!(regs.set(16, 1), None);
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(CpuConfig::default(), CpuConfig::new(0, 1).unwrap());
        assert_eq!(CpuConfig::new(16, 1), Err(ConfigError::RegisterOutOfRange(16)));
        assert_eq!(CpuConfig::new(2, 2), Err(ConfigError::SharedRegister(2)));
    }

    #[test]
    fn test_stack_capacity() {
        let mut stack: Stack<2> = Stack::new();
        assert!(stack.push(1));
        assert!(stack.push(2));
        assert!(!stack.push(3));
        assert_eq!(stack.peek(), Some(2));
        assert_eq!(stack.as_slice(), &[1, 2]);
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }
}
