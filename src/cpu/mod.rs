//! The register machine.
//!
//! - 16 word-sized general-purpose registers, two of which are designated
//!   program counter and stack pointer
//! - one 64-bit instruction per memory cell, 21 opcodes
//! - memory and devices supplied by the host through [`MemoryBus`] and
//!   [`IoBus`]

pub mod decode;
pub mod execute;
pub mod io;
pub mod memory;
pub mod registers;

/// Machine word: register width and memory cell size.
pub type Word = u64;

pub use decode::{decode, encode, InstructionWord, Opcode, OperandKind};
pub use execute::{Cpu, CpuError, CpuSnapshot, Fault, Step};
pub use io::{BufferedIo, ConsoleIo, DeviceTable, IoBus, IoError, IoFunction, ReadDevice, WriteDevice};
pub use memory::{FlatMemory, MemoryBus, MemoryError};
pub use registers::{ConfigError, CpuConfig, Flags, Registers, Stack};
