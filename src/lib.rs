//! # regvm
//!
//! A register-based bytecode interpreter.
//!
//! The CPU fetches, decodes and executes one 64-bit instruction word per
//! cycle. It owns only its registers, flags and a small reserved stack;
//! memory and peripheral devices are supplied by the host through the
//! [`MemoryBus`] and [`IoBus`] traits, so the same interpreter runs over a
//! flat array, a paged store, or anything else that can answer reads and
//! writes.

pub mod log;
pub mod config;
pub mod cpu;
pub mod program;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use config::HostConfig;
pub use cpu::{
    decode, encode, BufferedIo, ConsoleIo, Cpu, CpuConfig, CpuError, Fault, FlatMemory,
    InstructionWord, IoBus, IoError, IoFunction, MemoryBus, MemoryError, Opcode, Registers, Step,
    Word,
};
pub use program::{disassemble, load_image, save_image, ProgramImage};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
