//! Terminal debugger.
//!
//! Single-steps or free-runs a program with:
//! - the sixteen registers and the flag word
//! - a scrollable memory view, PC and SP highlighted
//! - a disassembly window with breakpoints
//! - the bytes written through the output device

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
