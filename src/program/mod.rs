//! Program images and listings.
//!
//! This module provides:
//! - image file loading and saving (text and binary)
//! - a disassembler (words -> readable text)

pub mod disasm;
pub mod image;

pub use disasm::{disassemble, disassemble_word};
pub use image::{load_image, parse_image, save_image, ImageError, ProgramImage};
