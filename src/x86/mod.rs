//! x86 back end.
//!
//! Re-targets an assembled instruction stream to NASM-syntax text, either as a
//! 16-bit boot sector or as a 64-bit freestanding `romasm_main` function. The
//! text is meant for an external assembler; nothing here invokes one.
//!
//! # Modules
//!
//! - [`registers`]: Modes and register name tables
//! - [`generator`]: The lowering pass and boot image padding

pub mod generator;
pub mod registers;
