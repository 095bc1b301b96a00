//! Romasm source language: instruction set, assembler and program formats.
//!
//! # Modules
//!
//! - [`operand`]: Registers, labels and the operand sum type
//! - [`isa`]: Opcode table, operand kinds and repeat prefixes
//! - [`program`]: Instructions, data bytes and the [`program::Assembly`] result
//! - [`assembler`]: Two-pass text to [`program::Assembly`] translation
//! - [`disassembler`]: Instructions back to source text
//! - [`bytecode`]: Binary container for assembled programs
//! - [`errors`]: Collected assembly errors

pub mod assembler;
pub mod bytecode;
pub mod disassembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod operand;
pub mod program;
