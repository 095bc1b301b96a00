//! Romasm toolchain library.
//!
//! Assembles Romasm source into an instruction stream, links it against
//! standard-library modules, runs it in a register/stack virtual machine, and
//! lowers it to x86 assembly text.

pub mod assembly;
pub mod linker;
pub mod types;
pub mod utils;
pub mod virtual_machine;
pub mod x86;
