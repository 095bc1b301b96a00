//! Register and stack virtual machine for assembled Romasm programs.
//!
//! # Architecture
//!
//! - **Registers**: 8 general 32-bit registers `R0`..`R7`, byte views
//!   `AL`..`DH` over `R0`..`R3`, and 6 segment registers
//! - **Stack**: one stack shared by CALL/RET return addresses and PUSH/POP
//! - **Memory**: sparse, word-per-address; the data section is loaded right
//!   after the code so data labels address it directly
//! - **Flags**: equal/less/greater from the compare family, plus IF and DF
//! - **Interrupts**: INT jumps to a registered vector and IRET returns
//! - **Ports**: byte-wide I/O port map for IN/OUT
//! - **Canvas**: optional host drawing surface for MOVE/DRAW/STROKE/CLEAR
//!
//! Faults halt the machine and are reported through [`vm::StepOutcome`] and
//! [`vm::RunReport`]; they never escape as panics.
//!
//! # Modules
//!
//! - [`errors`]: Runtime fault type
//! - [`vm`]: The interpreter

pub mod errors;
pub mod vm;
