//! Register name tables for the x86 back end.

use crate::assembly::operand::{Register, Register8, Segment};
use std::fmt;

/// Output flavour of the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum X86Mode {
    /// 16-bit real mode boot sector loaded at 0x7C00.
    #[default]
    Boot16,
    /// 64-bit freestanding function for UEFI-style hosts.
    Uefi64,
}

const REGS_16: [&str; 8] = ["ax", "bx", "cx", "dx", "si", "di", "bp", "sp"];
const REGS_64: [&str; 8] = ["rax", "rbx", "rcx", "rdx", "rsi", "rdi", "r8", "r9"];
const LOW_BYTES: [&str; 4] = ["al", "bl", "cl", "dl"];

impl X86Mode {
    /// Parses `boot`/`16` or `uefi`/`64`.
    pub fn from_name(name: &str) -> Option<X86Mode> {
        match name.to_ascii_lowercase().as_str() {
            "boot" | "boot16" | "16" => Some(X86Mode::Boot16),
            "uefi" | "uefi64" | "64" => Some(X86Mode::Uefi64),
            _ => None,
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            X86Mode::Boot16 => 16,
            X86Mode::Uefi64 => 64,
        }
    }

    /// Name of `reg` in this mode.
    pub const fn register(self, reg: Register) -> &'static str {
        match self {
            X86Mode::Boot16 => REGS_16[reg.index()],
            X86Mode::Uefi64 => REGS_64[reg.index()],
        }
    }

    /// NASM size keyword of a machine word.
    pub const fn word(self) -> &'static str {
        match self {
            X86Mode::Boot16 => "word",
            X86Mode::Uefi64 => "qword",
        }
    }

    /// Accumulator, used by the fixed lowering sequences.
    pub const fn acc(self) -> &'static str {
        self.register(Register::R0)
    }

    /// Data register, the port register of IN/OUT and the remainder of IDIV.
    pub const fn data(self) -> &'static str {
        self.register(Register::R3)
    }

    /// Counter register for shifts and REP.
    pub const fn counter(self) -> &'static str {
        self.register(Register::R2)
    }

    /// Sign extension of the accumulator before IDIV.
    pub const fn sign_extend(self) -> &'static str {
        match self {
            X86Mode::Boot16 => "cwd",
            X86Mode::Uefi64 => "cqo",
        }
    }

    /// Data directive of one scratch word.
    pub const fn word_directive(self) -> &'static str {
        match self {
            X86Mode::Boot16 => "dw",
            X86Mode::Uefi64 => "dq",
        }
    }
}

impl fmt::Display for X86Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X86Mode::Boot16 => write!(f, "16-bit boot sector"),
            X86Mode::Uefi64 => write!(f, "64-bit"),
        }
    }
}

/// Low byte register of `R0`..`R3`; the others have no byte alias.
pub const fn low_byte(reg: Register) -> Option<&'static str> {
    match reg {
        Register::R0 | Register::R1 | Register::R2 | Register::R3 => Some(LOW_BYTES[reg.index()]),
        _ => None,
    }
}

pub fn half(reg: Register8) -> String {
    reg.name().to_ascii_lowercase()
}

pub fn segment(seg: Segment) -> String {
    seg.name().to_ascii_lowercase()
}
