//! Assembled program representation.
//!
//! [`Assembly`] is the assembler's output: a flat instruction list, the data
//! section as [`DataByte`]s, and the merged label table. Code labels lie in
//! `[0, instruction_count)`, data labels at `instruction_count + offset`.

use crate::assembly::errors::AsmError;
use crate::assembly::isa::{Opcode, RepPrefix};
use crate::assembly::operand::Operand;
use std::collections::BTreeMap;
use std::fmt;

/// Label name to address in the merged code/data address space.
pub type LabelTable = BTreeMap<String, u32>;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Position in the enclosing instruction stream.
    pub address: u32,
    pub opcode: Opcode,
    /// Uppercased mnemonic as written, possibly an alias.
    pub mnemonic: String,
    pub rep: Option<RepPrefix>,
    pub operands: Vec<Operand>,
    /// Source line, for diagnostics.
    pub raw: String,
}

impl Instruction {
    /// Builds an instruction with the canonical mnemonic and a synthesized `raw`.
    pub fn new(address: u32, opcode: Opcode, operands: Vec<Operand>) -> Self {
        let mut instr = Self {
            address,
            opcode,
            mnemonic: opcode.mnemonic().to_string(),
            rep: None,
            operands,
            raw: String::new(),
        };
        instr.raw = instr.to_string();
        instr
    }

    pub fn with_rep(mut self, rep: RepPrefix) -> Self {
        self.rep = Some(rep);
        self.raw = self.to_string();
        self
    }

    pub fn operand(&self, index: usize) -> Option<&Operand> {
        self.operands.get(index)
    }

    /// True when an operand still names an unresolved label.
    pub fn has_pending(&self) -> bool {
        self.operands.iter().any(|op| op.pending_name().is_some())
    }
}

impl fmt::Display for Instruction {
    /// Canonical text: `[PREFIX ]MNEMONIC op1, op2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rep) = self.rep {
            write!(f, "{} ", rep.name())?;
        }
        write!(f, "{}", self.opcode.mnemonic())?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{op}")?;
        }
        Ok(())
    }
}

/// One byte of the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataByte {
    /// Offset within the data section.
    pub address: u32,
    pub value: u8,
}

/// Result of assembling one source unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    pub instructions: Vec<Instruction>,
    pub data: Vec<DataByte>,
    /// Merged code and data labels.
    pub labels: LabelTable,
    /// Data labels only, with section-local offsets.
    pub data_labels: LabelTable,
    pub errors: Vec<AsmError>,
}

impl Assembly {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn instruction_count(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Addresses below the instruction count are code, the rest data.
    pub fn is_code_address(&self, address: u32) -> bool {
        address < self.instruction_count()
    }

    /// Data section as raw bytes, in address order.
    pub fn data_bytes(&self) -> Vec<u8> {
        self.data.iter().map(|b| b.value).collect()
    }

    /// Code labels only.
    pub fn code_labels(&self) -> impl Iterator<Item = (&str, u32)> {
        let count = self.instruction_count();
        self.labels
            .iter()
            .filter(move |(_, addr)| **addr < count)
            .map(|(name, addr)| (name.as_str(), *addr))
    }
}
