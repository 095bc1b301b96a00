//! Compact binary container for assembled programs.
//!
//! Lets a minimal native loader interpret Romasm without lowering it to x86.
//!
//! # Layout
//!
//! All integers are little-endian.
//!
//! ```text
//! "RMSM"  u16 version  u16 instruction_count
//! instruction*:  [prefix: u8]  opcode: u8  operand*
//! u16 data_count   u8 * data_count
//! u16 label_count  (u8 name_len, name, u16 address) * label_count
//! ```
//!
//! Prefix bytes are `0xF1` (REP), `0xF3` (REPE) and `0xF2` (REPNE). The number of
//! operands is fixed by the opcode. Operand tags:
//!
//! | Tag            | Payload       | Operand                 |
//! |----------------|---------------|-------------------------|
//! | `0x00..=0x07`  | none          | register `R0`..`R7`     |
//! | `0x80`         | `i16`         | immediate               |
//! | `0x88`         | `i32`         | wide immediate          |
//! | `0x89`         | `u32`         | unsigned wide immediate |
//! | `0x90`         | inner operand | memory reference        |
//! | `0xA0`         | `u16`         | label address           |
//! | `0xB0`         | `u8`          | segment register        |
//! | `0xC0`         | `u8`          | half register           |

use crate::assembly::isa::{Opcode, RepPrefix};
use crate::assembly::operand::{LabelRef, Operand, OperandValue, Register, Register8, Segment};
use crate::assembly::program::{Assembly, DataByte, Instruction, LabelTable};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, ShortBytes};
use thiserror::Error;

/// Magic bytes identifying a Romasm bytecode file.
pub const MAGIC: &[u8; 4] = b"RMSM";

/// Current container version.
pub const BYTECODE_VERSION: u16 = 1;

const TAG_REGISTER_MAX: u8 = 0x07;
const TAG_IMM16: u8 = 0x80;
const TAG_IMM32: u8 = 0x88;
const TAG_UIMM32: u8 = 0x89;
const TAG_MEMORY: u8 = 0x90;
const TAG_LABEL: u8 = 0xA0;
const TAG_SEGMENT: u8 = 0xB0;
const TAG_REGISTER8: u8 = 0xC0;

/// Reasons an assembly cannot be written as bytecode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unresolved label '{0}' cannot be encoded")]
    PendingLabel(String),
    #[error("address {0} does not fit in 16 bits")]
    AddressOutOfRange(u32),
    #[error("immediate {0} does not fit in 32 bits")]
    ImmediateOutOfRange(i64),
    #[error("too many {what}: {count} (max 65535)")]
    TooMany { what: &'static str, count: usize },
    #[error("label name '{0}' is longer than 255 bytes")]
    LabelNameTooLong(String),
}

/// Reasons a byte stream is not valid bytecode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("unknown operand tag 0x{0:02x}")]
    UnknownOperandTag(u8),
    #[error("unknown {kind} id {id}")]
    UnknownRegister { kind: &'static str, id: u8 },
    #[error("repeat prefix on non-block opcode {0}")]
    PrefixOnNonBlock(&'static str),
    #[error("{mnemonic} operand {index} is not a valid {expected}")]
    InvalidOperand {
        mnemonic: &'static str,
        index: usize,
        expected: &'static str,
    },
    #[error("label name is not valid UTF-8")]
    InvalidLabelName,
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

struct Header {
    magic: [u8; 4],
    version: u16,
    instruction_count: u16,
}

impl Encode for Header {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.magic.encode(out);
        self.version.encode(out);
        self.instruction_count.encode(out);
    }
}

impl Decode for Header {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            magic: <[u8; 4]>::decode(input)?,
            version: u16::decode(input)?,
            instruction_count: u16::decode(input)?,
        })
    }
}

fn count_u16(what: &'static str, count: usize) -> Result<u16, EncodeError> {
    u16::try_from(count).map_err(|_| EncodeError::TooMany { what, count })
}

fn address_u16(address: u32) -> Result<u16, EncodeError> {
    u16::try_from(address).map_err(|_| EncodeError::AddressOutOfRange(address))
}

fn encode_value(value: &OperandValue, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    match value {
        OperandValue::Register(r) => (*r as u8).encode(out),
        OperandValue::Register8(r) => {
            TAG_REGISTER8.encode(out);
            (*r as u8).encode(out);
        }
        OperandValue::Segment(s) => {
            TAG_SEGMENT.encode(out);
            (*s as u8).encode(out);
        }
        OperandValue::Immediate(v) => {
            if let Ok(small) = i16::try_from(*v) {
                TAG_IMM16.encode(out);
                small.encode(out);
            } else if let Ok(wide) = i32::try_from(*v) {
                TAG_IMM32.encode(out);
                wide.encode(out);
            } else if let Ok(unsigned) = u32::try_from(*v) {
                TAG_UIMM32.encode(out);
                unsigned.encode(out);
            } else {
                return Err(EncodeError::ImmediateOutOfRange(*v));
            }
        }
        OperandValue::Label(LabelRef::Resolved(addr)) => {
            TAG_LABEL.encode(out);
            address_u16(*addr)?.encode(out);
        }
        OperandValue::Label(LabelRef::Pending(name)) => {
            return Err(EncodeError::PendingLabel(name.clone()));
        }
    }
    Ok(())
}

fn encode_operand(op: &Operand, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    if op.is_memory {
        TAG_MEMORY.encode(out);
    }
    encode_value(&op.value, out)
}

/// Serializes an assembly. Fails on pending labels and oversized sections.
pub fn encode(assembly: &Assembly) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    Header {
        magic: *MAGIC,
        version: BYTECODE_VERSION,
        instruction_count: count_u16("instructions", assembly.instructions.len())?,
    }
    .encode(&mut out);

    for instr in &assembly.instructions {
        if let Some(rep) = instr.rep {
            rep.byte().encode(&mut out);
        }
        (instr.opcode as u8).encode(&mut out);
        for op in &instr.operands {
            encode_operand(op, &mut out)?;
        }
    }

    count_u16("data bytes", assembly.data.len())?.encode(&mut out);
    for byte in &assembly.data {
        byte.value.encode(&mut out);
    }

    count_u16("labels", assembly.labels.len())?.encode(&mut out);
    for (name, addr) in &assembly.labels {
        if name.len() > u8::MAX as usize {
            return Err(EncodeError::LabelNameTooLong(name.clone()));
        }
        ShortBytes(name.as_bytes().to_vec()).encode(&mut out);
        address_u16(*addr)?.encode(&mut out);
    }
    Ok(out)
}

fn decode_value(tag: u8, input: &mut &[u8]) -> Result<OperandValue, BytecodeError> {
    let value = match tag {
        0..=TAG_REGISTER_MAX => OperandValue::Register(Register::try_from(tag).map_err(|id| {
            BytecodeError::UnknownRegister {
                kind: "register",
                id,
            }
        })?),
        TAG_IMM16 => OperandValue::Immediate(i16::decode(input)? as i64),
        TAG_IMM32 => OperandValue::Immediate(i32::decode(input)? as i64),
        TAG_UIMM32 => OperandValue::Immediate(u32::decode(input)? as i64),
        TAG_LABEL => OperandValue::Label(LabelRef::Resolved(u16::decode(input)? as u32)),
        TAG_SEGMENT => {
            let id = u8::decode(input)?;
            OperandValue::Segment(Segment::try_from(id).map_err(|id| {
                BytecodeError::UnknownRegister {
                    kind: "segment register",
                    id,
                }
            })?)
        }
        TAG_REGISTER8 => {
            let id = u8::decode(input)?;
            OperandValue::Register8(Register8::try_from(id).map_err(|id| {
                BytecodeError::UnknownRegister {
                    kind: "half register",
                    id,
                }
            })?)
        }
        other => return Err(BytecodeError::UnknownOperandTag(other)),
    };
    Ok(value)
}

fn decode_operand(input: &mut &[u8]) -> Result<Operand, BytecodeError> {
    let tag = u8::decode(input)?;
    if tag == TAG_MEMORY {
        let inner = u8::decode(input)?;
        // Memory references do not nest.
        if inner == TAG_MEMORY {
            return Err(BytecodeError::UnknownOperandTag(inner));
        }
        return Ok(Operand::memory(decode_value(inner, input)?));
    }
    Ok(Operand::new(decode_value(tag, input)?))
}

fn decode_instruction(address: u32, input: &mut &[u8]) -> Result<Instruction, BytecodeError> {
    let mut byte = u8::decode(input)?;
    let rep = RepPrefix::from_byte(byte);
    if rep.is_some() {
        byte = u8::decode(input)?;
    }
    let opcode = Opcode::try_from(byte).map_err(BytecodeError::UnknownOpcode)?;
    if rep.is_some() && !opcode.is_block() {
        return Err(BytecodeError::PrefixOnNonBlock(opcode.mnemonic()));
    }

    let kinds = opcode.operand_kinds();
    let mut operands = Vec::with_capacity(kinds.len());
    for (index, kind) in kinds.iter().enumerate() {
        let operand = decode_operand(input)?;
        if !kind.accepts(&operand) {
            return Err(BytecodeError::InvalidOperand {
                mnemonic: opcode.mnemonic(),
                index: index + 1,
                expected: kind.name(),
            });
        }
        operands.push(operand);
    }

    let instr = Instruction::new(address, opcode, operands);
    Ok(match rep {
        Some(rep) => instr.with_rep(rep),
        None => instr,
    })
}

/// Parses a bytecode image back into an [`Assembly`].
///
/// Validates the magic and version and rejects trailing bytes.
pub fn decode(mut input: &[u8]) -> Result<Assembly, BytecodeError> {
    let header = Header::decode(&mut input)?;
    if &header.magic != MAGIC {
        return Err(BytecodeError::BadMagic);
    }
    if header.version != BYTECODE_VERSION {
        return Err(BytecodeError::UnsupportedVersion(header.version));
    }

    let count = header.instruction_count as u32;
    let mut instructions = Vec::with_capacity(count as usize);
    for address in 0..count {
        instructions.push(decode_instruction(address, &mut input)?);
    }

    let data_count = u16::decode(&mut input)? as usize;
    let data = crate::types::encoding::read_bytes(&mut input, data_count)?
        .iter()
        .enumerate()
        .map(|(i, value)| DataByte {
            address: i as u32,
            value: *value,
        })
        .collect();

    let label_count = u16::decode(&mut input)?;
    let mut labels = LabelTable::new();
    let mut data_labels = LabelTable::new();
    for _ in 0..label_count {
        let ShortBytes(raw) = ShortBytes::decode(&mut input)?;
        let name = String::from_utf8(raw).map_err(|_| BytecodeError::InvalidLabelName)?;
        let address = u16::decode(&mut input)? as u32;
        if address >= count {
            data_labels.insert(name.clone(), address - count);
        }
        labels.insert(name, address);
    }

    if !input.is_empty() {
        return Err(BytecodeError::TrailingBytes(input.len()));
    }

    Ok(Assembly {
        instructions,
        data,
        labels,
        data_labels,
        errors: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::assembler::assemble;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_and_simple_instructions() {
        let asm = assemble("LOAD R0, 10\nHLT");
        let bytes = encode(&asm).unwrap();
        assert_eq!(
            bytes,
            vec![
                b'R', b'M', b'S', b'M', 1, 0, 2, 0, // header
                0x01, 0x00, 0x80, 10, 0, // LOAD R0, 10
                0x49, // HLT
                0, 0, // no data
                0, 0, // no labels
            ]
        );
    }

    #[test]
    fn operand_tags() {
        let asm = assemble(indoc! {"
            MOV AL, [R4]
            MOV DS, 100000
            LOAD R1, 0xFFFFFFFF
            REPE CMPSB
            here: JMP here
        "});
        let bytes = encode(&asm).unwrap();
        let body = &bytes[8..];
        assert_eq!(&body[..5], &[0x03, 0xC0, 0x00, 0x90, 0x04]);
        assert_eq!(&body[5..13], &[0x03, 0xB0, 0x01, 0x88, 0xA0, 0x86, 0x01, 0x00]);
        assert_eq!(&body[13..20], &[0x01, 0x01, 0x89, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&body[20..22], &[0xF3, 0x72]);
        assert_eq!(&body[22..26], &[0x40, 0xA0, 0x04, 0x00]);
    }

    #[test]
    fn decode_restores_assembly() {
        let asm = assemble(indoc! {r#"
            start: LOAD R0, [msg]
                REP STOSB
                OUT 0x3F8, R0
                JNE start
            msg: DB "ok", 0
            end:
        "#});
        assert!(asm.success());
        let decoded = decode(&encode(&asm).unwrap()).unwrap();
        assert_eq!(decoded.labels, asm.labels);
        assert_eq!(decoded.data_labels, asm.data_labels);
        assert_eq!(decoded.data, asm.data);
        for (a, b) in asm.instructions.iter().zip(&decoded.instructions) {
            assert_eq!((a.address, a.opcode, a.rep), (b.address, b.opcode, b.rep));
            assert_eq!(a.operands, b.operands);
        }
    }

    #[test]
    fn encode_rejects_pending_labels() {
        let asm = assemble("CALL sin");
        assert_eq!(
            encode(&asm).unwrap_err(),
            EncodeError::PendingLabel("sin".into())
        );
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert_eq!(decode(b"NOPE\x01\x00\x00\x00").unwrap_err(), BytecodeError::BadMagic);
        assert_eq!(
            decode(b"RMSM\x02\x00\x00\x00").unwrap_err(),
            BytecodeError::UnsupportedVersion(2)
        );
        assert_eq!(
            decode(b"RMSM\x01\x00\x01\x00\xEE").unwrap_err(),
            BytecodeError::UnknownOpcode(0xEE)
        );
        assert_eq!(
            decode(b"RMSM\x01\x00\x01\x00\x04\x70").unwrap_err(),
            BytecodeError::UnknownOperandTag(0x70)
        );
        assert_eq!(
            decode(b"RMSM\x01\x00\x01\x00\x04\xB0\x09").unwrap_err(),
            BytecodeError::UnknownRegister {
                kind: "segment register",
                id: 9
            }
        );
        assert_eq!(
            decode(b"RMSM\x01\x00\x01\x00\xF1\x10").unwrap_err(),
            BytecodeError::PrefixOnNonBlock("ADD")
        );
        assert!(matches!(
            decode(b"RMSM\x01\x00\x01\x00\x01").unwrap_err(),
            BytecodeError::Decode(DecodeError::UnexpectedEof { .. })
        ));
        assert_eq!(
            decode(b"RMSM\x01\x00\x00\x00\x00\x00\x00\x00\xFF").unwrap_err(),
            BytecodeError::TrailingBytes(1)
        );
    }

    #[test]
    fn decode_checks_operand_kinds() {
        // LOAD with an immediate destination.
        assert_eq!(
            decode(b"RMSM\x01\x00\x01\x00\x01\x80\x01\x00\x00").unwrap_err(),
            BytecodeError::InvalidOperand {
                mnemonic: "LOAD",
                index: 1,
                expected: "register or memory"
            }
        );
    }
}
