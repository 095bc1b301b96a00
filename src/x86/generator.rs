//! Lowers assembled Romasm to NASM-syntax x86 text.
//!
//! Every instruction maps to one x86 instruction or a short fixed sequence.
//! Labels are placed by stream position: a label whose address is below the
//! instruction count goes in front of that instruction, any other label in
//! front of the data byte at `address - instruction_count`. Each label is
//! written once.
//!
//! Positions, not [`Instruction::address`], decide placement, so linked
//! programs whose instructions keep module-local addresses lower correctly.
//!
//! Romasm label names are written with an `L_` prefix. NASM reserves register
//! and instruction names such as `ax` or `loop`, which are legal Romasm labels.

use super::registers::{self, X86Mode};
use crate::assembly::isa::Opcode;
use crate::assembly::operand::{LabelRef, Operand, OperandValue, Register};
use crate::assembly::program::{Assembly, DataByte, Instruction, LabelTable};
use crate::debug;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Load address of a boot sector.
pub const BOOT_ORIGIN: u16 = 0x7C00;
pub const BOOT_SECTOR_SIZE: usize = 512;
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Scratch word used by the DIV/MOD, IN and compare-immediate sequences.
const TMP: &str = "__romasm_tmp";
/// Start of the data section; unlabelled data addresses are offsets from it.
const DATA: &str = "__romasm_data";
const HANG: &str = "__romasm_hang";
const EXIT: &str = "__romasm_exit";
const PRINT_16: &str = "__romasm_print";
const PRINT_64: &str = "romasm_print";
const ENTRY_64: &str = "romasm_main";
/// Marks the first instruction when execution does not start at index 0.
const START: &str = "__romasm_entry";

/// Prefix of every emitted Romasm label.
const LABEL_PREFIX: &str = "L_";

/// Bytes per `db` line.
const DATA_RUN: usize = 16;

/// Registers a 64-bit PRINT call must preserve.
const CALLER_SAVED_64: [&str; 9] = ["rax", "rcx", "rdx", "rsi", "rdi", "r8", "r9", "r10", "r11"];

const BOOT_HEADER: &str = r#"[BITS 16]
[ORG 0x7C00]

__romasm_start:
    jmp 0x0000:__romasm_init
__romasm_init:
    cli
    xor ax, ax
    mov ds, ax
    mov es, ax
    mov ss, ax
    mov sp, 0x7C00
    sti
    cld
"#;

const BOOT_HANG: &str = r#"__romasm_hang:
    cli
    hlt
    jmp __romasm_hang
"#;

/// Prints `ax` as a signed decimal followed by CRLF through BIOS teletype.
const BOOT_PRINT: &str = r#"
__romasm_print:
    pusha
    mov bx, 10
    xor cx, cx
    test ax, ax
    jns .digits
    push ax
    mov ax, 0x0E2D
    int 0x10
    pop ax
    neg ax
.digits:
    xor dx, dx
    div bx
    push dx
    inc cx
    test ax, ax
    jnz .digits
.emit:
    pop ax
    add al, '0'
    mov ah, 0x0E
    int 0x10
    loop .emit
    mov ax, 0x0E0D
    int 0x10
    mov ax, 0x0E0A
    int 0x10
    popa
    ret
"#;

const BOOT_FOOTER: &str = r#"
    times 510-($-$$) db 0
    dw 0xAA55
"#;

const UEFI_PROLOGUE: &str = r#"section .text
romasm_main:
    push rbp
    mov rbp, rsp
    push rbx
"#;

/// Restores the frame no matter how unbalanced the program left the stack.
/// `R0` is the return value.
const UEFI_EPILOGUE: &str = r#"__romasm_exit:
    lea rsp, [rbp - 8]
    pop rbx
    pop rbp
    ret
"#;

/// Boot image does not fit in front of the signature.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum X86Error {
    #[error("boot sector code is {size} bytes, at most {max} fit before the signature")]
    BootSectorOverflow { size: usize, max: usize },
}

/// A non-fatal lowering note. `index` is the instruction's stream position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum X86Warning {
    /// A code address with no label was emitted as a raw number.
    NumericTarget { index: usize, target: u32 },
    /// An unresolved label was emitted by name.
    PendingLabel { index: usize, name: String },
    /// The opcode has no x86 counterpart and became a comment.
    NotLowered { index: usize, mnemonic: &'static str },
    /// `R7` is `sp` in 16-bit mode.
    StackPointerAlias { index: usize },
    /// x86 cannot take two memory operands here.
    MemoryToMemory { index: usize, mnemonic: &'static str },
    /// Fewer operands than the opcode takes.
    MissingOperands { index: usize, mnemonic: &'static str },
}

impl fmt::Display for X86Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X86Warning::NumericTarget { index, target } => write!(
                f,
                "instruction {index}: no label at address {target}, emitted as a number"
            ),
            X86Warning::PendingLabel { index, name } => {
                write!(f, "instruction {index}: unresolved label '{name}'")
            }
            X86Warning::NotLowered { index, mnemonic } => {
                write!(f, "instruction {index}: {mnemonic} has no x86 lowering")
            }
            X86Warning::StackPointerAlias { index } => {
                write!(f, "instruction {index}: R7 maps to sp in 16-bit mode")
            }
            X86Warning::MemoryToMemory { index, mnemonic } => {
                write!(f, "instruction {index}: {mnemonic} with two memory operands")
            }
            X86Warning::MissingOperands { index, mnemonic } => {
                write!(f, "instruction {index}: {mnemonic} is missing operands")
            }
        }
    }
}

/// Generated text plus the notes collected while lowering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAsm {
    pub text: String,
    pub warnings: Vec<X86Warning>,
}

/// Operand size of one lowered instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Byte,
    Word,
}

impl Width {
    /// Byte when a half register takes part.
    fn of(operands: &[Operand]) -> Width {
        if operands
            .iter()
            .any(|op| matches!(op.value, OperandValue::Register8(_)))
        {
            Width::Byte
        } else {
            Width::Word
        }
    }

    fn keyword(self, mode: X86Mode) -> &'static str {
        match self {
            Width::Byte => "byte",
            Width::Word => mode.word(),
        }
    }
}

fn is_register(op: &Operand, reg: Register) -> bool {
    !op.is_memory && op.value == OperandValue::Register(reg)
}

fn is_immediate(op: &Operand) -> bool {
    !op.is_memory && matches!(op.value, OperandValue::Immediate(_))
}

/// NASM name of a Romasm label.
fn symbol(name: &str) -> String {
    format!("{LABEL_PREFIX}{name}")
}

fn jcc(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Jeq => "je",
        Opcode::Jne => "jne",
        Opcode::Jlt => "jl",
        Opcode::Jgt => "jg",
        Opcode::Jle => "jle",
        Opcode::Jge => "jge",
        Opcode::Call => "call",
        _ => "jmp",
    }
}

struct Lowering<'a> {
    mode: X86Mode,
    code_len: u32,
    by_address: BTreeMap<u32, Vec<&'a str>>,
    emitted: HashSet<&'a str>,
    out: String,
    warnings: Vec<X86Warning>,
    index: usize,
    uses_tmp: bool,
    uses_print: bool,
}

impl<'a> Lowering<'a> {
    fn new(mode: X86Mode, code_len: u32, labels: &'a LabelTable) -> Self {
        let mut by_address: BTreeMap<u32, Vec<&'a str>> = BTreeMap::new();
        for (name, address) in labels {
            by_address.entry(*address).or_default().push(name);
        }
        Self {
            mode,
            code_len,
            by_address,
            emitted: HashSet::new(),
            out: String::new(),
            warnings: Vec::new(),
            index: 0,
            uses_tmp: false,
            uses_print: false,
        }
    }

    fn raw(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn asm(&mut self, line: &str) {
        self.out.push_str("    ");
        self.raw(line);
    }

    fn note(&mut self, warning: X86Warning) {
        self.warnings.push(warning);
    }

    fn has_unemitted(&self, address: u32) -> bool {
        self.by_address
            .get(&address)
            .is_some_and(|names| names.iter().any(|n| !self.emitted.contains(n)))
    }

    fn labels_at(&mut self, address: u32) {
        let Some(names) = self.by_address.get(&address) else {
            return;
        };
        for name in names.clone() {
            if self.emitted.insert(name) {
                self.raw(&format!("{}:", symbol(name)));
            }
        }
    }

    fn remaining_labels(&mut self) {
        let rest: Vec<&'a str> = self
            .by_address
            .values()
            .flatten()
            .copied()
            .filter(|name| !self.emitted.contains(name))
            .collect();
        for name in rest {
            self.emitted.insert(name);
            self.raw(&format!("{}:", symbol(name)));
        }
    }

    /// Symbolic form of a label address.
    fn address(&mut self, address: u32) -> String {
        if let Some(name) = self.by_address.get(&address).and_then(|n| n.first()) {
            return symbol(name);
        }
        if address >= self.code_len {
            return format!("{DATA}+{}", address - self.code_len);
        }
        self.note(X86Warning::NumericTarget {
            index: self.index,
            target: address,
        });
        address.to_string()
    }

    fn value(&mut self, op: &Operand, width: Width) -> String {
        let inner = match &op.value {
            OperandValue::Register(reg) => {
                if self.mode == X86Mode::Boot16 && *reg == Register::R7 {
                    self.note(X86Warning::StackPointerAlias { index: self.index });
                }
                self.mode.register(*reg).to_string()
            }
            OperandValue::Register8(half) => registers::half(*half),
            OperandValue::Segment(seg) => registers::segment(*seg),
            OperandValue::Immediate(v) => v.to_string(),
            OperandValue::Label(LabelRef::Resolved(address)) => self.address(*address),
            OperandValue::Label(LabelRef::Pending(name)) => {
                self.note(X86Warning::PendingLabel {
                    index: self.index,
                    name: name.clone(),
                });
                symbol(name)
            }
        };
        if op.is_memory {
            format!("{} [{inner}]", width.keyword(self.mode))
        } else {
            inner
        }
    }

    /// Memory form of the scratch word.
    fn tmp(&mut self) -> String {
        self.uses_tmp = true;
        format!("{} [{TMP}]", self.mode.word())
    }

    fn code(&mut self, instructions: &[Instruction], entry: u32) {
        if entry != 0 {
            self.asm(&format!("jmp {START}"));
        }
        for (index, instr) in instructions.iter().enumerate() {
            self.index = index;
            if entry != 0 && index as u32 == entry {
                self.raw(&format!("{START}:"));
            }
            self.labels_at(index as u32);
            self.lower(instr);
        }
        if entry != 0 && entry as usize >= instructions.len() {
            self.raw(&format!("{START}:"));
        }
    }

    fn lower(&mut self, instr: &Instruction) {
        if instr.operands.len() < instr.opcode.arity() {
            self.note(X86Warning::MissingOperands {
                index: self.index,
                mnemonic: instr.opcode.mnemonic(),
            });
            self.asm(&format!("; {instr} (missing operands)"));
            return;
        }
        let ops = &instr.operands;
        match instr.opcode {
            Opcode::Load | Opcode::Mov => self.lower_move(&ops[0], &ops[1]),
            Opcode::Store => self.lower_move(&ops[1], &ops[0]),
            Opcode::Push => {
                let src = self.value(&ops[0], Width::Word);
                self.asm(&format!("push {src}"));
            }
            Opcode::Pop => {
                let dst = self.value(&ops[0], Width::Word);
                self.asm(&format!("pop {dst}"));
            }
            Opcode::Add => self.binary("add", instr),
            Opcode::Sub => self.binary("sub", instr),
            Opcode::And => self.binary("and", instr),
            Opcode::Or => self.binary("or", instr),
            Opcode::Xor => self.binary("xor", instr),
            Opcode::Mul => self.lower_mul(instr),
            Opcode::Div => self.lower_div(instr, false),
            Opcode::Mod => self.lower_div(instr, true),
            Opcode::Inc => self.unary("inc", &ops[0]),
            Opcode::Dec => self.unary("dec", &ops[0]),
            Opcode::Neg => self.unary("neg", &ops[0]),
            Opcode::Not => self.unary("not", &ops[0]),
            Opcode::Shl => self.lower_shift("shl", instr),
            // Signed, like the VM.
            Opcode::Shr => self.lower_shift("sar", instr),
            Opcode::Cmp => self.lower_compare("cmp", instr),
            Opcode::Test => self.lower_compare("test", instr),
            Opcode::Jmp
            | Opcode::Jeq
            | Opcode::Jne
            | Opcode::Jlt
            | Opcode::Jgt
            | Opcode::Jle
            | Opcode::Jge
            | Opcode::Call => {
                let target = self.target(&ops[0]);
                self.asm(&format!("{} {target}", jcc(instr.opcode)));
            }
            Opcode::Ret => self.asm("ret"),
            Opcode::Hlt => match self.mode {
                X86Mode::Boot16 => self.asm(&format!("jmp {HANG}")),
                X86Mode::Uefi64 => self.asm(&format!("jmp {EXIT}")),
            },
            Opcode::Nop => self.asm("nop"),
            Opcode::Print => self.lower_print(instr),
            Opcode::Int => {
                let vector = self.value(&ops[0], Width::Byte);
                self.asm(&format!("int {vector}"));
            }
            Opcode::Iret => match self.mode {
                X86Mode::Boot16 => self.asm("iret"),
                X86Mode::Uefi64 => self.asm("iretq"),
            },
            Opcode::Cli | Opcode::Sti | Opcode::Cld | Opcode::Std => {
                self.asm(&instr.opcode.mnemonic().to_ascii_lowercase())
            }
            Opcode::In => self.lower_in(instr),
            Opcode::Out => self.lower_out(instr),
            Opcode::Movsb
            | Opcode::Movsw
            | Opcode::Cmpsb
            | Opcode::Scasb
            | Opcode::Stosb
            | Opcode::Lodsb => {
                let mnemonic = instr.opcode.mnemonic().to_ascii_lowercase();
                match instr.rep {
                    Some(rep) => self.asm(&format!("{} {mnemonic}", rep.name().to_ascii_lowercase())),
                    None => self.asm(&mnemonic),
                }
            }
            Opcode::MoveTo | Opcode::LineTo | Opcode::Stroke | Opcode::Clear => {
                self.note(X86Warning::NotLowered {
                    index: self.index,
                    mnemonic: instr.opcode.mnemonic(),
                });
                self.asm(&format!("; {instr} (canvas, not lowered)"));
            }
        }
    }

    /// Jump or call target: a label name where one exists.
    fn target(&mut self, op: &Operand) -> String {
        match (&op.value, op.is_memory) {
            (OperandValue::Immediate(v), false) => self.address(*v as u32),
            _ => self.value(op, Width::Word),
        }
    }

    fn lower_move(&mut self, dst: &Operand, src: &Operand) {
        if src.is_memory
            && !dst.is_memory
            && let OperandValue::Register(reg) = &dst.value
            && let Some(low) = registers::low_byte(*reg)
        {
            let src = self.value(src, Width::Byte);
            match self.mode {
                X86Mode::Boot16 => {
                    self.asm(&format!("mov {low}, {src}"));
                    self.asm(&format!("mov {}h, 0", &low[..1]));
                }
                X86Mode::Uefi64 => {
                    self.asm(&format!("movzx {}, {src}", self.mode.register(*reg)));
                }
            }
            return;
        }
        if src.is_memory && dst.is_memory {
            let src = self.value(src, Width::Word);
            let dst = self.value(dst, Width::Word);
            self.asm(&format!("push {src}"));
            self.asm(&format!("pop {dst}"));
            return;
        }
        let width = Width::of(&[dst.clone(), src.clone()]);
        let dst = self.value(dst, width);
        let src = self.value(src, width);
        self.asm(&format!("mov {dst}, {src}"));
    }

    fn binary(&mut self, mnemonic: &str, instr: &Instruction) {
        let (dst, src) = (&instr.operands[0], &instr.operands[1]);
        if dst.is_memory && src.is_memory {
            self.note(X86Warning::MemoryToMemory {
                index: self.index,
                mnemonic: instr.opcode.mnemonic(),
            });
        }
        let width = Width::of(&instr.operands);
        let dst = self.value(dst, width);
        let src = self.value(src, width);
        self.asm(&format!("{mnemonic} {dst}, {src}"));
    }

    fn unary(&mut self, mnemonic: &str, dst: &Operand) {
        let dst = self.value(dst, Width::of(std::slice::from_ref(dst)));
        self.asm(&format!("{mnemonic} {dst}"));
    }

    fn lower_mul(&mut self, instr: &Instruction) {
        let (dst, src) = (&instr.operands[0], &instr.operands[1]);
        if !dst.is_memory && matches!(dst.value, OperandValue::Register(_)) {
            let d = self.value(dst, Width::Word);
            let s = self.value(src, Width::Word);
            if is_immediate(src) {
                self.asm(&format!("imul {d}, {d}, {s}"));
            } else {
                self.asm(&format!("imul {d}, {s}"));
            }
            return;
        }
        // imul needs a register destination.
        let acc = self.mode.acc();
        let d = self.value(dst, Width::Word);
        let s = self.value(src, Width::Word);
        let tmp = self.tmp();
        self.asm(&format!("; {instr}"));
        self.asm(&format!("push {s}"));
        self.asm(&format!("pop {tmp}"));
        self.asm(&format!("push {acc}"));
        self.asm(&format!("mov {acc}, {d}"));
        self.asm(&format!("imul {acc}, {tmp}"));
        self.asm(&format!("mov {d}, {acc}"));
        self.asm(&format!("pop {acc}"));
    }

    fn lower_div(&mut self, instr: &Instruction, remainder: bool) {
        let (acc, data) = (self.mode.acc(), self.mode.data());
        let d = self.value(&instr.operands[0], Width::Word);
        let s = self.value(&instr.operands[1], Width::Word);
        let tmp = self.tmp();
        self.asm(&format!("; {instr}"));
        self.asm(&format!("push {s}"));
        self.asm(&format!("pop {tmp}"));
        self.asm(&format!("push {acc}"));
        self.asm(&format!("push {data}"));
        self.asm(&format!("mov {acc}, {d}"));
        self.asm(self.mode.sign_extend());
        self.asm(&format!("idiv {tmp}"));
        let result = if remainder { data } else { acc };
        self.asm(&format!("mov {tmp}, {result}"));
        self.asm(&format!("pop {data}"));
        self.asm(&format!("pop {acc}"));
        self.asm(&format!("push {tmp}"));
        self.asm(&format!("pop {d}"));
    }

    fn lower_shift(&mut self, mnemonic: &str, instr: &Instruction) {
        let (dst, src) = (&instr.operands[0], &instr.operands[1]);
        let width = Width::of(&instr.operands);
        let d = self.value(dst, width);
        if is_immediate(src) || is_register(src, Register::R2) {
            let count = if is_immediate(src) {
                self.value(src, width)
            } else {
                "cl".to_string()
            };
            self.asm(&format!("{mnemonic} {d}, {count}"));
            return;
        }
        let counter = self.mode.counter();
        let s = self.value(src, Width::Word);
        self.asm(&format!("; {instr}"));
        if is_register(dst, Register::R2) {
            // The count register is the destination: shift a copy in the accumulator.
            let acc = self.mode.acc();
            let tmp = self.tmp();
            self.asm(&format!("push {s}"));
            self.asm(&format!("pop {tmp}"));
            self.asm(&format!("push {acc}"));
            self.asm(&format!("mov {acc}, {counter}"));
            self.asm(&format!("mov {counter}, {tmp}"));
            self.asm(&format!("{mnemonic} {acc}, cl"));
            self.asm(&format!("mov {counter}, {acc}"));
            self.asm(&format!("pop {acc}"));
        } else {
            self.asm(&format!("push {counter}"));
            self.asm(&format!("mov {counter}, {s}"));
            self.asm(&format!("{mnemonic} {d}, cl"));
            self.asm(&format!("pop {counter}"));
        }
    }

    fn lower_compare(&mut self, mnemonic: &str, instr: &Instruction) {
        let (left, right) = (&instr.operands[0], &instr.operands[1]);
        let width = Width::of(&instr.operands);
        let l = if is_immediate(left) {
            // x86 has no immediate first operand.
            let value = self.value(left, width);
            let tmp = self.tmp();
            self.asm(&format!("mov {tmp}, {value}"));
            tmp
        } else {
            self.value(left, width)
        };
        if (left.is_memory || is_immediate(left)) && right.is_memory {
            self.note(X86Warning::MemoryToMemory {
                index: self.index,
                mnemonic: instr.opcode.mnemonic(),
            });
        }
        let r = self.value(right, width);
        self.asm(&format!("{mnemonic} {l}, {r}"));
    }

    fn lower_print(&mut self, instr: &Instruction) {
        self.uses_print = true;
        let s = self.value(&instr.operands[0], Width::Word);
        self.asm(&format!("; {instr}"));
        match self.mode {
            X86Mode::Boot16 => {
                self.asm("push ax");
                self.asm(&format!("mov ax, {s}"));
                self.asm(&format!("call {PRINT_16}"));
                self.asm("pop ax");
            }
            X86Mode::Uefi64 => {
                for reg in CALLER_SAVED_64 {
                    self.asm(&format!("push {reg}"));
                }
                // First argument for both SysV (rdi) and Win64 (rcx).
                self.asm(&format!("mov rdi, {s}"));
                self.asm("mov rcx, rdi");
                self.asm("sub rsp, 32");
                self.asm(&format!("call {PRINT_64}"));
                self.asm("add rsp, 32");
                for reg in CALLER_SAVED_64.iter().rev() {
                    self.asm(&format!("pop {reg}"));
                }
            }
        }
    }

    fn lower_in(&mut self, instr: &Instruction) {
        let (acc, data) = (self.mode.acc(), self.mode.data());
        let d = self.value(&instr.operands[0], Width::Word);
        let port = self.value(&instr.operands[1], Width::Word);
        let tmp = self.tmp();
        self.asm(&format!("; {instr}"));
        self.asm(&format!("push {acc}"));
        self.asm(&format!("push {data}"));
        self.asm(&format!("mov {data}, {port}"));
        self.asm("in al, dx");
        match self.mode {
            X86Mode::Boot16 => self.asm("mov ah, 0"),
            X86Mode::Uefi64 => self.asm("movzx eax, al"),
        }
        self.asm(&format!("mov {tmp}, {acc}"));
        self.asm(&format!("pop {data}"));
        self.asm(&format!("pop {acc}"));
        self.asm(&format!("push {tmp}"));
        self.asm(&format!("pop {d}"));
    }

    fn lower_out(&mut self, instr: &Instruction) {
        let (acc, data) = (self.mode.acc(), self.mode.data());
        let port = self.value(&instr.operands[0], Width::Word);
        let s = self.value(&instr.operands[1], Width::Word);
        self.asm(&format!("; {instr}"));
        self.asm(&format!("push {acc}"));
        self.asm(&format!("push {data}"));
        self.asm(&format!("push {s}"));
        self.asm(&format!("mov {data}, {port}"));
        self.asm(&format!("pop {acc}"));
        self.asm("out dx, al");
        self.asm(&format!("pop {data}"));
        self.asm(&format!("pop {acc}"));
    }

    fn flush(&mut self, run: &mut Vec<String>) {
        if !run.is_empty() {
            self.asm(&format!("db {}", run.join(", ")));
            run.clear();
        }
    }

    /// Data bytes as `db` runs, split wherever a label starts.
    fn data(&mut self, data: &[DataByte]) {
        self.raw(&format!("{DATA}:"));
        let mut run = Vec::new();
        let mut next = 0u32;
        for byte in data {
            if byte.address > next {
                self.flush(&mut run);
                self.asm(&format!("times {} db 0", byte.address - next));
            }
            let address = self.code_len + byte.address;
            if self.has_unemitted(address) {
                self.flush(&mut run);
                self.labels_at(address);
            }
            if run.len() == DATA_RUN {
                self.flush(&mut run);
            }
            run.push(byte.value.to_string());
            next = byte.address + 1;
        }
        self.flush(&mut run);
        // Zero-length labels after the last byte.
        self.remaining_labels();
        if self.uses_tmp {
            let directive = self.mode.word_directive();
            self.raw(&format!("{TMP}: {directive} 0"));
        }
    }
}

/// Lowers assembled programs to x86 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86Generator {
    mode: X86Mode,
    entry: u32,
}

impl X86Generator {
    pub fn new(mode: X86Mode) -> Self {
        Self { mode, entry: 0 }
    }

    /// Starts execution at instruction `entry`, e.g. the user code of a
    /// linked program, through a jump placed before the first instruction.
    pub fn with_entry(mut self, entry: u32) -> Self {
        self.entry = entry;
        self
    }

    pub fn mode(&self) -> X86Mode {
        self.mode
    }

    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// 16-bit boot sector at [`BOOT_ORIGIN`], padded and signed. Always 16-bit,
    /// whatever the generator's mode.
    pub fn generate_boot_sector(
        &self,
        instructions: &[Instruction],
        data: &[DataByte],
        labels: &LabelTable,
    ) -> GeneratedAsm {
        render(X86Mode::Boot16, self.entry, instructions, data, labels)
    }

    /// Output in the generator's mode.
    pub fn generate_assembly(
        &self,
        instructions: &[Instruction],
        data: &[DataByte],
        labels: &LabelTable,
    ) -> GeneratedAsm {
        render(self.mode, self.entry, instructions, data, labels)
    }

    pub fn generate(&self, assembly: &Assembly) -> GeneratedAsm {
        self.generate_assembly(&assembly.instructions, &assembly.data, &assembly.labels)
    }
}

fn render(
    mode: X86Mode,
    entry: u32,
    instructions: &[Instruction],
    data: &[DataByte],
    labels: &LabelTable,
) -> GeneratedAsm {
    let mut lowering = Lowering::new(mode, instructions.len() as u32, labels);
    lowering.code(instructions, entry);
    let code = std::mem::take(&mut lowering.out);
    lowering.data(data);
    let data_section = std::mem::take(&mut lowering.out);

    let mut text = format!("; romasm: {mode}\n");
    match mode {
        X86Mode::Boot16 => {
            text.push_str(BOOT_HEADER);
            text.push('\n');
            text.push_str(&code);
            text.push('\n');
            text.push_str(BOOT_HANG);
            if lowering.uses_print {
                text.push_str(BOOT_PRINT);
            }
            text.push('\n');
            text.push_str(&data_section);
            text.push_str(BOOT_FOOTER);
        }
        X86Mode::Uefi64 => {
            text.push_str("[BITS 64]\ndefault rel\n\n");
            text.push_str(&format!("global {ENTRY_64}\n"));
            if lowering.uses_print {
                text.push_str(&format!("extern {PRINT_64}\n"));
            }
            text.push('\n');
            text.push_str(UEFI_PROLOGUE);
            text.push('\n');
            text.push_str(&code);
            text.push('\n');
            text.push_str(UEFI_EPILOGUE);
            text.push_str("\nsection .data\n");
            text.push_str(&data_section);
        }
    }

    debug!(
        "x86 ({}): {} instruction(s), {} data byte(s), {} warning(s)",
        mode,
        instructions.len(),
        data.len(),
        lowering.warnings.len()
    );
    GeneratedAsm {
        text,
        warnings: lowering.warnings,
    }
}

/// Pads raw boot code to 510 bytes and appends the `0x55 0xAA` signature.
pub fn boot_sector_image(code: &[u8]) -> Result<[u8; BOOT_SECTOR_SIZE], X86Error> {
    let max = BOOT_SECTOR_SIZE - BOOT_SIGNATURE.len();
    if code.len() > max {
        return Err(X86Error::BootSectorOverflow {
            size: code.len(),
            max,
        });
    }
    let mut image = [0u8; BOOT_SECTOR_SIZE];
    image[..code.len()].copy_from_slice(code);
    image[max..].copy_from_slice(&BOOT_SIGNATURE);
    Ok(image)
}
