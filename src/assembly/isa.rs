//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode table and invokes a callback macro for code generation, so the
//! opcode enum and the static consistency check read the same list.
//!
//! Each entry carries:
//! - the byte used by the bytecode container,
//! - the surface mnemonic typed by the programmer,
//! - the compact internal code (`ADD` is `A`, `CALL` is `CA`),
//! - the kinds of its operands, which also fix its arity.

use crate::assembly::operand::{Operand, OperandValue};

/// Invokes a callback macro with the complete opcode definition list.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Data movement
            // =========================
            /// LOAD dst, src ; dst = src, reading memory when src is `[...]`
            Load = 0x01, "LOAD", "L" => [Dst, Src],
            /// STORE src, dst ; dst = src, writing memory when dst is `[...]`
            Store = 0x02, "STORE", "ST" => [Src, Dst],
            /// MOV dst, src ; x86-style move, also reaches half and segment registers
            Mov = 0x03, "MOV", "MV" => [Dst, Src],
            /// PUSH src ; push onto the shared stack
            Push = 0x04, "PUSH", "PU" => [Src],
            /// POP dst ; pop from the shared stack
            Pop = 0x05, "POP", "PO" => [Dst],
            // =========================
            // Integer arithmetic
            // =========================
            /// ADD dst, src ; dst = dst + src
            Add = 0x10, "ADD", "A" => [Dst, Src],
            /// SUB dst, src ; dst = dst - src
            Sub = 0x11, "SUB", "S" => [Dst, Src],
            /// MUL dst, src ; dst = dst * src
            Mul = 0x12, "MUL", "M" => [Dst, Src],
            /// DIV dst, src ; dst = dst / src (faults on zero)
            Div = 0x13, "DIV", "D" => [Dst, Src],
            /// MOD dst, src ; dst = dst % src (faults on zero)
            Mod = 0x14, "MOD", "MO" => [Dst, Src],
            /// INC dst ; dst = dst + 1
            Inc = 0x15, "INC", "I" => [Dst],
            /// DEC dst ; dst = dst - 1
            Dec = 0x16, "DEC", "DE" => [Dst],
            /// NEG dst ; dst = -dst
            Neg = 0x17, "NEG", "NG" => [Dst],
            // =========================
            // Bitwise
            // =========================
            /// AND dst, src ; dst = dst & src
            And = 0x20, "AND", "AN" => [Dst, Src],
            /// OR dst, src ; dst = dst | src
            Or = 0x21, "OR", "OR" => [Dst, Src],
            /// XOR dst, src ; dst = dst ^ src
            Xor = 0x22, "XOR", "X" => [Dst, Src],
            /// NOT dst ; dst = !dst
            Not = 0x23, "NOT", "NT" => [Dst],
            /// SHL dst, count ; dst = dst << (count & 31)
            Shl = 0x24, "SHL", "SL" => [Dst, Src],
            /// SHR dst, count ; dst = dst >> (count & 31), arithmetic
            Shr = 0x25, "SHR", "SR" => [Dst, Src],
            // =========================
            // Comparison
            // =========================
            /// CMP a, b ; set exactly one of equal/less/greater from a ? b
            Cmp = 0x30, "CMP", "C" => [Src, Src],
            /// TEST a, b ; set flags from (a & b) ? 0
            Test = 0x31, "TEST", "T" => [Src, Src],
            // =========================
            // Control flow
            // =========================
            /// JMP target ; unconditional jump
            Jmp = 0x40, "JMP", "J" => [Target],
            /// JEQ target ; jump if equal
            Jeq = 0x41, "JEQ", "JE" => [Target],
            /// JNE target ; jump if not equal
            Jne = 0x42, "JNE", "JN" => [Target],
            /// JLT target ; jump if less
            Jlt = 0x43, "JLT", "JL" => [Target],
            /// JGT target ; jump if greater
            Jgt = 0x44, "JGT", "JG" => [Target],
            /// JLE target ; jump if less or equal
            Jle = 0x45, "JLE", "JLE" => [Target],
            /// JGE target ; jump if greater or equal
            Jge = 0x46, "JGE", "JGE" => [Target],
            /// CALL target ; push pc, jump
            Call = 0x47, "CALL", "CA" => [Target],
            /// RET ; pop p, resume at p + 1 (halts on an empty stack)
            Ret = 0x48, "RET", "R" => [],
            /// HLT ; stop execution
            Hlt = 0x49, "HLT", "H" => [],
            /// NOP ; do nothing
            Nop = 0x4A, "NOP", "NP" => [],
            // =========================
            // Output
            // =========================
            /// PRINT src ; append src to the output log
            Print = 0x50, "PRINT", "P" => [Src],
            // =========================
            // System
            // =========================
            /// INT vector ; software interrupt
            Int = 0x60, "INT", "IT" => [Imm8],
            /// IRET ; return from interrupt
            Iret = 0x61, "IRET", "IR" => [],
            /// CLI ; clear the interrupt-enable flag
            Cli = 0x62, "CLI", "CI" => [],
            /// STI ; set the interrupt-enable flag
            Sti = 0x63, "STI", "SI" => [],
            /// CLD ; block ops walk upwards
            Cld = 0x64, "CLD", "CD" => [],
            /// STD ; block ops walk downwards
            Std = 0x65, "STD", "SD" => [],
            /// IN dst, port ; dst = port byte
            In = 0x66, "IN", "PI" => [Dst, Port],
            /// OUT port, src ; port byte = src & 0xFF
            Out = 0x67, "OUT", "PT" => [Port, Src],
            // =========================
            // Block memory (accept REP prefixes)
            // =========================
            /// MOVSB ; [R5] = [R4], advance both
            Movsb = 0x70, "MOVSB", "MB" => [],
            /// MOVSW ; two-byte MOVSB
            Movsw = 0x71, "MOVSW", "MW" => [],
            /// CMPSB ; compare [R4] with [R5], advance both
            Cmpsb = 0x72, "CMPSB", "CB" => [],
            /// SCASB ; compare AL with [R5], advance R5
            Scasb = 0x73, "SCASB", "SB" => [],
            /// STOSB ; [R5] = AL, advance R5
            Stosb = 0x74, "STOSB", "TB" => [],
            /// LODSB ; AL = [R4], advance R4
            Lodsb = 0x75, "LODSB", "LB" => [],
            // =========================
            // Canvas
            // =========================
            /// MOVE x, y ; canvas move_to
            MoveTo = 0x78, "MOVE", "MT" => [Src, Src],
            /// DRAW x, y ; canvas line_to
            LineTo = 0x79, "DRAW", "DR" => [Src, Src],
            /// STROKE ; canvas stroke
            Stroke = 0x7A, "STROKE", "SK" => [],
            /// CLEAR ; canvas clear_rect over the whole surface
            Clear = 0x7B, "CLEAR", "CL" => [],
        }
    };
}

/// What an operand position accepts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Writable: a register of any width, or a memory reference.
    Dst,
    /// Any readable value.
    Src,
    /// Jump target: register, immediate or label, never memory.
    Target,
    /// Immediate in `0..=255`.
    Imm8,
    /// Port number: register or immediate in `0..=0xFFFF`.
    Port,
}

impl OperandKind {
    /// Human-readable name for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            OperandKind::Dst => "register or memory",
            OperandKind::Src => "value",
            OperandKind::Target => "jump target",
            OperandKind::Imm8 => "8-bit immediate",
            OperandKind::Port => "port",
        }
    }

    /// Checks a parsed operand against this kind.
    pub fn accepts(self, operand: &Operand) -> bool {
        // `[DS]` and friends are never meaningful.
        if operand.is_memory && matches!(operand.value, OperandValue::Segment(_)) {
            return false;
        }
        match self {
            OperandKind::Dst => {
                operand.is_memory
                    || matches!(
                        operand.value,
                        OperandValue::Register(_)
                            | OperandValue::Register8(_)
                            | OperandValue::Segment(_)
                    )
            }
            OperandKind::Src => true,
            OperandKind::Target => {
                !operand.is_memory
                    && matches!(
                        operand.value,
                        OperandValue::Register(_)
                            | OperandValue::Immediate(_)
                            | OperandValue::Label(_)
                    )
            }
            OperandKind::Imm8 => {
                !operand.is_memory
                    && matches!(operand.value, OperandValue::Immediate(v) if (0..=255).contains(&v))
            }
            OperandKind::Port => {
                !operand.is_memory
                    && match operand.value {
                        OperandValue::Register(_) => true,
                        OperandValue::Immediate(v) => (0..=0xFFFF).contains(&v),
                        _ => false,
                    }
            }
        }
    }
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $byte:expr, $mnemonic:literal, $code:literal => [
                $( $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// Closed set of operations understood by every back end.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $byte,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $byte => Ok(Opcode::$name), )*
                    _ => Err(value),
                }
            }
        }

        impl Opcode {
            /// Every opcode in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Canonical assembly mnemonic.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Compact internal code.
            pub const fn code(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $code, )*
                }
            }

            /// Expected operand kinds; the length is the exact arity.
            pub const fn operand_kinds(&self) -> &'static [OperandKind] {
                match self {
                    $( Opcode::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }

            /// Looks up a canonical mnemonic (already uppercased).
            fn from_canonical(name: &str) -> Option<Opcode> {
                match name {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Looks up an internal code.
            pub fn from_code(code: &str) -> Option<Opcode> {
                match code {
                    $( $code => Some(Opcode::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

/// Alternative spellings accepted by the assembler.
const MNEMONIC_ALIASES: &[(&str, Opcode)] = &[
    ("HALT", Opcode::Hlt),
    ("JE", Opcode::Jeq),
    ("JZ", Opcode::Jeq),
    ("JNZ", Opcode::Jne),
    ("JL", Opcode::Jlt),
    ("JG", Opcode::Jgt),
    ("LINETO", Opcode::LineTo),
    ("MOVETO", Opcode::MoveTo),
];

impl Opcode {
    /// Resolves a mnemonic or alias, ignoring case.
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        let upper = name.to_ascii_uppercase();
        Opcode::from_canonical(&upper).or_else(|| {
            MNEMONIC_ALIASES
                .iter()
                .find(|(alias, _)| *alias == upper)
                .map(|(_, op)| *op)
        })
    }

    pub const fn arity(&self) -> usize {
        self.operand_kinds().len()
    }

    /// Block-memory opcodes, the only ones a repeat prefix may precede.
    pub const fn is_block(&self) -> bool {
        matches!(
            self,
            Opcode::Movsb
                | Opcode::Movsw
                | Opcode::Cmpsb
                | Opcode::Scasb
                | Opcode::Stosb
                | Opcode::Lodsb
        )
    }

    /// Jumps and calls, whose single operand is a code address.
    pub const fn is_branch(&self) -> bool {
        matches!(
            self,
            Opcode::Jmp
                | Opcode::Jeq
                | Opcode::Jne
                | Opcode::Jlt
                | Opcode::Jgt
                | Opcode::Jle
                | Opcode::Jge
                | Opcode::Call
        )
    }

    pub const fn is_canvas(&self) -> bool {
        matches!(
            self,
            Opcode::MoveTo | Opcode::LineTo | Opcode::Stroke | Opcode::Clear
        )
    }
}

/// Modifier repeating a block-memory opcode on `R2`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RepPrefix {
    /// Repeat `R2` times.
    Rep,
    /// Repeat while equal and `R2 != 0`.
    Repe,
    /// Repeat while not equal and `R2 != 0`.
    Repne,
}

impl RepPrefix {
    pub fn from_name(name: &str) -> Option<RepPrefix> {
        match name.to_ascii_uppercase().as_str() {
            "REP" => Some(RepPrefix::Rep),
            "REPE" | "REPZ" => Some(RepPrefix::Repe),
            "REPNE" | "REPNZ" => Some(RepPrefix::Repne),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            RepPrefix::Rep => "REP",
            RepPrefix::Repe => "REPE",
            RepPrefix::Repne => "REPNE",
        }
    }

    /// Prefix byte in the bytecode container.
    pub const fn byte(self) -> u8 {
        match self {
            RepPrefix::Rep => 0xF1,
            RepPrefix::Repne => 0xF2,
            RepPrefix::Repe => 0xF3,
        }
    }

    pub const fn from_byte(byte: u8) -> Option<RepPrefix> {
        match byte {
            0xF1 => Some(RepPrefix::Rep),
            0xF2 => Some(RepPrefix::Repne),
            0xF3 => Some(RepPrefix::Repe),
            _ => None,
        }
    }
}
