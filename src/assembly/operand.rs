//! Decoded instruction arguments.
//!
//! An [`Operand`] pairs an [`OperandValue`] with an `is_memory` flag. The flag is
//! set when the source wrapped the argument in `[...]`: the value is then an
//! address to dereference, not the value itself.

use std::fmt;

/// One of the eight general registers.
///
/// Surface names are `R0`..`R7`. The Roman numerals `I`..`VIII` are accepted
/// as internal aliases for the same registers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
}

/// Number of general registers.
pub const REGISTER_COUNT: usize = 8;

const ROMAN: [&str; REGISTER_COUNT] = ["I", "II", "III", "IV", "V", "VI", "VII", "VIII"];

impl Register {
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::R0,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
    ];

    /// Looks up a register by surface (`R3`) or Roman (`IV`) name, ignoring case.
    pub fn from_name(name: &str) -> Option<Register> {
        let upper = name.to_ascii_uppercase();
        if let Some(digits) = upper.strip_prefix('R')
            && digits.len() == 1
            && let Ok(idx) = digits.parse::<u8>()
        {
            return Register::try_from(idx).ok();
        }
        ROMAN
            .iter()
            .position(|r| *r == upper)
            .map(|idx| Register::ALL[idx])
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Register::R0 => "R0",
            Register::R1 => "R1",
            Register::R2 => "R2",
            Register::R3 => "R3",
            Register::R4 => "R4",
            Register::R5 => "R5",
            Register::R6 => "R6",
            Register::R7 => "R7",
        }
    }

    /// Internal Roman-numeral name.
    pub const fn roman(self) -> &'static str {
        ROMAN[self as usize]
    }
}

impl TryFrom<u8> for Register {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Register::ALL.get(value as usize).copied().ok_or(value)
    }
}

/// Byte halves of `R0`..`R3`, named after their x86 counterparts.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register8 {
    AL = 0,
    AH = 1,
    BL = 2,
    BH = 3,
    CL = 4,
    CH = 5,
    DL = 6,
    DH = 7,
}

impl Register8 {
    pub const ALL: [Register8; 8] = [
        Register8::AL,
        Register8::AH,
        Register8::BL,
        Register8::BH,
        Register8::CL,
        Register8::CH,
        Register8::DL,
        Register8::DH,
    ];

    pub fn from_name(name: &str) -> Option<Register8> {
        let upper = name.to_ascii_uppercase();
        Register8::ALL.into_iter().find(|r| r.name() == upper)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Register8::AL => "AL",
            Register8::AH => "AH",
            Register8::BL => "BL",
            Register8::BH => "BH",
            Register8::CL => "CL",
            Register8::CH => "CH",
            Register8::DL => "DL",
            Register8::DH => "DH",
        }
    }

    /// The full register this half belongs to.
    pub const fn parent(self) -> Register {
        match self {
            Register8::AL | Register8::AH => Register::R0,
            Register8::BL | Register8::BH => Register::R1,
            Register8::CL | Register8::CH => Register::R2,
            Register8::DL | Register8::DH => Register::R3,
        }
    }

    /// True for the high byte (bits 8..16) of the parent register.
    pub const fn is_high(self) -> bool {
        (self as u8) & 1 == 1
    }
}

impl TryFrom<u8> for Register8 {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Register8::ALL.get(value as usize).copied().ok_or(value)
    }
}

/// Segment registers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    CS = 0,
    DS = 1,
    ES = 2,
    SS = 3,
    FS = 4,
    GS = 5,
}

impl Segment {
    pub const ALL: [Segment; 6] = [
        Segment::CS,
        Segment::DS,
        Segment::ES,
        Segment::SS,
        Segment::FS,
        Segment::GS,
    ];

    pub fn from_name(name: &str) -> Option<Segment> {
        let upper = name.to_ascii_uppercase();
        Segment::ALL.into_iter().find(|s| s.name() == upper)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Segment::CS => "CS",
            Segment::DS => "DS",
            Segment::ES => "ES",
            Segment::SS => "SS",
            Segment::FS => "FS",
            Segment::GS => "GS",
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Segment {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Segment::ALL.get(value as usize).copied().ok_or(value)
    }
}

/// A label reference. Exactly one state is authoritative at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRef {
    /// Address in the merged code/data address space.
    Resolved(u32),
    /// Name not yet known; resolved by the linker or rejected.
    Pending(String),
}

/// The payload of an operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandValue {
    Register(Register),
    Register8(Register8),
    Segment(Segment),
    Immediate(i64),
    Label(LabelRef),
}

impl OperandValue {
    /// Returns the type name for error messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            OperandValue::Register(_) => "register",
            OperandValue::Register8(_) => "8-bit register",
            OperandValue::Segment(_) => "segment register",
            OperandValue::Immediate(_) => "immediate",
            OperandValue::Label(LabelRef::Resolved(_)) => "label",
            OperandValue::Label(LabelRef::Pending(_)) => "unresolved label",
        }
    }
}

/// A decoded instruction argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub value: OperandValue,
    /// True when written as `[...]`.
    pub is_memory: bool,
}

impl Operand {
    pub const fn new(value: OperandValue) -> Self {
        Self {
            value,
            is_memory: false,
        }
    }

    pub const fn memory(value: OperandValue) -> Self {
        Self {
            value,
            is_memory: true,
        }
    }

    pub const fn register(reg: Register) -> Self {
        Self::new(OperandValue::Register(reg))
    }

    pub const fn immediate(value: i64) -> Self {
        Self::new(OperandValue::Immediate(value))
    }

    pub const fn label(address: u32) -> Self {
        Self::new(OperandValue::Label(LabelRef::Resolved(address)))
    }

    pub fn pending(name: impl Into<String>) -> Self {
        Self::new(OperandValue::Label(LabelRef::Pending(name.into())))
    }

    /// Name of a pending label, if this operand carries one.
    pub fn pending_name(&self) -> Option<&str> {
        match &self.value {
            OperandValue::Label(LabelRef::Pending(name)) => Some(name),
            _ => None,
        }
    }

    /// Statically known numeric value: immediates and resolved labels.
    pub fn constant(&self) -> Option<i64> {
        match &self.value {
            OperandValue::Immediate(v) => Some(*v),
            OperandValue::Label(LabelRef::Resolved(a)) => Some(*a as i64),
            _ => None,
        }
    }

    /// Resolved label address, if any.
    pub fn resolved_label(&self) -> Option<u32> {
        match &self.value {
            OperandValue::Label(LabelRef::Resolved(a)) => Some(*a),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_memory {
            write!(f, "[")?;
        }
        match &self.value {
            OperandValue::Register(r) => write!(f, "{}", r.name())?,
            OperandValue::Register8(r) => write!(f, "{}", r.name())?,
            OperandValue::Segment(s) => write!(f, "{}", s.name())?,
            OperandValue::Immediate(v) => write!(f, "{v}")?,
            OperandValue::Label(LabelRef::Resolved(a)) => write!(f, "{a}")?,
            OperandValue::Label(LabelRef::Pending(name)) => write!(f, "{name}")?,
        }
        if self.is_memory {
            write!(f, "]")?;
        }
        Ok(())
    }
}
