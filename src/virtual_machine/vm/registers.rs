use crate::assembly::operand::{REGISTER_COUNT, Register, Register8, Segment};

/// General, half and segment register file.
///
/// General registers are 32-bit two's complement. The half registers are views
/// of the low two bytes of `R0`..`R3`, so writing `AH` changes `R0` and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct Registers {
    general: [i32; REGISTER_COUNT],
    segments: [u16; 6],
}

impl Registers {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn get(&self, reg: Register) -> i32 {
        self.general[reg.index()]
    }

    pub(super) fn set(&mut self, reg: Register, value: i32) {
        self.general[reg.index()] = value;
    }

    pub(super) fn get8(&self, reg: Register8) -> u8 {
        let word = self.get(reg.parent());
        if reg.is_high() {
            (word >> 8) as u8
        } else {
            word as u8
        }
    }

    /// Replaces one byte of the parent register, leaving the others.
    pub(super) fn set8(&mut self, reg: Register8, value: u8) {
        let parent = reg.parent();
        let word = self.get(parent);
        let updated = if reg.is_high() {
            (word & !0xFF00) | ((value as i32) << 8)
        } else {
            (word & !0xFF) | value as i32
        };
        self.set(parent, updated);
    }

    pub(super) fn segment(&self, seg: Segment) -> u16 {
        self.segments[seg.index()]
    }

    pub(super) fn set_segment(&mut self, seg: Segment, value: u16) {
        self.segments[seg.index()] = value;
    }
}
