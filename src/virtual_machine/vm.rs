//! Core virtual machine implementation.
//!
//! The VM interprets decoded [`Instruction`]s one at a time. Registers are
//! 32-bit two's complement and all arithmetic wraps.
//!
//! # Control flow
//!
//! Every handler returns a [`Flow`]. Ordinary instructions return
//! `Flow::Next` and the program counter advances by one. Jumps, calls, returns
//! and interrupts return `Flow::Jump(target)` with the *true* target address, and
//! the automatic advance is skipped for that step. No handler ever adjusts a
//! target by one to compensate.
//!
//! CALL pushes its own address; RET pops `p` and resumes at `p + 1`.

mod canvas;
mod registers;
#[cfg(test)]
mod tests;

pub use canvas::{Canvas, DrawCommand, RecordingCanvas};

use crate::assembly::isa::{Opcode, RepPrefix};
use crate::assembly::operand::{LabelRef, Operand, OperandValue, Register, Register8, Segment};
use crate::assembly::program::{Assembly, DataByte, Instruction};
use crate::virtual_machine::errors::VMError;
use crate::{debug, warn};
use registers::Registers;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

/// Step budget used by [`Vm::run`] callers that have no better bound.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// Maximum number of entries on the shared call/data stack.
pub const MAX_STACK_DEPTH: usize = 4096;

/// Source index register for block operations.
const SI: Register = Register::R4;
/// Destination index register for block operations.
const DI: Register = Register::R5;
/// Count register for repeat prefixes.
const CX: Register = Register::R2;

/// Comparison flags. At most one is set, and only CMP, TEST, CMPSB and SCASB
/// change them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub equal: bool,
    pub less: bool,
    pub greater: bool,
}

impl Flags {
    fn from_ordering(ord: Ordering) -> Self {
        Self {
            equal: ord == Ordering::Equal,
            less: ord == Ordering::Less,
            greater: ord == Ordering::Greater,
        }
    }
}

/// Processor control flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuFlags {
    /// Interrupt enable (IF).
    pub interrupt: bool,
    /// Direction (DF): block operations walk downwards when set.
    pub direction: bool,
}

impl Default for CpuFlags {
    fn default() -> Self {
        Self {
            interrupt: true,
            direction: false,
        }
    }
}

/// State saved by INT and restored by IRET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InterruptFrame {
    /// Address of the INT instruction.
    pc: u32,
    flags: Flags,
    cpu: CpuFlags,
}

/// Why the VM stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// HLT executed.
    Hlt,
    /// The program counter left the program.
    EndOfProgram,
    /// RET with nothing on the stack.
    ReturnOnEmptyStack,
    /// A runtime fault; see [`Vm::last_error`].
    Fault,
}

/// Result of one [`Vm::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Running,
    Halted(HaltReason),
    Faulted(VMError),
}

/// Summary of a [`Vm::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Instructions executed during this call.
    pub steps: u64,
    /// `None` when the step budget ran out first.
    pub halt: Option<HaltReason>,
    pub error: Option<VMError>,
}

impl RunReport {
    pub fn exhausted(&self) -> bool {
        self.halt.is_none()
    }
}

/// What the program counter does after an instruction.
enum Flow {
    Next,
    Jump(u32),
    Halt(HaltReason),
}

/// Romasm virtual machine.
pub struct Vm {
    program: Rc<[Instruction]>,
    pc: u32,
    registers: Registers,
    flags: Flags,
    cpu: CpuFlags,
    /// Sparse memory; unmapped cells read as zero.
    memory: HashMap<u32, i32>,
    /// Shared by CALL/RET and PUSH/POP.
    stack: Vec<i32>,
    interrupt_frames: Vec<InterruptFrame>,
    vectors: HashMap<u8, u32>,
    ports: HashMap<u16, u8>,
    output: Vec<i32>,
    diagnostics: Vec<String>,
    halt: Option<HaltReason>,
    last_error: Option<VMError>,
    canvas: Option<Box<dyn Canvas>>,
    steps: u64,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self {
            program: Rc::from(Vec::new()),
            pc: 0,
            registers: Registers::new(),
            flags: Flags::default(),
            cpu: CpuFlags::default(),
            memory: HashMap::new(),
            stack: Vec::new(),
            interrupt_frames: Vec::new(),
            vectors: HashMap::new(),
            ports: HashMap::new(),
            output: Vec::new(),
            diagnostics: Vec::new(),
            halt: None,
            last_error: None,
            canvas: None,
            steps: 0,
        }
    }

    /// Creates a VM that drives `canvas` for the canvas opcodes.
    pub fn with_canvas(canvas: Box<dyn Canvas>) -> Self {
        let mut vm = Self::new();
        vm.canvas = Some(canvas);
        vm
    }

    pub fn set_canvas(&mut self, canvas: Option<Box<dyn Canvas>>) {
        self.canvas = canvas;
    }

    /// Clears all machine state. The canvas stays attached.
    pub fn reset(&mut self) {
        let canvas = self.canvas.take();
        *self = Self::new();
        self.canvas = canvas;
    }

    /// Installs a program and rewinds to its first instruction.
    ///
    /// Registers, memory, stack, ports and output survive, so programs can be
    /// loaded one after another against the same state.
    pub fn load_program(&mut self, instructions: Vec<Instruction>) {
        self.program = Rc::from(instructions);
        self.pc = 0;
        self.halt = None;
        self.last_error = None;
    }

    /// Writes data bytes into memory starting at `base`.
    pub fn load_data(&mut self, base: u32, data: &[DataByte]) {
        for byte in data {
            self.memory
                .insert(base.wrapping_add(byte.address), byte.value as i32);
        }
    }

    /// Loads code and places the data section right after it, matching the
    /// addresses of data labels.
    pub fn load_assembly(&mut self, assembly: &Assembly) {
        self.load_program(assembly.instructions.clone());
        self.load_data(assembly.instruction_count(), &assembly.data);
    }

    /// Routes `INT vector` to the code at `address`.
    pub fn register_interrupt(&mut self, vector: u8, address: u32) {
        self.vectors.insert(vector, address);
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Moves the program counter, e.g. to the entry of a linked user module.
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_some()
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halt
    }

    pub fn last_error(&self) -> Option<&VMError> {
        self.last_error.as_ref()
    }

    /// Values produced by PRINT, in order.
    pub fn output(&self) -> &[i32] {
        &self.output
    }

    /// Notes recorded during execution, such as unhandled interrupts.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn register(&self, reg: Register) -> i32 {
        self.registers.get(reg)
    }

    pub fn set_register(&mut self, reg: Register, value: i32) {
        self.registers.set(reg, value);
    }

    pub fn register8(&self, reg: Register8) -> u8 {
        self.registers.get8(reg)
    }

    pub fn segment(&self, seg: Segment) -> u16 {
        self.registers.segment(seg)
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn cpu_flags(&self) -> CpuFlags {
        self.cpu
    }

    pub fn memory(&self, address: u32) -> i32 {
        self.memory.get(&address).copied().unwrap_or(0)
    }

    pub fn set_memory(&mut self, address: u32, value: i32) {
        self.memory.insert(address, value);
    }

    pub fn stack(&self) -> &[i32] {
        &self.stack
    }

    pub fn interrupt_depth(&self) -> usize {
        self.interrupt_frames.len()
    }

    pub fn port(&self, port: u16) -> u8 {
        self.ports.get(&port).copied().unwrap_or(0)
    }

    /// Presets a port value, as a device would.
    pub fn set_port(&mut self, port: u16, value: u8) {
        self.ports.insert(port, value);
    }

    /// Total instructions executed since the last reset.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn stop(&mut self, reason: HaltReason) -> StepOutcome {
        self.halt = Some(reason);
        debug!("halted at {}: {:?}", self.pc, reason);
        StepOutcome::Halted(reason)
    }

    /// Executes the instruction at `pc`.
    ///
    /// Faults halt the VM and come back as [`StepOutcome::Faulted`].
    pub fn step(&mut self) -> StepOutcome {
        if let Some(reason) = self.halt {
            return StepOutcome::Halted(reason);
        }

        let program = Rc::clone(&self.program);
        let Some(instr) = program.get(self.pc as usize) else {
            return self.stop(HaltReason::EndOfProgram);
        };

        debug!("{:04} {}", self.pc, instr);
        self.steps += 1;

        match self.exec(instr) {
            Ok(Flow::Next) => {
                self.pc = self.pc.wrapping_add(1);
                StepOutcome::Running
            }
            Ok(Flow::Jump(target)) => {
                self.pc = target;
                StepOutcome::Running
            }
            Ok(Flow::Halt(reason)) => self.stop(reason),
            Err(err) => {
                warn!("fault: {err}");
                self.halt = Some(HaltReason::Fault);
                self.last_error = Some(err.clone());
                StepOutcome::Faulted(err)
            }
        }
    }

    /// Steps until the VM halts or `max_steps` instructions have executed.
    pub fn run(&mut self, max_steps: u64) -> RunReport {
        let start = self.steps;
        while self.steps - start < max_steps {
            match self.step() {
                StepOutcome::Running => {}
                StepOutcome::Halted(_) | StepOutcome::Faulted(_) => break,
            }
        }
        RunReport {
            steps: self.steps - start,
            halt: self.halt,
            error: self.last_error.clone(),
        }
    }

    fn exec(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        match instr.opcode {
            // Data movement
            Opcode::Load | Opcode::Mov => self.op_move(instr, 0, 1),
            Opcode::Store => self.op_move(instr, 1, 0),
            Opcode::Push => self.op_push(instr),
            Opcode::Pop => self.op_pop(instr),
            // Integer arithmetic
            Opcode::Add => self.op_binary(instr, i32::wrapping_add),
            Opcode::Sub => self.op_binary(instr, i32::wrapping_sub),
            Opcode::Mul => self.op_binary(instr, i32::wrapping_mul),
            Opcode::Div => self.op_div(instr),
            Opcode::Mod => self.op_mod(instr),
            Opcode::Inc => self.op_unary(instr, |a| a.wrapping_add(1)),
            Opcode::Dec => self.op_unary(instr, |a| a.wrapping_sub(1)),
            Opcode::Neg => self.op_unary(instr, i32::wrapping_neg),
            // Bitwise
            Opcode::And => self.op_binary(instr, |a, b| a & b),
            Opcode::Or => self.op_binary(instr, |a, b| a | b),
            Opcode::Xor => self.op_binary(instr, |a, b| a ^ b),
            Opcode::Not => self.op_unary(instr, |a| !a),
            Opcode::Shl => self.op_binary(instr, |a, b| a.wrapping_shl(b as u32 & 31)),
            Opcode::Shr => self.op_binary(instr, |a, b| a.wrapping_shr(b as u32 & 31)),
            // Comparison
            Opcode::Cmp => self.op_compare(instr, |a, b| a.cmp(&b)),
            Opcode::Test => self.op_compare(instr, |a, b| (a & b).cmp(&0)),
            // Control flow
            Opcode::Jmp => self.op_jump(instr, |_| true),
            Opcode::Jeq => self.op_jump(instr, |f| f.equal),
            Opcode::Jne => self.op_jump(instr, |f| !f.equal),
            Opcode::Jlt => self.op_jump(instr, |f| f.less),
            Opcode::Jgt => self.op_jump(instr, |f| f.greater),
            Opcode::Jle => self.op_jump(instr, |f| f.less || f.equal),
            Opcode::Jge => self.op_jump(instr, |f| f.greater || f.equal),
            Opcode::Call => self.op_call(instr),
            Opcode::Ret => Ok(self.op_ret()),
            Opcode::Hlt => Ok(Flow::Halt(HaltReason::Hlt)),
            Opcode::Nop => Ok(Flow::Next),
            // Output
            Opcode::Print => self.op_print(instr),
            // System
            Opcode::Int => self.op_int(instr),
            Opcode::Iret => self.op_iret(),
            Opcode::Cli => Ok(self.set_cpu(|cpu| cpu.interrupt = false)),
            Opcode::Sti => Ok(self.set_cpu(|cpu| cpu.interrupt = true)),
            Opcode::Cld => Ok(self.set_cpu(|cpu| cpu.direction = false)),
            Opcode::Std => Ok(self.set_cpu(|cpu| cpu.direction = true)),
            Opcode::In => self.op_in(instr),
            Opcode::Out => self.op_out(instr),
            // Block memory
            Opcode::Movsb
            | Opcode::Movsw
            | Opcode::Cmpsb
            | Opcode::Scasb
            | Opcode::Stosb
            | Opcode::Lodsb => self.op_block(instr),
            // Canvas
            Opcode::MoveTo | Opcode::LineTo | Opcode::Stroke | Opcode::Clear => {
                self.op_canvas(instr)
            }
        }
    }

    fn arg<'i>(&self, instr: &'i Instruction, index: usize) -> Result<&'i Operand, VMError> {
        instr.operand(index).ok_or(VMError::MissingOperand {
            mnemonic: instr.opcode.mnemonic(),
            index: index + 1,
            pc: self.pc,
        })
    }

    /// The operand's own value, before any dereference.
    fn direct(&self, op: &Operand) -> Result<i32, VMError> {
        Ok(match &op.value {
            OperandValue::Register(r) => self.registers.get(*r),
            OperandValue::Register8(r) => self.registers.get8(*r) as i32,
            OperandValue::Segment(s) => self.registers.segment(*s) as i32,
            // Unsigned immediates above i32::MAX keep their bit pattern.
            OperandValue::Immediate(v) => *v as i32,
            OperandValue::Label(LabelRef::Resolved(addr)) => *addr as i32,
            OperandValue::Label(LabelRef::Pending(name)) => {
                return Err(VMError::UnresolvedLabel {
                    name: name.clone(),
                    pc: self.pc,
                });
            }
        })
    }

    fn read(&self, op: &Operand) -> Result<i32, VMError> {
        let value = self.direct(op)?;
        if op.is_memory {
            Ok(self.memory(value as u32))
        } else {
            Ok(value)
        }
    }

    fn write(&mut self, op: &Operand, value: i32) -> Result<(), VMError> {
        if op.is_memory {
            let address = self.direct(op)? as u32;
            self.memory.insert(address, value);
            return Ok(());
        }
        match op.value {
            OperandValue::Register(r) => self.registers.set(r, value),
            OperandValue::Register8(r) => self.registers.set8(r, value as u8),
            OperandValue::Segment(s) => self.registers.set_segment(s, value as u16),
            _ => {
                return Err(VMError::NotWritable {
                    operand: op.to_string(),
                    pc: self.pc,
                });
            }
        }
        Ok(())
    }

    fn push(&mut self, value: i32) -> Result<(), VMError> {
        if self.stack.len() >= MAX_STACK_DEPTH {
            return Err(VMError::StackOverflow {
                pc: self.pc,
                depth: self.stack.len(),
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn op_move(&mut self, instr: &Instruction, dst: usize, src: usize) -> Result<Flow, VMError> {
        let value = self.read(self.arg(instr, src)?)?;
        self.write(self.arg(instr, dst)?, value)?;
        Ok(Flow::Next)
    }

    fn op_push(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let value = self.read(self.arg(instr, 0)?)?;
        self.push(value)?;
        Ok(Flow::Next)
    }

    fn op_pop(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let dst = self.arg(instr, 0)?;
        let value = self
            .stack
            .pop()
            .ok_or(VMError::StackUnderflow { pc: self.pc })?;
        self.write(dst, value)?;
        Ok(Flow::Next)
    }

    fn op_binary(
        &mut self,
        instr: &Instruction,
        f: impl Fn(i32, i32) -> i32,
    ) -> Result<Flow, VMError> {
        let dst = self.arg(instr, 0)?;
        let a = self.read(dst)?;
        let b = self.read(self.arg(instr, 1)?)?;
        self.write(dst, f(a, b))?;
        Ok(Flow::Next)
    }

    fn op_unary(&mut self, instr: &Instruction, f: impl Fn(i32) -> i32) -> Result<Flow, VMError> {
        let dst = self.arg(instr, 0)?;
        let a = self.read(dst)?;
        self.write(dst, f(a))?;
        Ok(Flow::Next)
    }

    fn op_div(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let divisor = self.read(self.arg(instr, 1)?)?;
        if divisor == 0 {
            return Err(VMError::DivisionByZero { pc: self.pc });
        }
        self.op_binary(instr, i32::wrapping_div)
    }

    fn op_mod(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let divisor = self.read(self.arg(instr, 1)?)?;
        if divisor == 0 {
            return Err(VMError::ModuloByZero { pc: self.pc });
        }
        self.op_binary(instr, i32::wrapping_rem)
    }

    fn op_compare(
        &mut self,
        instr: &Instruction,
        f: impl Fn(i32, i32) -> Ordering,
    ) -> Result<Flow, VMError> {
        let a = self.read(self.arg(instr, 0)?)?;
        let b = self.read(self.arg(instr, 1)?)?;
        self.flags = Flags::from_ordering(f(a, b));
        Ok(Flow::Next)
    }

    fn op_jump(&mut self, instr: &Instruction, taken: impl Fn(Flags) -> bool) -> Result<Flow, VMError> {
        let target = self.read(self.arg(instr, 0)?)?;
        if taken(self.flags) {
            Ok(Flow::Jump(target as u32))
        } else {
            Ok(Flow::Next)
        }
    }

    fn op_call(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let target = self.read(self.arg(instr, 0)?)?;
        self.push(self.pc as i32)?;
        Ok(Flow::Jump(target as u32))
    }

    fn op_ret(&mut self) -> Flow {
        match self.stack.pop() {
            Some(call_site) => Flow::Jump((call_site as u32).wrapping_add(1)),
            None => Flow::Halt(HaltReason::ReturnOnEmptyStack),
        }
    }

    fn op_print(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let value = self.read(self.arg(instr, 0)?)?;
        self.output.push(value);
        Ok(Flow::Next)
    }

    fn op_int(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let vector = self.read(self.arg(instr, 0)?)? as u8;
        let Some(&handler) = self.vectors.get(&vector) else {
            // Nothing to return to, so the frame is not kept.
            let note = format!("INT 0x{vector:02X} at {}: no handler", self.pc);
            warn!("{note}");
            self.diagnostics.push(note);
            return Ok(Flow::Next);
        };
        self.interrupt_frames.push(InterruptFrame {
            pc: self.pc,
            flags: self.flags,
            cpu: self.cpu,
        });
        self.cpu.interrupt = false;
        Ok(Flow::Jump(handler))
    }

    fn op_iret(&mut self) -> Result<Flow, VMError> {
        let frame = self
            .interrupt_frames
            .pop()
            .ok_or(VMError::IretOutsideInterrupt { pc: self.pc })?;
        self.flags = frame.flags;
        self.cpu = frame.cpu;
        Ok(Flow::Jump(frame.pc.wrapping_add(1)))
    }

    fn set_cpu(&mut self, f: impl FnOnce(&mut CpuFlags)) -> Flow {
        f(&mut self.cpu);
        Flow::Next
    }

    fn port_number(&self, op: &Operand) -> Result<u16, VMError> {
        let port = self.read(op)?;
        u16::try_from(port).map_err(|_| VMError::PortOutOfRange { port, pc: self.pc })
    }

    fn op_in(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let port = self.port_number(self.arg(instr, 1)?)?;
        let value = self.port(port) as i32;
        self.write(self.arg(instr, 0)?, value)?;
        Ok(Flow::Next)
    }

    fn op_out(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let port = self.port_number(self.arg(instr, 0)?)?;
        let value = self.read(self.arg(instr, 1)?)?;
        self.ports.insert(port, value as u8);
        Ok(Flow::Next)
    }

    fn byte_at(&self, address: i32) -> i32 {
        self.memory(address as u32) & 0xFF
    }

    fn advance(&mut self, reg: Register, bytes: i32) {
        let delta = if self.cpu.direction { -bytes } else { bytes };
        let value = self.registers.get(reg).wrapping_add(delta);
        self.registers.set(reg, value);
    }

    /// One iteration of a block opcode.
    fn block_once(&mut self, opcode: Opcode) {
        let si = self.registers.get(SI);
        let di = self.registers.get(DI);
        match opcode {
            Opcode::Movsb => {
                self.memory.insert(di as u32, self.byte_at(si));
                self.advance(SI, 1);
                self.advance(DI, 1);
            }
            Opcode::Movsw => {
                for k in 0..2 {
                    let byte = self.byte_at(si.wrapping_add(k));
                    self.memory.insert(di.wrapping_add(k) as u32, byte);
                }
                self.advance(SI, 2);
                self.advance(DI, 2);
            }
            Opcode::Cmpsb => {
                self.flags = Flags::from_ordering(self.byte_at(si).cmp(&self.byte_at(di)));
                self.advance(SI, 1);
                self.advance(DI, 1);
            }
            Opcode::Scasb => {
                let al = self.registers.get8(Register8::AL) as i32;
                self.flags = Flags::from_ordering(al.cmp(&self.byte_at(di)));
                self.advance(DI, 1);
            }
            Opcode::Stosb => {
                let al = self.registers.get8(Register8::AL) as i32;
                self.memory.insert(di as u32, al);
                self.advance(DI, 1);
            }
            Opcode::Lodsb => {
                let byte = self.byte_at(si) as u8;
                self.registers.set8(Register8::AL, byte);
                self.advance(SI, 1);
            }
            _ => {}
        }
    }

    /// A repeated block operation does one iteration per step and stays at the
    /// same `pc` until it finishes, so every iteration counts against the step
    /// budget. `R2` is read as an unsigned count.
    fn op_block(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let Some(rep) = instr.rep else {
            self.block_once(instr.opcode);
            return Ok(Flow::Next);
        };
        let count = self.registers.get(CX) as u32;
        if count == 0 {
            return Ok(Flow::Next);
        }
        self.block_once(instr.opcode);
        let remaining = count - 1;
        self.registers.set(CX, remaining as i32);
        let stop = match rep {
            RepPrefix::Rep => false,
            RepPrefix::Repe => !self.flags.equal,
            RepPrefix::Repne => self.flags.equal,
        };
        if stop || remaining == 0 {
            Ok(Flow::Next)
        } else {
            Ok(Flow::Jump(self.pc))
        }
    }

    fn op_canvas(&mut self, instr: &Instruction) -> Result<Flow, VMError> {
        let point = match instr.opcode {
            Opcode::MoveTo | Opcode::LineTo => Some((
                self.read(self.arg(instr, 0)?)?,
                self.read(self.arg(instr, 1)?)?,
            )),
            _ => None,
        };
        let pc = self.pc;
        let canvas = self.canvas.as_mut().ok_or(VMError::NoCanvas {
            mnemonic: instr.opcode.mnemonic(),
            pc,
        })?;
        match (instr.opcode, point) {
            (Opcode::MoveTo, Some((x, y))) => canvas.move_to(x, y),
            (Opcode::LineTo, Some((x, y))) => canvas.line_to(x, y),
            (Opcode::Stroke, _) => canvas.stroke(),
            (Opcode::Clear, _) => {
                let (width, height) = (canvas.width(), canvas.height());
                canvas.clear_rect(0, 0, width, height);
            }
            _ => {}
        }
        Ok(Flow::Next)
    }
}
