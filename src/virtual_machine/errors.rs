use thiserror::Error;

/// Runtime faults. Each one halts the VM; none escapes [`step`](super::vm::Vm::step).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    /// DIV with a zero divisor.
    #[error("division by zero at {pc}")]
    DivisionByZero { pc: u32 },
    /// MOD with a zero divisor.
    #[error("modulo by zero at {pc}")]
    ModuloByZero { pc: u32 },
    /// IRET with no saved interrupt frame.
    #[error("IRET outside of an interrupt at {pc}")]
    IretOutsideInterrupt { pc: u32 },
    /// Canvas opcode executed without a drawing surface.
    #[error("{mnemonic} at {pc} requires a canvas")]
    NoCanvas { mnemonic: &'static str, pc: u32 },
    /// PUSH or CALL beyond the stack limit.
    #[error("stack overflow at {pc} (depth {depth})")]
    StackOverflow { pc: u32, depth: usize },
    /// POP on an empty stack.
    #[error("stack underflow at {pc}")]
    StackUnderflow { pc: u32 },
    /// Operand still names a label that was never linked.
    #[error("unresolved label '{name}' at {pc}")]
    UnresolvedLabel { name: String, pc: u32 },
    /// Destination operand cannot be written.
    #[error("{operand} is not writable at {pc}")]
    NotWritable { operand: String, pc: u32 },
    /// Instruction built with fewer operands than its opcode needs.
    #[error("{mnemonic} at {pc} is missing operand {index}")]
    MissingOperand {
        mnemonic: &'static str,
        index: usize,
        pc: u32,
    },
    /// Port number outside `0..=0xFFFF`.
    #[error("port {port} out of range at {pc}")]
    PortOutOfRange { port: i32, pc: u32 },
}
