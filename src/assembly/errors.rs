use thiserror::Error;

/// What went wrong on a source line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmErrorKind {
    /// Mnemonic not in the instruction table.
    #[error("unknown instruction '{0}'")]
    UnknownMnemonic(String),
    /// Wrong number of operands for a mnemonic.
    #[error("{mnemonic} expects {expected} operand(s), got {actual}")]
    Arity {
        mnemonic: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Operand parsed but is not allowed in this position.
    #[error("{mnemonic} operand {index} must be a {expected}, got {actual}")]
    OperandKind {
        mnemonic: &'static str,
        index: usize,
        expected: &'static str,
        actual: String,
    },
    /// Token is neither a known name, a number nor a valid identifier.
    #[error("malformed operand '{0}'")]
    MalformedOperand(String),
    /// Integer literal outside the 32-bit range.
    #[error("immediate {0} does not fit in 32 bits")]
    ImmediateRange(String),
    /// Unparseable data-directive value.
    #[error("invalid {directive} value '{value}'")]
    BadData {
        directive: &'static str,
        value: String,
    },
    /// Quoted literal without its closing quote.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// Repeat prefix on a non-block mnemonic or with nothing after it.
    #[error("{prefix} cannot be applied to '{target}'")]
    RepMisuse { prefix: &'static str, target: String },
    /// Label defined more than once.
    #[error("duplicate label '{0}'")]
    DuplicateLabel(String),
    /// Label name is empty or not an identifier.
    #[error("invalid label name '{0}'")]
    InvalidLabel(String),
}

/// A collected, non-fatal assembly error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind} (in `{text}`)")]
pub struct AsmError {
    /// 1-based source line.
    pub line: usize,
    pub kind: AsmErrorKind,
    /// The offending source text, trimmed.
    pub text: String,
}

impl AsmError {
    pub fn new(line: usize, kind: AsmErrorKind, text: &str) -> Self {
        Self {
            line,
            kind,
            text: text.trim().to_string(),
        }
    }
}
