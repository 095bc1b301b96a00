//! Two-pass Romasm assembler.
//!
//! # Syntax
//!
//! ```text
//! label:                      ; a label names the next statement
//! loop: MUL R1, R0            ; or prefixes one on the same line
//!     REP MOVSB               ; repeat prefixes precede block opcodes
//! msg: DB "hi", 0x0A, 0       ; data directives: DB DW DD DQ
//! ```
//!
//! - `;` starts a comment, outside of quoted literals
//! - Mnemonics and register names are case-insensitive, labels are not
//! - Operands are separated by commas or whitespace
//! - `[X]` dereferences `X`
//! - Immediates: decimal, `0x` hex, `'c'` character literals
//!
//! Pass 1 walks every line, sizing data and numbering instructions, and assigns
//! each label to the statement that follows it. Identifiers that are not
//! register names become pending labels. Pass 2 resolves pending labels that are
//! defined in the same unit; the rest stay pending for the linker.
//!
//! Errors never abort assembly. Every line is processed and all errors are
//! collected into [`Assembly::errors`].

use crate::assembly::errors::{AsmError, AsmErrorKind};
use crate::assembly::isa::{Opcode, RepPrefix};
use crate::assembly::operand::{LabelRef, Operand, OperandValue, Register, Register8, Segment};
use crate::assembly::program::{Assembly, DataByte, Instruction, LabelTable};
use crate::{debug, info};
use std::collections::HashSet;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';

/// Smallest accepted immediate.
pub const IMMEDIATE_MIN: i64 = i32::MIN as i64;
/// Largest accepted immediate; unsigned 32-bit values are allowed for masks.
pub const IMMEDIATE_MAX: i64 = u32::MAX as i64;

/// Data-definition directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Db,
    Dw,
    Dd,
    Dq,
}

impl Directive {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_uppercase().as_str() {
            "DB" => Some(Directive::Db),
            "DW" => Some(Directive::Dw),
            "DD" => Some(Directive::Dd),
            "DQ" => Some(Directive::Dq),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Directive::Db => "DB",
            Directive::Dw => "DW",
            Directive::Dd => "DD",
            Directive::Dq => "DQ",
        }
    }

    /// Bytes emitted per value.
    const fn width(self) -> usize {
        match self {
            Directive::Db => 1,
            Directive::Dw => 2,
            Directive::Dd => 4,
            Directive::Dq => 8,
        }
    }

    /// Splits `DB 1, 2` into the directive and its argument text.
    fn split(text: &str) -> Option<(Directive, &str)> {
        let (keyword, rest) = text.split_once(char::is_whitespace)?;
        Some((Directive::from_keyword(keyword)?, rest.trim()))
    }
}

/// Label and section state accumulated while assembling one unit.
struct AsmContext {
    instructions: Vec<Instruction>,
    data: Vec<u8>,
    /// Code label name to instruction address.
    code_labels: LabelTable,
    /// Data label name to data-section offset.
    data_labels: LabelTable,
    /// Labels declared but not yet bound to a statement.
    waiting: Vec<String>,
    seen: HashSet<String>,
    errors: Vec<AsmError>,
}

impl AsmContext {
    fn new() -> Self {
        Self {
            instructions: Vec::new(),
            data: Vec::new(),
            code_labels: LabelTable::new(),
            data_labels: LabelTable::new(),
            waiting: Vec::new(),
            seen: HashSet::new(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, line: usize, kind: AsmErrorKind, raw: &str) {
        self.errors.push(AsmError::new(line, kind, raw));
    }

    fn declare_label(&mut self, line: usize, name: &str, raw: &str) {
        if !is_valid_label(name) {
            self.error(line, AsmErrorKind::InvalidLabel(name.to_string()), raw);
            return;
        }
        if !self.seen.insert(name.to_string()) {
            self.error(line, AsmErrorKind::DuplicateLabel(name.to_string()), raw);
            return;
        }
        self.waiting.push(name.to_string());
    }

    fn bind_waiting_to_code(&mut self) {
        let address = self.instructions.len() as u32;
        for name in self.waiting.drain(..) {
            self.code_labels.insert(name, address);
        }
    }

    fn bind_waiting_to_data(&mut self) {
        let offset = self.data.len() as u32;
        for name in self.waiting.drain(..) {
            self.data_labels.insert(name, offset);
        }
    }

    /// Pass 1 for one source line.
    fn line(&mut self, number: usize, raw: &str) {
        let mut text = strip_comment(raw).trim();

        while let Some((name, rest)) = split_label(text) {
            self.declare_label(number, name, raw);
            text = rest;
        }
        if text.is_empty() {
            return;
        }

        if let Some((directive, body)) = Directive::split(text) {
            // The label classification does not depend on whether the values parse.
            self.bind_waiting_to_data();
            match parse_data(directive, body) {
                Ok(bytes) => self.data.extend(bytes),
                Err(kind) => self.error(number, kind, raw),
            }
            return;
        }

        let address = self.instructions.len() as u32;
        match parse_instruction(address, text, raw) {
            Ok(instr) => {
                self.bind_waiting_to_code();
                self.instructions.push(instr);
            }
            Err(kind) => self.error(number, kind, raw),
        }
    }

    /// Merges the label tables and runs pass 2.
    fn finish(mut self) -> Assembly {
        // Trailing labels name the (empty) end of the data section.
        self.bind_waiting_to_data();

        let count = self.instructions.len() as u32;
        let mut labels = self.code_labels;
        for (name, offset) in &self.data_labels {
            labels.insert(name.clone(), count + offset);
        }

        for instr in &mut self.instructions {
            resolve_operands(instr, &labels);
        }

        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, value)| DataByte {
                address: i as u32,
                value: *value,
            })
            .collect();

        Assembly {
            instructions: self.instructions,
            data,
            labels,
            data_labels: self.data_labels,
            errors: self.errors,
        }
    }
}

/// Replaces pending label operands that name a label in `labels`.
pub(crate) fn resolve_operands(instr: &mut Instruction, labels: &LabelTable) {
    for op in &mut instr.operands {
        if let OperandValue::Label(LabelRef::Pending(name)) = &op.value
            && let Some(address) = labels.get(name)
        {
            op.value = OperandValue::Label(LabelRef::Resolved(*address));
        }
    }
}

/// Assembles Romasm source text.
pub fn assemble(source: &str) -> Assembly {
    let mut ctx = AsmContext::new();
    for (idx, raw) in source.lines().enumerate() {
        ctx.line(idx + 1, raw);
    }
    let assembly = ctx.finish();
    debug!(
        "assembled {} instruction(s), {} data byte(s), {} label(s), {} error(s)",
        assembly.instructions.len(),
        assembly.data.len(),
        assembly.labels.len(),
        assembly.errors.len()
    );
    assembly
}

/// Reads and assembles a source file.
pub fn assemble_file(path: &Path) -> std::io::Result<Assembly> {
    let source = fs::read_to_string(path)?;
    let assembly = assemble(&source);
    info!(
        "{}: {} instruction(s), {} data byte(s)",
        path.display(),
        assembly.instructions.len(),
        assembly.data.len()
    );
    Ok(assembly)
}

/// Formats a compiler-style diagnostic for one assembly error.
pub fn render_diagnostic(file: &str, source: &str, err: &AsmError) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {}", err.kind);
    let _ = writeln!(diag, " --> {file}:{}", err.line);

    if let Some(raw_line) = source.lines().nth(err.line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let column = line_text.len() - line_text.trim_start().len();
        let width = line_text.trim().len().max(1);
        let _ = writeln!(diag, "     |");
        let _ = writeln!(diag, "{:>4} | {}", err.line, line_text);
        let _ = writeln!(diag, "     | {}{}", " ".repeat(column), "^".repeat(width));
    }

    diag
}

/// Truncates `line` at the first comment character outside quotes.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == COMMENT_CHAR => return &line[..i],
            None => {}
        }
    }
    line
}

/// Splits a leading `name:` off a statement.
///
/// Returns `None` when the text before the first `:` is not a single word, so
/// that `MOV AL, ':'` is not mistaken for a label.
fn split_label(text: &str) -> Option<(&str, &str)> {
    let idx = text.find(LABEL_SUFFIX)?;
    let name = &text[..idx];
    if name
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '[' | ']' | ','))
    {
        return None;
    }
    Some((name, text[idx + 1..].trim()))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Label names must be identifiers that do not shadow a register name.
fn is_valid_label(name: &str) -> bool {
    is_identifier(name)
        && Register::from_name(name).is_none()
        && Register8::from_name(name).is_none()
        && Segment::from_name(name).is_none()
}

/// Splits a statement into tokens.
///
/// Commas and whitespace separate tokens, except inside quotes and `[...]`.
fn tokenize(text: &str) -> Result<Vec<&str>, AsmErrorKind> {
    let mut out = Vec::with_capacity(4);
    let mut start: Option<usize> = None;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            ',' | ' ' | '\t' if depth == 0 => {
                if let Some(s) = start.take() {
                    out.push(&text[s..i]);
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
                match c {
                    '"' | '\'' => quote = Some(c),
                    '[' => depth += 1,
                    ']' => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
        }
    }

    if quote.is_some() {
        return Err(AsmErrorKind::UnterminatedString);
    }
    if let Some(s) = start {
        out.push(&text[s..]);
    }
    Ok(out)
}

/// Decodes the body of a quoted literal into code points.
fn unescape(body: &str) -> Option<Vec<u32>> {
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c as u32);
            continue;
        }
        let escaped = match chars.next()? {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            _ => return None,
        };
        out.push(escaped as u32);
    }
    Some(out)
}

fn quoted_body(tok: &str, quote: char) -> Option<&str> {
    tok.strip_prefix(quote)?.strip_suffix(quote)
}

/// Parses decimal, `0x` hex or a `'c'` literal.
fn parse_number(tok: &str) -> Option<i128> {
    if let Some(body) = quoted_body(tok, '\'') {
        return match unescape(body)?.as_slice() {
            [c] => Some(*c as i128),
            _ => None,
        };
    }
    let (negative, digits) = match tok.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        i128::from_str_radix(hex, 16).ok()?
    } else {
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse::<i128>().ok()?
    };
    Some(if negative { -value } else { value })
}

fn looks_numeric(tok: &str) -> bool {
    let digits = tok.strip_prefix('-').unwrap_or(tok);
    digits.starts_with(|c: char| c.is_ascii_digit()) || tok.starts_with('\'')
}

/// Parses one operand token.
fn parse_operand(tok: &str) -> Result<Operand, AsmErrorKind> {
    let malformed = || AsmErrorKind::MalformedOperand(tok.to_string());

    let (inner, is_memory) = match tok.strip_prefix('[') {
        Some(rest) => (rest.strip_suffix(']').ok_or_else(malformed)?.trim(), true),
        None => (tok, false),
    };
    if inner.is_empty() {
        return Err(malformed());
    }

    let value = if let Some(reg) = Register::from_name(inner) {
        OperandValue::Register(reg)
    } else if let Some(reg) = Register8::from_name(inner) {
        OperandValue::Register8(reg)
    } else if let Some(seg) = Segment::from_name(inner) {
        OperandValue::Segment(seg)
    } else if let Some(number) = parse_number(inner) {
        if number < IMMEDIATE_MIN as i128 || number > IMMEDIATE_MAX as i128 {
            return Err(AsmErrorKind::ImmediateRange(inner.to_string()));
        }
        OperandValue::Immediate(number as i64)
    } else if looks_numeric(inner) {
        return Err(malformed());
    } else if is_identifier(inner) {
        // Resolved in pass 2 or by the linker.
        OperandValue::Label(LabelRef::Pending(inner.to_string()))
    } else {
        return Err(malformed());
    };

    Ok(Operand { value, is_memory })
}

/// Parses a data directive's values into little-endian bytes.
fn parse_data(directive: Directive, body: &str) -> Result<Vec<u8>, AsmErrorKind> {
    let bad = |value: &str| AsmErrorKind::BadData {
        directive: directive.name(),
        value: value.to_string(),
    };

    let tokens = tokenize(body)?;
    if tokens.is_empty() {
        return Err(bad(body));
    }

    let mut out = Vec::with_capacity(tokens.len() * directive.width());
    for tok in tokens {
        if tok.starts_with('"') {
            if directive != Directive::Db {
                return Err(bad(tok));
            }
            let body = quoted_body(tok, '"').ok_or(AsmErrorKind::UnterminatedString)?;
            let chars = unescape(body).ok_or_else(|| bad(tok))?;
            out.extend(chars.into_iter().map(|c| c as u8));
            continue;
        }
        let value = parse_number(tok).ok_or_else(|| bad(tok))?;
        // Two's complement truncation to the directive width.
        let bytes = (value as u128).to_le_bytes();
        out.extend_from_slice(&bytes[..directive.width()]);
    }
    Ok(out)
}

/// Parses one instruction statement.
fn parse_instruction(address: u32, text: &str, raw: &str) -> Result<Instruction, AsmErrorKind> {
    let tokens = tokenize(text)?;
    let Some((&first, rest)) = tokens.split_first() else {
        return Err(AsmErrorKind::MalformedOperand(text.to_string()));
    };

    let (rep, mnemonic, operand_tokens) = match RepPrefix::from_name(first) {
        Some(prefix) => {
            let Some((&name, ops)) = rest.split_first() else {
                return Err(AsmErrorKind::RepMisuse {
                    prefix: prefix.name(),
                    target: String::new(),
                });
            };
            (Some(prefix), name, ops)
        }
        None => (None, first, rest),
    };

    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| AsmErrorKind::UnknownMnemonic(mnemonic.to_ascii_uppercase()))?;

    if let Some(prefix) = rep
        && !opcode.is_block()
    {
        return Err(AsmErrorKind::RepMisuse {
            prefix: prefix.name(),
            target: mnemonic.to_ascii_uppercase(),
        });
    }

    let kinds = opcode.operand_kinds();
    if operand_tokens.len() != kinds.len() {
        return Err(AsmErrorKind::Arity {
            mnemonic: opcode.mnemonic(),
            expected: kinds.len(),
            actual: operand_tokens.len(),
        });
    }

    let mut operands = Vec::with_capacity(kinds.len());
    for (index, (tok, kind)) in operand_tokens.iter().zip(kinds).enumerate() {
        let operand = parse_operand(tok)?;
        if !kind.accepts(&operand) {
            return Err(AsmErrorKind::OperandKind {
                mnemonic: opcode.mnemonic(),
                index: index + 1,
                expected: kind.name(),
                actual: operand.to_string(),
            });
        }
        operands.push(operand);
    }

    Ok(Instruction {
        address,
        opcode,
        mnemonic: mnemonic.to_ascii_uppercase(),
        rep,
        operands,
        raw: raw.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn errors_of(src: &str) -> Vec<AsmErrorKind> {
        assemble(src).errors.into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn assembles_simple_program() {
        let asm = assemble(indoc! {"
            LOAD R0, 10
            LOAD R1, 20
            ADD R0, R1
            PRINT R0
        "});
        assert!(asm.success(), "{:?}", asm.errors);
        assert_eq!(asm.instructions.len(), 4);
        assert_eq!(asm.instructions[2].opcode, Opcode::Add);
        assert_eq!(asm.instructions[2].opcode.code(), "A");
        assert_eq!(
            asm.instructions[0].operands,
            vec![Operand::register(Register::R0), Operand::immediate(10)]
        );
        for (i, instr) in asm.instructions.iter().enumerate() {
            assert_eq!(instr.address, i as u32);
        }
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let asm = assemble(indoc! {"
            ; header comment

               ; indented comment
            NOP ; trailing comment
            LOAD AL, ';'
        "});
        assert!(asm.success(), "{:?}", asm.errors);
        assert_eq!(asm.instructions.len(), 2);
        assert_eq!(asm.instructions[1].operands[1], Operand::immediate(b';' as i64));
        assert_eq!(asm.instructions[0].raw, "NOP ; trailing comment");
    }

    #[test]
    fn forward_and_backward_labels_resolve() {
        let asm = assemble(indoc! {"
            start:
                JMP end
            loop: DEC R0
                JGT loop
            end:
                HLT
        "});
        assert!(asm.success(), "{:?}", asm.errors);
        assert_eq!(asm.labels["start"], 0);
        assert_eq!(asm.labels["loop"], 1);
        assert_eq!(asm.labels["end"], 3);
        assert_eq!(asm.instructions[0].operands[0], Operand::label(3));
        assert_eq!(asm.instructions[2].operands[0], Operand::label(1));
    }

    #[test]
    fn data_labels_live_after_code() {
        let asm = assemble(indoc! {r#"
            LOAD R0, [msg]
            HLT
            msg:
                DB "Hi", 0
            value: DW 0x1234
        "#});
        assert!(asm.success(), "{:?}", asm.errors);
        assert_eq!(asm.data_labels["msg"], 0);
        assert_eq!(asm.data_labels["value"], 3);
        assert_eq!(asm.labels["msg"], 2);
        assert_eq!(asm.labels["value"], 5);
        assert_eq!(asm.data_bytes(), vec![b'H', b'i', 0, 0x34, 0x12]);
        assert_eq!(
            asm.instructions[0].operands[1],
            Operand::memory(OperandValue::Label(LabelRef::Resolved(2)))
        );
    }

    #[test]
    fn label_address_invariant_holds() {
        let asm = assemble(indoc! {"
            a: NOP
            b: DB 1, 2
            c: NOP
            d: DD 7
            e:
        "});
        assert!(asm.success(), "{:?}", asm.errors);
        let count = asm.instruction_count();
        for name in ["a", "c"] {
            assert!(asm.labels[name] < count);
        }
        for name in ["b", "d", "e"] {
            assert!(asm.labels[name] >= count);
            assert_eq!(asm.labels[name], count + asm.data_labels[name]);
        }
        // Distinct labels, distinct addresses.
        let addresses: HashSet<u32> = asm.labels.values().copied().collect();
        assert_eq!(addresses.len(), asm.labels.len());
    }

    #[test]
    fn data_directive_widths() {
        let asm = assemble(indoc! {"
            DB 300, -1, 'A'
            DW -2
            DD 0x01020304
            DQ 0xFFFFFFFFFFFFFFFFFF
        "});
        assert!(asm.success(), "{:?}", asm.errors);
        assert_eq!(
            asm.data_bytes(),
            vec![
                44, 0xFF, b'A', // DB
                0xFE, 0xFF, // DW
                4, 3, 2, 1, // DD
                0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // DQ truncated
            ]
        );
        for (i, b) in asm.data.iter().enumerate() {
            assert_eq!(b.address, i as u32);
        }
    }

    #[test]
    fn strings_keep_commas_and_escapes() {
        let asm = assemble(r#"DB "a, b\n", 0"#);
        assert!(asm.success(), "{:?}", asm.errors);
        assert_eq!(asm.data_bytes(), b"a, b\n\0".to_vec());
    }

    #[test]
    fn unresolved_identifiers_stay_pending() {
        let asm = assemble("CALL sin\nHLT");
        assert!(asm.success());
        assert_eq!(asm.instructions[0].operands[0], Operand::pending("sin"));
    }

    #[test]
    fn roman_and_half_registers() {
        let asm = assemble("MOV IV, AH\nMOV DS, R1\nLOAD R0, [R4]");
        assert!(asm.success(), "{:?}", asm.errors);
        assert_eq!(asm.instructions[0].operands[0], Operand::register(Register::R3));
        assert_eq!(
            asm.instructions[0].operands[1].value,
            OperandValue::Register8(Register8::AH)
        );
        assert_eq!(
            asm.instructions[1].operands[0].value,
            OperandValue::Segment(Segment::DS)
        );
        assert!(asm.instructions[2].operands[1].is_memory);
    }

    #[test]
    fn aliases_keep_written_mnemonic() {
        let asm = assemble("x: JZ x\nHALT");
        assert!(asm.success());
        assert_eq!(asm.instructions[0].opcode, Opcode::Jeq);
        assert_eq!(asm.instructions[0].mnemonic, "JZ");
        assert_eq!(asm.instructions[1].opcode, Opcode::Hlt);
    }

    #[test]
    fn rep_prefixes() {
        let asm = assemble("REP MOVSB\nrepne scasb\nREPZ CMPSB");
        assert!(asm.success(), "{:?}", asm.errors);
        assert_eq!(asm.instructions[0].rep, Some(RepPrefix::Rep));
        assert_eq!(asm.instructions[1].rep, Some(RepPrefix::Repne));
        assert_eq!(asm.instructions[2].rep, Some(RepPrefix::Repe));

        assert_eq!(
            errors_of("REP ADD R0, R1"),
            vec![AsmErrorKind::RepMisuse {
                prefix: "REP",
                target: "ADD".into()
            }]
        );
        assert_eq!(
            errors_of("REPE"),
            vec![AsmErrorKind::RepMisuse {
                prefix: "REPE",
                target: String::new()
            }]
        );
    }

    #[test]
    fn errors_are_collected_with_lines() {
        let asm = assemble(indoc! {"
            FOO R0
            ADD R0
            LOAD R0, 1
            DW \"text\"
            LOAD 5, R0
        "});
        assert!(!asm.success());
        let lines: Vec<usize> = asm.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 4, 5]);
        assert_eq!(asm.errors[0].kind, AsmErrorKind::UnknownMnemonic("FOO".into()));
        assert_eq!(
            asm.errors[1].kind,
            AsmErrorKind::Arity {
                mnemonic: "ADD",
                expected: 2,
                actual: 1
            }
        );
        assert!(matches!(asm.errors[2].kind, AsmErrorKind::BadData { directive: "DW", .. }));
        assert!(matches!(asm.errors[3].kind, AsmErrorKind::OperandKind { index: 1, .. }));
        assert_eq!(asm.errors[0].text, "FOO R0");
        // The valid line still assembled.
        assert_eq!(asm.instructions.len(), 1);
    }

    #[test]
    fn operand_errors() {
        assert_eq!(
            errors_of("LOAD R0, 99999999999"),
            vec![AsmErrorKind::ImmediateRange("99999999999".into())]
        );
        assert_eq!(
            errors_of("LOAD R0, 12ab"),
            vec![AsmErrorKind::MalformedOperand("12ab".into())]
        );
        assert_eq!(
            errors_of("LOAD R0, [R1"),
            vec![AsmErrorKind::MalformedOperand("[R1".into())]
        );
        assert_eq!(errors_of("DB \"open"), vec![AsmErrorKind::UnterminatedString]);
        assert!(errors_of("INT 300").len() == 1);
        assert!(errors_of("LOAD R0, 0xFFFFFFFF").is_empty());
        assert!(errors_of("LOAD R0, -2147483648").is_empty());
    }

    #[test]
    fn label_errors() {
        assert_eq!(
            errors_of("a: NOP\na: NOP"),
            vec![AsmErrorKind::DuplicateLabel("a".into())]
        );
        assert_eq!(
            errors_of("R0: NOP"),
            vec![AsmErrorKind::InvalidLabel("R0".into())]
        );
        assert_eq!(
            errors_of("1st: NOP"),
            vec![AsmErrorKind::InvalidLabel("1st".into())]
        );
    }

    #[test]
    fn assembly_is_deterministic() {
        let src = indoc! {"
            main: CALL f
                HLT
            f: PUSH R0
                POP R0
                RET
            tbl: DB 1, 2, 3
        "};
        assert_eq!(assemble(src), assemble(src));
    }

    #[test]
    fn diagnostic_points_at_statement() {
        let src = "NOP\n    FOO R1\n";
        let asm = assemble(src);
        let diag = render_diagnostic("prog.asm", src, &asm.errors[0]);
        assert!(diag.starts_with("error: unknown instruction 'FOO'\n"));
        assert!(diag.contains(" --> prog.asm:2"));
        assert!(diag.contains("   2 |     FOO R1"));
        assert!(diag.contains("|     ^^^^^^"));
    }

    #[test]
    fn tokenizer_respects_brackets_and_quotes() {
        assert_eq!(tokenize("LOAD R0 , [ R1 ]").unwrap(), vec!["LOAD", "R0", "[ R1 ]"]);
        assert_eq!(tokenize(r#"DB "a b", 'c'"#).unwrap(), vec!["DB", r#""a b""#, "'c'"]);
        assert_eq!(tokenize("'x").unwrap_err(), AsmErrorKind::UnterminatedString);
    }
}
