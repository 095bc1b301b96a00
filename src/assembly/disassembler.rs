//! Instruction streams back to Romasm source.
//!
//! [`disassemble`] prints one canonical line per instruction. [`disassemble_assembly`]
//! also restores label definitions, label names in operands and the data
//! section, so its output re-assembles to the same instructions, data and labels.

use crate::assembly::operand::{LabelRef, Operand, OperandValue};
use crate::assembly::program::{Assembly, Instruction};
use std::collections::BTreeMap;
use std::fmt::Write;

const INDENT: &str = "    ";
const DATA_BYTES_PER_LINE: usize = 16;

/// One canonical line per instruction.
pub fn disassemble(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for instr in instructions {
        let _ = writeln!(out, "{instr}");
    }
    out
}

/// Full listing of an assembled unit: labels, code and data.
pub fn disassemble_assembly(assembly: &Assembly) -> String {
    let count = assembly.instruction_count();

    // Every name per address, for definitions.
    let mut defs: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
    for (name, addr) in &assembly.labels {
        defs.entry(*addr).or_default().push(name);
    }
    // First name per address, for operands.
    let names: BTreeMap<u32, &str> = defs
        .iter()
        .filter_map(|(addr, list)| list.first().map(|n| (*addr, *n)))
        .collect();

    // Labels go by stream position; linked instructions keep module-local addresses.
    let mut out = String::new();
    for (index, instr) in assembly.instructions.iter().enumerate() {
        for name in defs.get(&(index as u32)).into_iter().flatten() {
            let _ = writeln!(out, "{name}:");
        }
        let _ = writeln!(out, "{INDENT}{}", format_instruction(instr, &names));
    }

    let data = assembly.data_bytes();
    let mut run: Vec<String> = Vec::new();
    for (offset, byte) in data.iter().enumerate() {
        let at_label = defs.contains_key(&(count + offset as u32));
        if (at_label || run.len() == DATA_BYTES_PER_LINE) && !run.is_empty() {
            flush_data(&mut out, &mut run);
        }
        for name in defs.get(&(count + offset as u32)).into_iter().flatten() {
            let _ = writeln!(out, "{name}:");
        }
        run.push(byte.to_string());
    }
    flush_data(&mut out, &mut run);

    // Zero-length labels at the end of the data section.
    for name in defs.get(&(count + data.len() as u32)).into_iter().flatten() {
        let _ = writeln!(out, "{name}:");
    }
    out
}

fn flush_data(out: &mut String, run: &mut Vec<String>) {
    if run.is_empty() {
        return;
    }
    let _ = writeln!(out, "{INDENT}DB {}", run.join(", "));
    run.clear();
}

fn format_instruction(instr: &Instruction, names: &BTreeMap<u32, &str>) -> String {
    let mut line = String::new();
    if let Some(rep) = instr.rep {
        let _ = write!(line, "{} ", rep.name());
    }
    line.push_str(instr.opcode.mnemonic());
    for (i, op) in instr.operands.iter().enumerate() {
        line.push_str(if i == 0 { " " } else { ", " });
        line.push_str(&format_operand(op, names));
    }
    line
}

fn format_operand(op: &Operand, names: &BTreeMap<u32, &str>) -> String {
    match &op.value {
        OperandValue::Label(LabelRef::Resolved(addr)) => match names.get(addr) {
            Some(name) if op.is_memory => format!("[{name}]"),
            Some(name) => name.to_string(),
            None => op.to_string(),
        },
        _ => op.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::assembler::assemble;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const PROGRAM: &str = indoc! {r#"
        ; copy a message and print its length
        start:
            LOAD R4, msg
            LOAD R5, 0x200
            LOAD R2, 3
            CLD
            REP MOVSB
            CALL report
            HALT
        report: LOAD R0, [len]
            PRINT R0
            RET
        msg: DB "abc"
        len: DW 3
        end:
    "#};

    #[test]
    fn plain_listing() {
        let asm = assemble("LOAD R0, 1\nREPNE SCASB\nSTORE R0, [R5]\nCALL ext");
        assert_eq!(
            disassemble(&asm.instructions),
            "LOAD R0, 1\nREPNE SCASB\nSTORE R0, [R5]\nCALL ext\n"
        );
    }

    #[test]
    fn aliases_print_canonically() {
        let asm = assemble("HALT\nJZ 0");
        assert_eq!(disassemble(&asm.instructions), "HLT\nJEQ 0\n");
    }

    #[test]
    fn full_listing_round_trips() {
        let first = assemble(PROGRAM);
        assert!(first.success(), "{:?}", first.errors);

        let text = disassemble_assembly(&first);
        let second = assemble(&text);
        assert!(second.success(), "{text}\n{:?}", second.errors);

        assert_eq!(first.labels, second.labels);
        assert_eq!(first.data_labels, second.data_labels);
        assert_eq!(first.data, second.data);
        let strip = |asm: &Assembly| -> Vec<_> {
            asm.instructions
                .iter()
                .map(|i| (i.address, i.opcode, i.rep, i.operands.clone()))
                .collect()
        };
        assert_eq!(strip(&first), strip(&second));
    }

    #[test]
    fn full_listing_layout() {
        let asm = assemble(indoc! {"
            top: JMP top
            tbl: DB 1, 2
            more: DB 3
        "});
        assert_eq!(
            disassemble_assembly(&asm),
            "top:\n    JMP top\ntbl:\n    DB 1, 2\nmore:\n    DB 3\n"
        );
    }
}
