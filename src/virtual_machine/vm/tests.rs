use super::*;
use crate::assembly::assembler::assemble;
use crate::assembly::operand::Segment;
use indoc::indoc;
use pretty_assertions::assert_eq;

fn load(source: &str) -> Vm {
    let asm = assemble(source);
    assert!(asm.success(), "assembly failed: {:?}", asm.errors);
    let mut vm = Vm::new();
    vm.load_assembly(&asm);
    vm
}

fn run_vm(source: &str) -> Vm {
    let mut vm = load(source);
    let report = vm.run(DEFAULT_MAX_STEPS);
    assert!(!report.exhausted(), "program did not halt");
    vm
}

fn run_output(source: &str) -> Vec<i32> {
    run_vm(source).output().to_vec()
}

fn run_expect_err(source: &str) -> VMError {
    let mut vm = load(source);
    let report = vm.run(DEFAULT_MAX_STEPS);
    assert_eq!(report.halt, Some(HaltReason::Fault));
    report.error.expect("fault without error")
}

// ==================== Arithmetic ====================

#[test]
fn add_prints_thirty() {
    let out = run_output(indoc! {"
        LOAD R0, 10
        LOAD R1, 20
        ADD R0, R1
        PRINT R0
    "});
    assert_eq!(out, vec![30]);
}

#[test]
fn factorial_of_five() {
    let out = run_output(indoc! {"
        LOAD R0, 5
        LOAD R1, 1
        LOAD R2, 1
        loop:
            MUL R1, R0
            DEC R0
            CMP R0, R2
            JGT loop
        PRINT R1
    "});
    assert_eq!(out, vec![120]);
}

#[test]
fn arithmetic_family() {
    let out = run_output(indoc! {"
        LOAD R0, 17
        LOAD R1, 5
        MOV R2, R0
        SUB R2, R1
        PRINT R2
        MOV R2, R0
        DIV R2, R1
        PRINT R2
        MOV R2, R0
        MOD R2, R1
        PRINT R2
        MOV R2, R0
        NEG R2
        PRINT R2
        MOV R2, R0
        INC R2
        PRINT R2
        LOAD R3, -7
        DIV R3, 2
        PRINT R3
    "});
    assert_eq!(out, vec![12, 3, 2, -17, 18, -3]);
}

#[test]
fn bitwise_family() {
    let out = run_output(indoc! {"
        LOAD R0, 0x0F
        AND R0, 0x3C
        PRINT R0
        LOAD R0, 0x0F
        OR R0, 0x30
        PRINT R0
        LOAD R0, 0xFF
        XOR R0, 0x0F
        PRINT R0
        LOAD R0, 0
        NOT R0
        PRINT R0
        LOAD R0, 1
        SHL R0, 4
        PRINT R0
        LOAD R0, -16
        SHR R0, 2
        PRINT R0
    "});
    assert_eq!(out, vec![0x0C, 0x3F, 0xF0, -1, 16, -4]);
}

#[test]
fn arithmetic_wraps_at_32_bits() {
    let out = run_output(indoc! {"
        LOAD R0, 2147483647
        INC R0
        PRINT R0
        LOAD R1, -2147483648
        LOAD R2, -1
        DIV R1, R2
        PRINT R1
        LOAD R3, 0xFFFFFFFF
        PRINT R3
        LOAD R4, 1
        SHL R4, 33
        PRINT R4
    "});
    assert_eq!(out, vec![i32::MIN, i32::MIN, -1, 2]);
}

#[test]
fn division_by_zero_faults() {
    let err = run_expect_err(indoc! {"
        LOAD R0, 5
        LOAD R1, 0
        DIV R0, R1
        PRINT R0
    "});
    assert_eq!(err, VMError::DivisionByZero { pc: 2 });
}

#[test]
fn modulo_by_zero_faults() {
    let err = run_expect_err("LOAD R0, 5\nMOD R0, 0");
    assert_eq!(err, VMError::ModuloByZero { pc: 1 });
}

#[test]
fn fault_leaves_destination_untouched() {
    let mut vm = load("LOAD R0, 5\nDIV R0, 0");
    vm.run(DEFAULT_MAX_STEPS);
    assert_eq!(vm.register(Register::R0), 5);
    assert!(vm.is_halted());
    assert!(vm.output().is_empty());
}

// ==================== Flags and jumps ====================

#[test]
fn compare_sets_exactly_one_flag() {
    let mut vm = load("CMP 1, 2\nCMP 2, 2\nCMP 3, 2\nTEST 0x0F, 0xF0");
    let expected = [
        Flags { less: true, ..Flags::default() },
        Flags { equal: true, ..Flags::default() },
        Flags { greater: true, ..Flags::default() },
        Flags { equal: true, ..Flags::default() },
    ];
    for flags in expected {
        assert_eq!(vm.step(), StepOutcome::Running);
        assert_eq!(vm.flags(), flags);
    }
}

#[test]
fn conditional_jumps_follow_flags() {
    // Each case prints 1 when the jump is taken, 0 otherwise.
    let cases = [
        ("JEQ", 2, 2, 1),
        ("JEQ", 1, 2, 0),
        ("JNE", 1, 2, 1),
        ("JNE", 2, 2, 0),
        ("JLT", 1, 2, 1),
        ("JLT", 2, 1, 0),
        ("JGT", 3, 2, 1),
        ("JGT", 2, 2, 0),
        ("JLE", 2, 2, 1),
        ("JLE", 1, 2, 1),
        ("JLE", 3, 2, 0),
        ("JGE", 2, 2, 1),
        ("JGE", 3, 2, 1),
        ("JGE", 1, 2, 0),
        ("JZ", 0, 0, 1),
        ("JNZ", 0, 0, 0),
    ];
    for (mnemonic, a, b, taken) in cases {
        let src = format!(
            "CMP {a}, {b}\n{mnemonic} yes\nPRINT 0\nHLT\nyes: PRINT 1\nHLT"
        );
        assert_eq!(run_output(&src), vec![taken], "{mnemonic} {a} {b}");
    }
}

#[test]
fn jump_through_register_uses_true_address() {
    let out = run_output(indoc! {"
        LOAD R0, target
        JMP R0
        PRINT 1
        target:
        PRINT 2
    "});
    assert_eq!(out, vec![2]);
}

#[test]
fn running_off_the_end_halts() {
    let mut vm = load("NOP");
    assert_eq!(vm.step(), StepOutcome::Running);
    assert_eq!(vm.step(), StepOutcome::Halted(HaltReason::EndOfProgram));
    assert_eq!(vm.step(), StepOutcome::Halted(HaltReason::EndOfProgram));
}

#[test]
fn hlt_stops_execution() {
    let vm = run_vm("PRINT 1\nHLT\nPRINT 2");
    assert_eq!(vm.output(), &[1]);
    assert_eq!(vm.halt_reason(), Some(HaltReason::Hlt));
    assert_eq!(vm.pc(), 1);
}

#[test]
fn step_budget_bounds_infinite_loops() {
    let mut vm = load("spin: JMP spin");
    let report = vm.run(100);
    assert_eq!(report.steps, 100);
    assert!(report.exhausted());
    assert!(!vm.is_halted());
}

// ==================== Stack ====================

#[test]
fn call_resumes_after_call_site() {
    let mut vm = load(indoc! {"
        CALL fn
        PRINT 2
        HLT
        fn: RET
    "});
    assert_eq!(vm.step(), StepOutcome::Running);
    assert_eq!(vm.pc(), 3);
    assert_eq!(vm.stack(), &[0]);
    assert_eq!(vm.step(), StepOutcome::Running);
    assert_eq!(vm.pc(), 1);
    assert!(vm.stack().is_empty());
    vm.run(DEFAULT_MAX_STEPS);
    assert_eq!(vm.output(), &[2]);
}

#[test]
fn nested_calls_conserve_stack_depth() {
    let vm = run_vm(indoc! {"
        PUSH 99
        CALL outer
        POP R0
        PRINT R0
        HLT
        outer:
            CALL inner
            PRINT 1
            RET
        inner:
            PRINT 0
            RET
    "});
    assert_eq!(vm.output(), &[0, 1, 99]);
    assert!(vm.stack().is_empty());
}

#[test]
fn push_pop_share_the_call_stack() {
    let out = run_output(indoc! {"
        LOAD R0, 7
        PUSH R0
        PUSH 8
        POP R1
        POP R2
        PRINT R1
        PRINT R2
    "});
    assert_eq!(out, vec![8, 7]);
}

#[test]
fn ret_on_empty_stack_halts() {
    let vm = run_vm("PRINT 1\nRET\nPRINT 2");
    assert_eq!(vm.output(), &[1]);
    assert_eq!(vm.halt_reason(), Some(HaltReason::ReturnOnEmptyStack));
    assert!(vm.last_error().is_none());
}

#[test]
fn pop_on_empty_stack_faults() {
    assert_eq!(run_expect_err("POP R0"), VMError::StackUnderflow { pc: 0 });
}

#[test]
fn unbounded_push_overflows() {
    let err = run_expect_err("spin: PUSH R0\nJMP spin");
    assert!(matches!(
        err,
        VMError::StackOverflow { depth: MAX_STACK_DEPTH, .. }
    ));
}

// ==================== Memory and registers ====================

#[test]
fn load_and_store_memory() {
    let vm = run_vm(indoc! {"
        LOAD R0, 42
        STORE R0, [0x100]
        LOAD R1, 0x100
        LOAD R2, [R1]
        STORE R2, R3
        LOAD R4, 9
        STORE R4, [R1]
    "});
    assert_eq!(vm.register(Register::R2), 42);
    assert_eq!(vm.register(Register::R3), 42);
    assert_eq!(vm.memory(0x100), 9);
    assert_eq!(vm.memory(0x200), 0);
}

#[test]
fn data_labels_address_the_data_section() {
    let vm = run_vm(indoc! {r#"
        LOAD R0, [msg]
        LOAD R1, msg
        INC R1
        LOAD R2, [R1]
        HLT
        msg: DB "Hi"
    "#});
    assert_eq!(vm.register(Register::R0), b'H' as i32);
    assert_eq!(vm.register(Register::R1), 6);
    assert_eq!(vm.register(Register::R2), b'i' as i32);
}

#[test]
fn half_and_segment_registers() {
    let vm = run_vm(indoc! {"
        MOV AL, 0x12
        MOV AH, 0x34
        MOV DS, 0x07C0
        MOV R1, DS
        MOV BL, 0x1FF
    "});
    assert_eq!(vm.register(Register::R0), 0x3412);
    assert_eq!(vm.register8(Register8::AH), 0x34);
    assert_eq!(vm.segment(Segment::DS), 0x07C0);
    assert_eq!(vm.register(Register::R1), 0x07C0);
    assert_eq!(vm.register8(Register8::BL), 0xFF);
}

#[test]
fn roman_register_names_alias_surface_names() {
    let vm = run_vm("LOAD I, 3\nLOAD VIII, 4\nADD R0, R7");
    assert_eq!(vm.register(Register::R0), 7);
}

#[test]
fn load_program_keeps_state() {
    let mut vm = run_vm("LOAD R0, 11\nSTORE R0, [5]\nPRINT R0");
    vm.load_program(assemble("ADD R0, [5]\nPRINT R0").instructions);
    assert_eq!(vm.pc(), 0);
    assert!(!vm.is_halted());
    vm.run(DEFAULT_MAX_STEPS);
    assert_eq!(vm.output(), &[11, 22]);
}

#[test]
fn reset_clears_everything() {
    let mut vm = run_vm("LOAD R0, 1\nPUSH R0\nPRINT R0\nSTORE R0, [3]");
    vm.reset();
    assert_eq!(vm.register(Register::R0), 0);
    assert!(vm.stack().is_empty());
    assert!(vm.output().is_empty());
    assert_eq!(vm.memory(3), 0);
    assert_eq!(vm.step(), StepOutcome::Halted(HaltReason::EndOfProgram));
}

#[test]
fn unresolved_label_faults() {
    let err = run_expect_err("CALL sin");
    assert_eq!(
        err,
        VMError::UnresolvedLabel {
            name: "sin".into(),
            pc: 0
        }
    );
}

#[test]
fn hand_built_instructions_are_checked() {
    let mut vm = Vm::new();
    vm.load_program(vec![Instruction::new(
        0,
        Opcode::Load,
        vec![Operand::immediate(1), Operand::immediate(2)],
    )]);
    assert!(matches!(vm.step(), StepOutcome::Faulted(VMError::NotWritable { .. })));

    vm.load_program(vec![Instruction::new(0, Opcode::Add, vec![])]);
    assert_eq!(
        vm.step(),
        StepOutcome::Faulted(VMError::MissingOperand {
            mnemonic: "ADD",
            index: 1,
            pc: 0
        })
    );
}

// ==================== Interrupts ====================

#[test]
fn interrupt_runs_handler_and_returns() {
    let asm = assemble(indoc! {"
        CMP 1, 2
        INT 0x21
        JLT after
        PRINT 0
        after:
        PRINT 2
        HLT
        handler:
            PRINT 1
            CMP 5, 5
            IRET
    "});
    assert!(asm.success());
    let mut vm = Vm::new();
    vm.load_assembly(&asm);
    vm.register_interrupt(0x21, asm.labels["handler"]);

    vm.step();
    vm.step();
    assert_eq!(vm.interrupt_depth(), 1);
    assert!(!vm.cpu_flags().interrupt);

    vm.run(DEFAULT_MAX_STEPS);
    // Flags from before the INT are restored, so JLT is taken.
    assert_eq!(vm.output(), &[1, 2]);
    assert_eq!(vm.interrupt_depth(), 0);
    assert!(vm.cpu_flags().interrupt);
}

#[test]
fn unhandled_interrupt_is_logged_and_skipped() {
    let vm = run_vm("INT 0x10\nPRINT 1");
    assert_eq!(vm.output(), &[1]);
    assert_eq!(vm.interrupt_depth(), 0);
    assert_eq!(vm.diagnostics(), &["INT 0x10 at 0: no handler".to_string()]);
}

#[test]
fn iret_outside_interrupt_faults() {
    assert_eq!(
        run_expect_err("NOP\nIRET"),
        VMError::IretOutsideInterrupt { pc: 1 }
    );
}

#[test]
fn cpu_flag_instructions() {
    let mut vm = load("CLI\nSTD\nSTI\nCLD");
    vm.step();
    vm.step();
    assert_eq!(
        vm.cpu_flags(),
        CpuFlags {
            interrupt: false,
            direction: true
        }
    );
    vm.step();
    vm.step();
    assert_eq!(vm.cpu_flags(), CpuFlags::default());
}

// ==================== Ports ====================

#[test]
fn ports_are_byte_masked() {
    let mut vm = load(indoc! {"
        OUT 0x3F8, 0x141
        IN R1, 0x3F8
        LOAD R2, 0x60
        IN AL, R2
    "});
    vm.set_port(0x60, 0xAA);
    vm.run(DEFAULT_MAX_STEPS);
    assert_eq!(vm.port(0x3F8), 0x41);
    assert_eq!(vm.register(Register::R1), 0x41);
    assert_eq!(vm.register8(Register8::AL), 0xAA);
}

#[test]
fn port_out_of_range_faults() {
    assert_eq!(
        run_expect_err("LOAD R0, -1\nIN R1, R0"),
        VMError::PortOutOfRange { port: -1, pc: 1 }
    );
}

// ==================== Block memory ====================

#[test]
fn rep_movsb_copies_forward() {
    let vm = run_vm(indoc! {r#"
        LOAD R4, src
        LOAD R5, 0x100
        LOAD R2, 3
        CLD
        REP MOVSB
        HLT
        src: DB "abc"
    "#});
    assert_eq!(
        (0x100..0x103).map(|a| vm.memory(a)).collect::<Vec<_>>(),
        vec![b'a' as i32, b'b' as i32, b'c' as i32]
    );
    assert_eq!(vm.register(Register::R2), 0);
    assert_eq!(vm.register(Register::R5), 0x103);
}

#[test]
fn std_walks_backwards() {
    let vm = run_vm(indoc! {"
        LOAD R5, 0x10
        LOAD AL, 7
        LOAD R2, 3
        STD
        REP STOSB
    "});
    assert_eq!(vm.memory(0x10), 7);
    assert_eq!(vm.memory(0x0F), 7);
    assert_eq!(vm.memory(0x0E), 7);
    assert_eq!(vm.memory(0x0D), 0);
    assert_eq!(vm.register(Register::R5), 0x0D);
}

#[test]
fn repne_scasb_finds_byte() {
    let vm = run_vm(indoc! {r#"
        LOAD R5, text
        LOAD AL, 'l'
        LOAD R2, 10
        REPNE SCASB
        HLT
        text: DB "hello"
    "#});
    // Stops after matching the 'l' at index 2.
    assert!(vm.flags().equal);
    assert_eq!(vm.register(Register::R2), 7);
}

#[test]
fn repe_cmpsb_stops_at_difference() {
    let vm = run_vm(indoc! {r#"
        LOAD R4, a
        LOAD R5, b
        LOAD R2, 4
        REPE CMPSB
        HLT
        a: DB "abcd"
        b: DB "abxd"
    "#});
    assert!(vm.flags().less);
    assert_eq!(vm.register(Register::R2), 1);
}

#[test]
fn single_block_ops() {
    let vm = run_vm(indoc! {"
        STORE 0x1234, [0x20]
        STORE 0x56, [0x21]
        LOAD R4, 0x20
        LODSB
        LOAD R5, 0x30
        LOAD R4, 0x20
        MOVSW
    "});
    assert_eq!(vm.register8(Register8::AL), 0x34);
    assert_eq!(vm.memory(0x30), 0x34);
    assert_eq!(vm.memory(0x31), 0x56);
    assert_eq!(vm.register(Register::R4), 0x22);
    assert_eq!(vm.register(Register::R5), 0x32);
}

#[test]
fn rep_with_zero_count_does_nothing() {
    let vm = run_vm("LOAD R5, 4\nLOAD AL, 1\nREP STOSB");
    assert_eq!(vm.memory(4), 0);
    assert_eq!(vm.register(Register::R5), 4);
}

#[test]
fn rep_iterations_count_against_step_budget() {
    let mut vm = load(indoc! {"
        LOAD R2, -1
        LOAD R5, 0
        REP STOSB
        HLT
    "});
    let report = vm.run(5);
    assert_eq!(report.steps, 5);
    assert!(report.exhausted());
    assert_eq!(vm.pc(), 2);
    // Three iterations ran, the count is unsigned.
    assert_eq!(vm.register(Register::R5), 3);
    assert_eq!(vm.register(Register::R2) as u32, u32::MAX - 3);
}

#[test]
fn rep_takes_one_step_per_iteration() {
    let mut vm = load("LOAD R2, 3\nREP STOSB\nHLT");
    let report = vm.run(DEFAULT_MAX_STEPS);
    assert_eq!(report.halt, Some(HaltReason::Hlt));
    assert_eq!(report.steps, 5);
    assert_eq!(vm.register(Register::R2), 0);
}

// ==================== Canvas ====================

#[test]
fn canvas_ops_without_canvas_fault() {
    assert_eq!(
        run_expect_err("STROKE"),
        VMError::NoCanvas {
            mnemonic: "STROKE",
            pc: 0
        }
    );
}

#[test]
fn canvas_ops_drive_the_surface() {
    let canvas = RecordingCanvas::new(320, 200);
    let mut vm = Vm::with_canvas(Box::new(canvas.clone()));
    vm.load_assembly(&assemble(indoc! {"
        CLEAR
        LOAD R0, 10
        MOVE R0, 20
        DRAW 30, 40
        STROKE
    "}));
    vm.run(DEFAULT_MAX_STEPS);
    assert_eq!(
        canvas.commands(),
        vec![
            DrawCommand::ClearRect {
                x: 0,
                y: 0,
                width: 320,
                height: 200
            },
            DrawCommand::MoveTo(10, 20),
            DrawCommand::LineTo(30, 40),
            DrawCommand::Stroke,
        ]
    );
}

#[test]
fn reset_keeps_canvas() {
    let canvas = RecordingCanvas::new(1, 1);
    let mut vm = Vm::with_canvas(Box::new(canvas.clone()));
    vm.reset();
    vm.load_assembly(&assemble("STROKE"));
    vm.run(DEFAULT_MAX_STEPS);
    assert_eq!(canvas.commands(), vec![DrawCommand::Stroke]);
}
