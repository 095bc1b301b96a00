//! Romasm command-line driver.
//!
//! # Usage
//! ```text
//! romasm <COMMAND> <input.asm> [OPTIONS]
//! ```
//!
//! # Commands
//! - `check`: Assemble and report errors
//! - `run`: Execute in the VM
//! - `x86`: Lower to NASM-syntax x86 text
//! - `disasm`: Print the canonical disassembly
//! - `bytecode`: Write the binary bytecode container
//!
//! With `--stdlib`, every command but `check` works on the linked program and
//! starts at the first user instruction.
//!
//! # Examples
//! ```text
//! romasm check program.asm
//! romasm run program.asm --max-steps 5000
//! romasm run program.asm --stdlib lib --module math --module trig
//! romasm x86 program.asm --mode boot -o boot.asm
//! romasm x86 program.asm --stdlib lib --mode uefi -o program.s
//! romasm bytecode program.asm -o program.rmb
//! ```

use romasm::assembly::assembler::{assemble, render_diagnostic};
use romasm::assembly::bytecode;
use romasm::assembly::disassembler::disassemble_assembly;
use romasm::assembly::program::Assembly;
use romasm::linker::{DirectoryStdlib, LinkError, Linker};
use romasm::utils::log::init_from_env;
use romasm::virtual_machine::vm::{DEFAULT_MAX_STEPS, RecordingCanvas, Vm};
use romasm::x86::generator::X86Generator;
use romasm::x86::registers::X86Mode;
use romasm::{error, info, warn};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;

/// Size of the recording canvas used by `run --canvas`.
const CANVAS_WIDTH: i32 = 640;
const CANVAS_HEIGHT: i32 = 480;

/// Extension of bytecode files written without `-o`.
const BYTECODE_EXTENSION: &str = "rmb";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Check,
    Run,
    X86,
    Disasm,
    Bytecode,
}

impl Command {
    fn from_name(name: &str) -> Option<Command> {
        match name {
            "check" => Some(Command::Check),
            "run" => Some(Command::Run),
            "x86" => Some(Command::X86),
            "disasm" => Some(Command::Disasm),
            "bytecode" => Some(Command::Bytecode),
            _ => None,
        }
    }
}

struct Options {
    command: Command,
    input: String,
    output: Option<String>,
    max_steps: u64,
    stdlib: Option<String>,
    modules: Vec<String>,
    mode: X86Mode,
    canvas: bool,
}

fn main() {
    init_from_env();
    let args: Vec<String> = env::args().collect();

    let help = args.len() > 1 && (args[1] == "--help" || args[1] == "-h");
    if args.len() < 3 || help {
        print_usage(&args[0]);
        process::exit(if help { 0 } else { 1 });
    }

    let opts = parse_args(&args);

    let source = fs::read_to_string(&opts.input).unwrap_or_else(|e| {
        error!("Failed to read {}: {}", opts.input, e);
        process::exit(1)
    });

    let assembly = assemble(&source);
    if !assembly.success() {
        for err in &assembly.errors {
            eprint!("{}", render_diagnostic(&opts.input, &source, err));
        }
        error!(
            "{}: {} error(s), nothing produced",
            opts.input,
            assembly.errors.len()
        );
        process::exit(1);
    }

    if opts.command == Command::Check {
        info!(
            "{}: ok ({} instruction(s), {} data byte(s), {} label(s))",
            opts.input,
            assembly.instructions.len(),
            assembly.data.len(),
            assembly.labels.len()
        );
        return;
    }

    let (assembly, entry) = match &opts.stdlib {
        Some(dir) => {
            let linked = link(dir, &opts.modules, &assembly).unwrap_or_else(|e| {
                if let LinkError::Assembly { errors, .. } = &e {
                    for err in errors {
                        error!("{err}");
                    }
                }
                error!("Link failed: {e}");
                process::exit(1)
            });
            let entry = linked.user_code_start;
            info!(
                "Linked {} stdlib + {} user instruction(s)",
                linked.stdlib_size,
                linked.instructions.len() as u32 - linked.stdlib_size
            );
            (linked.into_assembly(), entry)
        }
        None => (assembly, 0),
    };

    match opts.command {
        Command::Check => {}
        Command::Run => run(&opts, &assembly, entry),
        Command::X86 => {
            let generator = X86Generator::new(opts.mode).with_entry(entry);
            let generated = match opts.mode {
                X86Mode::Boot16 => generator.generate_boot_sector(
                    &assembly.instructions,
                    &assembly.data,
                    &assembly.labels,
                ),
                X86Mode::Uefi64 => generator.generate(&assembly),
            };
            for warning in &generated.warnings {
                warn!("{warning}");
            }
            write_output(opts.output.as_deref(), generated.text.as_bytes());
        }
        Command::Disasm => {
            write_output(
                opts.output.as_deref(),
                disassemble_assembly(&assembly).as_bytes(),
            );
        }
        Command::Bytecode => {
            let bytes = bytecode::encode(&assembly).unwrap_or_else(|e| {
                error!("Bytecode encoding failed: {e}");
                process::exit(1)
            });
            let output = opts
                .output
                .clone()
                .unwrap_or_else(|| default_output(&opts.input, BYTECODE_EXTENSION));
            write_output(Some(&output), &bytes);
        }
    }
}

fn parse_args(args: &[String]) -> Options {
    let command = Command::from_name(&args[1]).unwrap_or_else(|| {
        error!("Unknown command: {}\n", args[1]);
        print_usage(&args[0]);
        process::exit(1)
    });

    let mut opts = Options {
        command,
        input: args[2].clone(),
        output: None,
        max_steps: DEFAULT_MAX_STEPS,
        stdlib: None,
        modules: Vec::new(),
        mode: X86Mode::Boot16,
        canvas: false,
    };

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => opts.output = Some(value(args, &mut i, k).to_string()),
            k @ "--max-steps" => {
                let raw = value(args, &mut i, k);
                opts.max_steps = raw.parse::<u64>().unwrap_or_else(|_| {
                    error!("Invalid step budget: '{raw}' is not a valid number");
                    process::exit(1)
                });
            }
            k @ "--stdlib" => opts.stdlib = Some(value(args, &mut i, k).to_string()),
            k @ "--module" => opts.modules.push(value(args, &mut i, k).to_string()),
            k @ "--mode" => {
                let raw = value(args, &mut i, k);
                opts.mode = X86Mode::from_name(raw).unwrap_or_else(|| {
                    error!("Invalid mode: '{raw}' (expected boot or uefi)");
                    process::exit(1)
                });
            }
            "--canvas" => {
                opts.canvas = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !opts.modules.is_empty() && opts.stdlib.is_none() {
        error!("--module requires --stdlib");
        process::exit(1);
    }
    opts
}

/// Returns the argument following flag `k` and moves past both.
fn value<'a>(args: &'a [String], i: &mut usize, k: &str) -> &'a str {
    *i += 1;
    if *i >= args.len() {
        error!("{k} requires an argument");
        process::exit(1);
    }
    let v = &args[*i];
    *i += 1;
    v
}

fn run(opts: &Options, program: &Assembly, entry: u32) {
    if !opts.canvas && program.instructions.iter().any(|i| i.opcode.is_canvas()) {
        warn!("Program uses canvas instructions; pass --canvas to record them");
    }
    let canvas = RecordingCanvas::new(CANVAS_WIDTH, CANVAS_HEIGHT);
    let mut vm = Vm::new();
    if opts.canvas {
        vm.set_canvas(Some(Box::new(canvas.clone())));
    }
    vm.load_assembly(program);
    vm.set_pc(entry);
    let report = vm.run(opts.max_steps);

    let mut stdout = io::stdout().lock();
    for value in vm.output() {
        let _ = writeln!(stdout, "{value}");
    }
    for command in canvas.commands() {
        let _ = writeln!(stdout, "{command}");
    }
    for note in vm.diagnostics() {
        warn!("{note}");
    }

    if let Some(e) = &report.error {
        error!("Fault after {} step(s): {e}", report.steps);
        process::exit(1);
    }
    match report.halt {
        Some(reason) => info!("Halted ({:?}) after {} step(s)", reason, report.steps),
        None => {
            warn!("Step budget of {} exhausted", opts.max_steps);
            process::exit(1);
        }
    }
}

fn link(
    dir: &str,
    modules: &[String],
    assembly: &Assembly,
) -> Result<romasm::linker::LinkedProgram, LinkError> {
    let source = if modules.is_empty() {
        DirectoryStdlib::scan(dir)?
    } else {
        DirectoryStdlib::new(dir, modules.to_vec())
    };
    Linker::new(source).link_assembly(assembly, &[])
}

fn default_output(input: &str, extension: &str) -> String {
    let p = Path::new(input);
    let stem = p.file_stem().unwrap_or_default().to_string_lossy();
    let parent = p.parent().unwrap_or(Path::new("."));
    parent
        .join(format!("{stem}.{extension}"))
        .to_string_lossy()
        .into_owned()
}

/// Writes to `path`, or to stdout without one.
fn write_output(path: Option<&str>, contents: &[u8]) {
    match path {
        Some(path) => {
            if let Err(e) = fs::write(path, contents) {
                error!("Failed to write {}: {}", path, e);
                process::exit(1);
            }
            info!("Wrote {} ({} bytes)", path, contents.len());
        }
        None => {
            if let Err(e) = io::stdout().write_all(contents) {
                error!("Failed to write output: {}", e);
                process::exit(1);
            }
        }
    }
}

const USAGE: &str = "\
Romasm toolchain

USAGE:
    {program} <COMMAND> <input.asm> [OPTIONS]

COMMANDS:
    check       Assemble and report errors
    run         Execute in the virtual machine
    x86         Lower to x86 assembly text
    disasm      Print the canonical disassembly
    bytecode    Write the bytecode container

OPTIONS:
    -o, --output <file>     Output file (stdout for x86/disasm, <input>.rmb for bytecode)
    --max-steps <n>         Step budget for run (default 1000000)
    --stdlib <dir>          Link stdlib modules from <dir> (run, x86, disasm, bytecode)
    --module <name>         Stdlib module to link, in order (repeatable; default: every .asm in <dir>)
    --canvas                Record canvas calls during run and print them
    --mode <boot|uefi>      x86 output flavour (default boot)
    -h, --help              Print this help message

ENVIRONMENT:
    ROMASM_LOG              Log threshold: debug, info, warn, error or off (default info)

EXAMPLES:
    {program} check program.asm
    {program} run program.asm --stdlib lib --module math --module trig
    {program} x86 program.asm --mode uefi -o program.s
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
