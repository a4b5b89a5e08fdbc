//! regvm - CLI Entry Point
//!
//! Commands:
//! - `regvm run <image>` - Run a program image on the console
//! - `regvm debug <image>` - Interactive debugger
//! - `regvm disasm <image>` - Disassemble an image
//! - `regvm test` - Built-in self-test

use clap::{Parser, Subcommand};
use regvm::log::{self, Level};
use regvm::program::disasm::disassemble_word;
use regvm::{error, info, warn};
use regvm::{load_image, ConsoleIo, Cpu, CpuError, FlatMemory, HostConfig, Step, Word};
use std::process::exit;
use std::sync::atomic::Ordering;

#[derive(Parser)]
#[command(name = "regvm")]
#[command(version)]
#[command(about = "A register-based bytecode interpreter")]
struct Cli {
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Prefix log lines with the time of day
    #[arg(long, global = true)]
    timestamps: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Machine options shared by `run` and `debug`.
#[derive(clap::Args)]
struct MachineArgs {
    /// JSON host configuration file
    #[arg(short, long)]
    config: Option<String>,
    /// Memory size in words
    #[arg(long)]
    memory_size: Option<usize>,
    /// Register index used as the program counter
    #[arg(long)]
    pc_register: Option<usize>,
    /// Register index used as the stack pointer
    #[arg(long)]
    sp_register: Option<usize>,
    /// Address the image is loaded at; execution starts there
    #[arg(long)]
    load_address: Option<Word>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the program image (.bin for binary, anything else is text)
        image: String,
        #[command(flatten)]
        machine: MachineArgs,
        /// Stop after this many cycles
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Print each executed instruction to stderr
        #[arg(short, long)]
        trace: bool,
        /// Print the final CPU state as JSON
        #[arg(long)]
        dump_state: bool,
    },
    /// Interactive debugger
    Debug {
        /// Path to the program image
        image: String,
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Path to the program image
        image: String,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();
    if cli.quiet {
        log::set_level(Level::Error);
    }
    if cli.timestamps {
        log::SHOW_TIMESTAMP.store(true, Ordering::Relaxed);
    }

    match cli.command {
        Some(Commands::Run { image, machine, max_cycles, trace, dump_state }) => {
            let mut config = host_config(&machine);
            if max_cycles.is_some() {
                config.max_cycles = max_cycles;
            }
            exit(run_program(&image, &config, trace, dump_state));
        }
        Some(Commands::Debug { image, machine }) => {
            debug_program(&image, host_config(&machine));
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("regvm {}", env!("CARGO_PKG_VERSION"));
            println!("A register-based bytecode interpreter");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Configuration file first, then command-line overrides.
fn host_config(args: &MachineArgs) -> HostConfig {
    let mut config = match &args.config {
        Some(path) => match HostConfig::load(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                error!("Failed to load configuration {}: {}", path, e);
                exit(1);
            }
        },
        None => HostConfig::default(),
    };

    if let Some(size) = args.memory_size {
        config.memory_size = size;
    }
    if let Some(pc) = args.pc_register {
        config.cpu.pc_register = pc;
    }
    if let Some(sp) = args.sp_register {
        config.cpu.sp_register = sp;
    }
    if let Some(address) = args.load_address {
        config.load_address = address;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        exit(1);
    }
    config
}

fn read_program(path: &str) -> Vec<Word> {
    match load_image(path) {
        Ok(image) if image.is_empty() => {
            error!("No instructions in {}", path);
            exit(1);
        }
        Ok(image) => {
            info!("Loaded {} words from {}", image.len(), path);
            image.words
        }
        Err(e) => {
            error!("Failed to load {}: {}", path, e);
            exit(1);
        }
    }
}

/// Run an image against the console. Returns the process exit code.
fn run_program(path: &str, config: &HostConfig, trace: bool, dump_state: bool) -> i32 {
    let program = read_program(path);

    let mut memory = FlatMemory::new(config.memory_size);
    if let Err(e) = memory.load_program(config.load_address, &program) {
        error!("Failed to load program: {}", e);
        return 1;
    }
    let mut console = ConsoleIo::new();

    let mut cpu: Cpu<'_> = match Cpu::new(config.cpu) {
        Ok(cpu) => cpu,
        Err(e) => {
            error!("Invalid CPU configuration: {}", e);
            return 1;
        }
    };
    cpu.install_memory(&mut memory);
    cpu.install_io(&mut console);
    cpu.set_pc(config.load_address);
    cpu.set_running(true);

    info!("Running {} from address {}", path, config.load_address);
    let result = if trace {
        run_traced(&mut cpu, config.max_cycles)
    } else {
        match config.max_cycles {
            Some(limit) => cpu.run_limited(limit),
            None => cpu.run(),
        }
    };

    let code = match result {
        Ok(cycles) if cpu.fault().is_some() => {
            info!("Stopped by fault after {} cycles", cycles);
            1
        }
        Ok(cycles) if cpu.is_running() => {
            warn!("Reached cycle limit ({}). Use --max-cycles to increase.", cycles);
            0
        }
        Ok(cycles) => {
            info!("Halted after {} cycles", cycles);
            0
        }
        Err(e) => {
            error!("Fatal: {}", e);
            1
        }
    };

    if dump_state {
        match serde_json::to_string_pretty(&cpu.snapshot()) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize state: {}", e),
        }
    } else {
        print_registers(&cpu);
    }
    code
}

/// Step one instruction at a time, echoing each to stderr.
fn run_traced(cpu: &mut Cpu<'_>, max_cycles: Option<u64>) -> Result<u64, CpuError> {
    let start = cpu.cycles();
    while cpu.is_running() {
        if max_cycles.is_some_and(|limit| cpu.cycles() - start >= limit) {
            break;
        }
        let pc = cpu.pc();
        match cpu.step()? {
            Step::Executed(instr) => {
                eprintln!("{:04}: {:<24} flags={}", pc, disassemble_word(instr.to_word()), cpu.flags());
            }
            Step::Faulted(_) | Step::Idle => break,
        }
    }
    Ok(cpu.cycles() - start)
}

fn print_registers(cpu: &Cpu<'_>) {
    eprintln!();
    eprintln!("━━━ Result ━━━");
    eprintln!("Cycles: {}", cpu.cycles());
    eprintln!("Flags:  {}", cpu.flags());
    if let Some(fault) = cpu.fault() {
        eprintln!("Fault:  {}", fault);
    }
    for row in 0..4 {
        let line: Vec<String> = (0..4)
            .map(|col| {
                let index = row * 4 + col;
                format!("r{:<2} = {:#018x}", index, cpu.register(index).unwrap_or_default())
            })
            .collect();
        eprintln!("{}", line.join("  "));
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, config: HostConfig) {
    let program = read_program(path);
    info!("Launching debugger...");

    if let Err(e) = regvm::run_debugger(program, config) {
        error!("Debugger error: {}", e);
        exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _config: HostConfig) {
    error!("This build has no debugger; rebuild with the `tui` feature");
    exit(1);
}

fn disassemble_file(path: &str) {
    let program = read_program(path);
    println!("{}", regvm::disassemble(&program));
}

fn run_self_test() {
    use regvm::{encode, BufferedIo, Opcode::*};

    /// Run `program` in a small flat memory to completion.
    fn execute(program: &[Word], io: &mut BufferedIo) -> (Result<u64, CpuError>, Cpu<'static>) {
        let mut memory = FlatMemory::new(64);
        let _ = memory.load_program(0, program);
        let mut cpu: Cpu<'_> = Cpu::default();
        cpu.install_memory(&mut memory);
        cpu.install_io(io);
        cpu.set_running(true);
        let result = cpu.run_limited(1000);
        (result, cpu.detach())
    }

    println!("━━━ regvm Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let mut check = |name: &str, ok: bool| {
        if ok {
            println!("{}... ✓", name);
            passed += 1;
        } else {
            println!("{}... ✗", name);
            failed += 1;
        }
    };

    // Test 1: Codec round trip
    let word = encode(Beq, 0x0102, 0x0304, 0x0506);
    let instr = regvm::decode(word);
    check(
        "Instruction word round trip",
        instr.op() == Some(Beq) && instr.args == [0x0102, 0x0304, 0x0506] && instr.to_word() == word,
    );

    // Test 2: Arithmetic
    let mut io = BufferedIo::new();
    let (result, cpu) = execute(
        &[encode(Movi, 2, 5, 0), encode(Movi, 5, 7, 0), encode(Add, 2, 5, 0), encode(Halt, 0, 0, 0)],
        &mut io,
    );
    check(
        "Movi/Movi/Add/Halt",
        result.is_ok() && cpu.register(2) == Some(12) && cpu.register(5) == Some(7) && !cpu.is_running(),
    );

    // Test 3: Branch taken and not taken
    let branch = |rhs: u16| {
        let mut io = BufferedIo::new();
        let (_, cpu) = execute(
            &[
                encode(Movi, 2, 3, 0),
                encode(Movi, 5, rhs, 0),
                encode(Beq, 2, 5, 5),
                encode(Halt, 0, 0, 0),
                encode(Halt, 0, 0, 0),
                encode(Halt, 0, 0, 0),
            ],
            &mut io,
        );
        cpu.pc()
    };
    check("Branch taken", branch(3) == 5);
    check("Branch not taken", branch(4) == 3);

    // Test 4: Loop of ten iterations
    let mut io = BufferedIo::new();
    let (_, cpu) = execute(
        &[
            encode(Movi, 2, 0, 0),  // counter
            encode(Movi, 5, 0, 0),  // sum
            encode(Movi, 6, 10, 0), // max
            encode(Add, 5, 2, 0),
            encode(Addi, 2, 1, 0),
            encode(Blt, 2, 6, 3),
            encode(Halt, 0, 0, 0),
        ],
        &mut io,
    );
    check("Loop sum 0..10", cpu.register(5) == Some(45) && cpu.register(2) == Some(10));

    // Test 5: Syscall write
    let mut io = BufferedIo::new();
    let (_, _) = execute(
        &[
            encode(Movi, 3, 1, 0),
            encode(Movi, 4, 4, 0),
            encode(Syscall, 0, 0, 0),
            encode(Halt, 0, 0, 0),
            b'h' as Word,
            b'i' as Word,
            0,
            b'!' as Word,
        ],
        &mut io,
    );
    check("Syscall write stops at terminator", io.output() == b"hi");

    // Test 6: Fault containment
    let mut io = BufferedIo::new();
    let (result, cpu) = execute(
        &[encode(Movi, 2, 9, 0), encode(Load, 5, 1000, 0), encode(Halt, 0, 0, 0)],
        &mut io,
    );
    check(
        "Out-of-bounds load stops the CPU",
        result.is_ok() && cpu.fault().is_some() && !cpu.is_running() && cpu.register(2) == Some(9),
    );

    // Test 7: Unknown opcode
    let mut io = BufferedIo::new();
    let (result, cpu) = execute(&[0xFFFF, encode(Halt, 0, 0, 0)], &mut io);
    check(
        "Unknown opcode is fatal",
        matches!(result, Err(CpuError::UnknownOpcode { .. })) && cpu.pc() == 0,
    );

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        exit(1);
    }
}
