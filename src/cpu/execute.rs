//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//!
//! Errors come in two severities. A [`Fault`] is raised at the boundary
//! (bad address, missing device, failing device) or by a bad register
//! operand; it clears the running flag, is kept on the CPU for inspection,
//! and `run` returns normally. A [`CpuError`] means the program itself is
//! malformed (unknown opcode, division by zero); it is returned to the
//! host and the CPU state is left exactly as it was before the cycle.

use crate::cpu::decode::{InstructionWord, Opcode};
use crate::cpu::io::{IoBus, IoError, IoFunction};
use crate::cpu::memory::{MemoryBus, MemoryError};
use crate::cpu::registers::{
    ConfigError, CpuConfig, Flags, Registers, Stack, DEFAULT_STACK_SIZE,
    SYSCALL_DESCRIPTOR_REGISTER, SYSCALL_POINTER_REGISTER,
};
use crate::cpu::Word;
use crate::{error, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a single [`Cpu::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The running flag was clear; nothing happened.
    Idle,
    /// One instruction completed.
    Executed(InstructionWord),
    /// The cycle faulted and the CPU stopped.
    Faulted(Fault),
}

/// Where the PC goes after an instruction.
enum Flow {
    Next,
    Jump(Word),
    Stay,
}

/// Internal error channel of one cycle.
enum Trap {
    Fault(Fault),
    Fatal(CpuError),
}

impl From<Fault> for Trap {
    fn from(fault: Fault) -> Self {
        Trap::Fault(fault)
    }
}

impl From<CpuError> for Trap {
    fn from(err: CpuError) -> Self {
        Trap::Fatal(err)
    }
}

/// The interpreter.
///
/// Memory and I/O are borrowed from the host for `'h`. The register file
/// and the reserved stack of `STACK_SIZE` words live inline.
pub struct Cpu<'h, const STACK_SIZE: usize = DEFAULT_STACK_SIZE> {
    /// Register file and flags.
    pub regs: Registers,
    /// Reserved call stack.
    pub stack: Stack<STACK_SIZE>,
    config: CpuConfig,
    memory: Option<&'h mut dyn MemoryBus>,
    io: Option<&'h mut dyn IoBus>,
    fault: Option<Fault>,
    cycles: u64,
}

impl<'h, const STACK_SIZE: usize> Cpu<'h, STACK_SIZE> {
    /// Create a stopped CPU with cleared registers and no callbacks.
    pub fn new(config: CpuConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            regs: Registers::new(),
            stack: Stack::new(),
            config,
            memory: None,
            io: None,
            fault: None,
            cycles: 0,
        })
    }

    pub fn config(&self) -> CpuConfig {
        self.config
    }

    /// Install the memory callbacks used for fetch, load and store.
    pub fn install_memory(&mut self, memory: &'h mut dyn MemoryBus) {
        self.memory = Some(memory);
    }

    /// Install the device lookup used by `Syscall`.
    pub fn install_io(&mut self, io: &'h mut dyn IoBus) {
        self.io = Some(io);
    }

    pub fn uninstall_memory(&mut self) {
        self.memory = None;
    }

    pub fn uninstall_io(&mut self) {
        self.io = None;
    }

    pub fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    pub fn has_io(&self) -> bool {
        self.io.is_some()
    }

    /// Drop the installed callbacks, releasing the host's borrows.
    ///
    /// The returned CPU keeps every register, flag, stack entry, fault and
    /// counter, and can have new callbacks installed for any lifetime.
    pub fn detach<'a>(self) -> Cpu<'a, STACK_SIZE> {
        Cpu {
            regs: self.regs,
            stack: self.stack,
            config: self.config,
            memory: None,
            io: None,
            fault: self.fault,
            cycles: self.cycles,
        }
    }

    /// Clear registers, flags, stack, fault and cycle count. Callbacks stay
    /// installed.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.stack.clear();
        self.fault = None;
        self.cycles = 0;
    }

    /// Set or clear the running flag.
    pub fn set_running(&mut self, running: bool) {
        self.regs.flags.set(Flags::RUNNING, running);
    }

    pub fn is_running(&self) -> bool {
        self.regs.is_running()
    }

    pub fn flags(&self) -> Flags {
        self.regs.flags
    }

    pub fn pc(&self) -> Word {
        self.regs.file[self.config.pc_register]
    }

    pub fn set_pc(&mut self, pc: Word) {
        self.regs.file[self.config.pc_register] = pc;
    }

    pub fn sp(&self) -> Word {
        self.regs.file[self.config.sp_register]
    }

    pub fn set_sp(&mut self, sp: Word) {
        self.regs.file[self.config.sp_register] = sp;
    }

    /// Read a register, or `None` if `index` is 16 or more.
    pub fn register(&self, index: usize) -> Option<Word> {
        self.regs.file.get(index).copied()
    }

    /// Write a register. Returns `None` and changes nothing if `index` is
    /// 16 or more.
    pub fn set_register(&mut self, index: usize, value: Word) -> Option<()> {
        *self.regs.file.get_mut(index)? = value;
        Some(())
    }

    /// The fault that last stopped the CPU, if any.
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Completed instruction count since construction or reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Read memory through the installed callback.
    pub fn read_memory(&mut self, address: Word) -> Result<Word, MemoryError> {
        load(&mut self.memory, &self.regs, address)
    }

    /// Write memory through the installed callback.
    pub fn write_memory(&mut self, address: Word, value: Word) -> Result<(), MemoryError> {
        store(&mut self.memory, &self.regs, address, value)
    }

    /// Run until the running flag clears.
    ///
    /// Returns the number of instructions completed. Faults stop the loop
    /// and are reported through [`Cpu::fault`]; only fatal program errors
    /// come back as `Err`.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start = self.cycles;
        while self.is_running() {
            self.step()?;
        }
        Ok(self.cycles - start)
    }

    /// Like [`Cpu::run`], but return after at most `max_cycles` cycles.
    ///
    /// If the budget runs out the running flag stays set and a later call
    /// resumes where this one stopped.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start = self.cycles;
        let mut budget = max_cycles;
        while self.is_running() && budget > 0 {
            self.step()?;
            budget -= 1;
        }
        Ok(self.cycles - start)
    }

    /// Execute one fetch-decode-execute cycle.
    pub fn step(&mut self) -> Result<Step, CpuError> {
        if !self.is_running() {
            return Ok(Step::Idle);
        }

        // Fetch
        let pc = self.pc();
        let raw = match load(&mut self.memory, &self.regs, pc) {
            Ok(raw) => raw,
            Err(e) => return Ok(self.stop(pc, e.into())),
        };

        // Decode
        let instr = InstructionWord::from_word(raw);
        let Ok(opcode) = Opcode::try_from(instr.opcode) else {
            let err = CpuError::UnknownOpcode { opcode: instr.opcode, pc };
            error!("fatal: {}", err);
            return Err(err);
        };

        // Execute
        match self.execute(opcode, instr.args, pc) {
            Ok(flow) => {
                match flow {
                    // Reads the register again: the instruction may have written it.
                    Flow::Next => self.set_pc(self.pc().wrapping_add(1)),
                    Flow::Jump(target) => self.set_pc(target),
                    Flow::Stay => {}
                }
                self.cycles += 1;
                Ok(Step::Executed(instr))
            }
            Err(Trap::Fault(fault)) => Ok(self.stop(pc, fault)),
            Err(Trap::Fatal(err)) => {
                error!("fatal: {}", err);
                Err(err)
            }
        }
    }

    /// Record a fault and clear the running flag.
    fn stop(&mut self, pc: Word, fault: Fault) -> Step {
        error!("cpu fault at pc={:#x}: {}", pc, fault);
        self.regs.flags.remove(Flags::RUNNING);
        self.fault = Some(fault.clone());
        Step::Faulted(fault)
    }

    fn reg(&self, index: u16) -> Result<Word, Fault> {
        self.regs.get(index).ok_or(Fault::InvalidRegister { index })
    }

    fn set_reg(&mut self, index: u16, value: Word) -> Result<(), Fault> {
        self.regs.set(index, value).ok_or(Fault::InvalidRegister { index })
    }

    /// r0 := op(r0, operand)
    fn arith(&mut self, dst: u16, operand: Word, op: fn(Word, Word) -> Word) -> Result<Flow, Trap> {
        let value = op(self.reg(dst)?, operand);
        self.set_reg(dst, value)?;
        Ok(Flow::Next)
    }

    fn divide(&mut self, dst: u16, divisor: Word, pc: Word) -> Result<Flow, Trap> {
        let dividend = self.reg(dst)?;
        let quotient = dividend
            .checked_div(divisor)
            .ok_or(CpuError::DivideByZero { pc })?;
        self.set_reg(dst, quotient)?;
        Ok(Flow::Next)
    }

    fn branch(&self, args: [u16; 3], taken: fn(Word, Word) -> bool) -> Result<Flow, Trap> {
        let [a, b, target] = args;
        if taken(self.reg(a)?, self.reg(b)?) {
            Ok(Flow::Jump(Word::from(target)))
        } else {
            Ok(Flow::Next)
        }
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, opcode: Opcode, args: [u16; 3], pc: Word) -> Result<Flow, Trap> {
        let [a, b, _] = args;
        let imm = Word::from(b);

        match opcode {
            Opcode::Nop => Ok(Flow::Next),

            // ==================== Arithmetic ====================
            Opcode::Add => {
                let rhs = self.reg(b)?;
                self.arith(a, rhs, Word::wrapping_add)
            }
            Opcode::Sub => {
                let rhs = self.reg(b)?;
                self.arith(a, rhs, Word::wrapping_sub)
            }
            Opcode::Mul => {
                let rhs = self.reg(b)?;
                self.arith(a, rhs, Word::wrapping_mul)
            }
            Opcode::Div => {
                let rhs = self.reg(b)?;
                self.divide(a, rhs, pc)
            }
            Opcode::Addi => self.arith(a, imm, Word::wrapping_add),
            Opcode::Subi => self.arith(a, imm, Word::wrapping_sub),
            Opcode::Muli => self.arith(a, imm, Word::wrapping_mul),
            Opcode::Divi => self.divide(a, imm, pc),

            // ==================== Data Transfer ====================
            Opcode::Mov => {
                let value = self.reg(b)?;
                self.set_reg(a, value)?;
                Ok(Flow::Next)
            }
            Opcode::Movi => {
                self.set_reg(a, imm)?;
                Ok(Flow::Next)
            }
            Opcode::Load => {
                self.reg(a)?;
                let value = load(&mut self.memory, &self.regs, imm).map_err(Fault::from)?;
                self.set_reg(a, value)?;
                Ok(Flow::Next)
            }
            Opcode::Store => {
                let value = self.reg(a)?;
                store(&mut self.memory, &self.regs, imm, value).map_err(Fault::from)?;
                Ok(Flow::Next)
            }

            // ==================== Control Flow ====================
            Opcode::Beq => self.branch(args, |x, y| x == y),
            Opcode::Bne => self.branch(args, |x, y| x != y),
            Opcode::Blt => self.branch(args, |x, y| x < y),
            Opcode::Bgt => self.branch(args, |x, y| x > y),
            Opcode::Jmp => Ok(Flow::Jump(Word::from(a))),
            Opcode::JmpR => Ok(Flow::Jump(self.reg(a)?)),
            Opcode::Halt => {
                self.regs.flags.remove(Flags::RUNNING);
                Ok(Flow::Stay)
            }

            // ==================== Device I/O ====================
            Opcode::Syscall => {
                self.syscall()?;
                Ok(Flow::Next)
            }
        }
    }

    /// Device I/O. Descriptor in r3, data address in r4.
    ///
    /// A read device stores one byte at the data address. A write device
    /// receives the zero-terminated byte string starting there.
    fn syscall(&mut self) -> Result<(), Fault> {
        let descriptor = self.regs.file[SYSCALL_DESCRIPTOR_REGISTER];
        let pointer = self.regs.file[SYSCALL_POINTER_REGISTER];

        let Some(io) = self.io.as_deref_mut() else {
            warn!("syscall with no I/O installed (descriptor {}), ignoring", descriptor);
            return Ok(());
        };

        match io.get_io(&self.regs, descriptor)? {
            IoFunction::Read(device) => {
                let byte = device.read_byte()?;
                store(&mut self.memory, &self.regs, pointer, Word::from(byte))?;
            }
            IoFunction::Write(device) => {
                let mut address = pointer;
                loop {
                    let byte = load(&mut self.memory, &self.regs, address)? as u8;
                    if byte == 0 {
                        break;
                    }
                    device.write_byte(byte)?;
                    address = address.wrapping_add(1);
                }
            }
        }
        Ok(())
    }

    /// Serializable view of the CPU.
    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            registers: self.regs.file,
            flags: self.regs.flags.bits(),
            flag_names: self.regs.flags.names().iter().map(|s| s.to_string()).collect(),
            pc: self.pc(),
            sp: self.sp(),
            running: self.is_running(),
            cycles: self.cycles,
            stack_depth: self.stack.len(),
            fault: self.fault.as_ref().map(|f| f.to_string()),
        }
    }
}

fn load(
    memory: &mut Option<&mut dyn MemoryBus>,
    regs: &Registers,
    address: Word,
) -> Result<Word, MemoryError> {
    memory
        .as_deref_mut()
        .ok_or(MemoryError::NotInstalled)?
        .get_memory(regs, address)
}

fn store(
    memory: &mut Option<&mut dyn MemoryBus>,
    regs: &Registers,
    address: Word,
    value: Word,
) -> Result<(), MemoryError> {
    memory
        .as_deref_mut()
        .ok_or(MemoryError::NotInstalled)?
        .set_memory(regs, address, value)
}

impl Default for Cpu<'_> {
    fn default() -> Self {
        Self {
            regs: Registers::new(),
            stack: Stack::new(),
            config: CpuConfig::default(),
            memory: None,
            io: None,
            fault: None,
            cycles: 0,
        }
    }
}

impl<const STACK_SIZE: usize> std::fmt::Debug for Cpu<'_, STACK_SIZE> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("regs", &self.regs)
            .field("config", &self.config)
            .field("fault", &self.fault)
            .field("cycles", &self.cycles)
            .field("memory", &self.memory.is_some())
            .field("io", &self.io.is_some())
            .finish()
    }
}

/// Point-in-time copy of the CPU state, for dumps and front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub registers: [Word; 16],
    pub flags: u16,
    pub flag_names: Vec<String>,
    pub pc: Word,
    pub sp: Word,
    pub running: bool,
    pub cycles: u64,
    pub stack_depth: usize,
    pub fault: Option<String>,
}

/// Recoverable fault: stops the CPU, leaves its state inspectable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("memory fault: {0}")]
    Memory(#[from] MemoryError),

    #[error("I/O fault: {0}")]
    Io(#[from] IoError),

    #[error("register index {index} out of range")]
    InvalidRegister { index: u16 },
}

/// Fatal program error, returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("unknown opcode {opcode:#06x} at pc={pc:#x}")]
    UnknownOpcode { opcode: u16, pc: Word },

    #[error("division by zero at pc={pc:#x}")]
    DivideByZero { pc: Word },
}
