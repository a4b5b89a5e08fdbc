//! End-to-end programs through the public API.

use regvm::cpu::io::{IoFunction, ReadDevice, WriteDevice};
use regvm::cpu::registers::Registers;
use regvm::{
    encode, BufferedIo, Cpu, CpuConfig, CpuError, Fault, FlatMemory, IoBus, IoError, MemoryBus,
    MemoryError, Opcode::*, Step, Word,
};

fn memory_with(program: &[Word], size: usize) -> FlatMemory {
    let mut memory = FlatMemory::new(size);
    memory.load_program(0, program).unwrap();
    memory
}

fn halt() -> Word {
    encode(Halt, 0, 0, 0)
}

#[test]
fn arithmetic_program() {
    let mut memory = memory_with(
        &[encode(Movi, 2, 5, 0), encode(Movi, 5, 7, 0), encode(Add, 2, 5, 0), halt()],
        16,
    );
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.set_running(true);

    assert_eq!(cpu.run().unwrap(), 4);
    assert_eq!(cpu.register(2), Some(12));
    assert_eq!(cpu.register(5), Some(7));
    assert!(!cpu.is_running());
    assert!(cpu.fault().is_none());
}

#[test]
fn branch_taken_and_not_taken() {
    for (rhs, expected_pc) in [(3u16, 9), (4, 3)] {
        let mut memory = memory_with(
            &[encode(Movi, 2, 3, 0), encode(Movi, 5, rhs, 0), encode(Beq, 2, 5, 9)],
            16,
        );
        let mut cpu: Cpu<'_> = Cpu::default();
        cpu.install_memory(&mut memory);
        cpu.set_running(true);

        for _ in 0..3 {
            assert!(matches!(cpu.step(), Ok(Step::Executed(_))));
        }
        assert_eq!(cpu.pc(), expected_pc);
    }
}

#[test]
fn counting_loop() {
    // r2 counter, r5 accumulator, r6 bound
    let program = [
        encode(Movi, 2, 0, 0),
        encode(Movi, 5, 0, 0),
        encode(Movi, 6, 10, 0),
        encode(Add, 5, 2, 0),
        encode(Addi, 2, 1, 0),
        encode(Blt, 2, 6, 3),
        halt(),
    ];
    let mut memory = memory_with(&program, 16);
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.set_running(true);

    // three setup words, ten passes of three, halt
    assert_eq!(cpu.run().unwrap(), 3 + 10 * 3 + 1);
    assert_eq!(cpu.register(5), Some(45));
    assert_eq!(cpu.register(2), Some(10));
}

#[test]
fn syscall_write_emits_string() {
    let mut memory = memory_with(
        &[
            encode(Movi, 3, 1, 0),
            encode(Movi, 4, 8, 0),
            encode(Syscall, 0, 0, 0),
            halt(),
        ],
        32,
    );
    memory.load_cstring(8, b"hello").unwrap();
    memory.write(14, b'X' as Word).unwrap();

    let mut io = BufferedIo::new();
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.install_io(&mut io);
    cpu.set_running(true);
    cpu.run().unwrap();
    drop(cpu);

    assert_eq!(io.output(), b"hello");
}

#[test]
fn syscall_read_stores_one_byte() {
    let mut memory = memory_with(
        &[
            encode(Movi, 3, 0, 0),
            encode(Movi, 4, 10, 0),
            encode(Syscall, 0, 0, 0),
            encode(Load, 6, 10, 0),
            halt(),
        ],
        16,
    );
    let mut io = BufferedIo::with_input(b"AB");
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.install_io(&mut io);
    cpu.set_running(true);
    cpu.run().unwrap();

    assert_eq!(cpu.register(6), Some(b'A' as Word));
    drop(cpu);
    assert_eq!(io.pending_input(), 1);
}

#[test]
fn out_of_bounds_load_is_contained() {
    let mut memory = memory_with(
        &[encode(Movi, 2, 77, 0), encode(Load, 5, 500, 0), halt()],
        16,
    );
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.set_running(true);

    assert!(cpu.run().is_ok());
    assert!(!cpu.is_running());
    assert_eq!(cpu.register(2), Some(77));
    assert_eq!(cpu.register(5), Some(0));
    assert_eq!(cpu.pc(), 1);
    assert_eq!(
        cpu.fault(),
        Some(&Fault::Memory(MemoryError::OutOfBounds { address: 500 }))
    );
}

#[test]
fn running_off_the_end_faults_on_fetch() {
    let mut memory = memory_with(&[encode(Movi, 2, 1, 0)], 1);
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.set_running(true);

    assert_eq!(cpu.run().unwrap(), 1);
    assert_eq!(cpu.register(2), Some(1));
    assert!(matches!(cpu.fault(), Some(Fault::Memory(MemoryError::OutOfBounds { address: 1 }))));
}

#[test]
fn unknown_opcode_is_fatal() {
    let mut memory = memory_with(&[encode(Nop, 0, 0, 0), 0x0000_0000_0000_0040, halt()], 8);
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.set_running(true);

    let err = cpu.run().unwrap_err();
    assert_eq!(err, CpuError::UnknownOpcode { opcode: 0x40, pc: 1 });
    // Never skipped: the next attempt hits the same word.
    assert_eq!(cpu.pc(), 1);
    assert!(cpu.is_running());
    assert_eq!(cpu.step().unwrap_err(), err);
}

#[test]
fn divide_by_zero_is_fatal() {
    let mut memory = memory_with(&[encode(Movi, 2, 9, 0), encode(Divi, 2, 0, 0), halt()], 8);
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.set_running(true);

    assert_eq!(cpu.run(), Err(CpuError::DivideByZero { pc: 1 }));
    assert_eq!(cpu.register(2), Some(9));
}

#[test]
fn custom_pc_register() {
    let config = CpuConfig::new(15, 14).unwrap();
    let mut memory = memory_with(&[encode(Movi, 0, 4, 0), encode(Jmp, 3, 0, 0), halt(), halt()], 8);
    let mut cpu: Cpu<'_> = Cpu::new(config).unwrap();
    cpu.install_memory(&mut memory);
    cpu.set_running(true);
    cpu.run().unwrap();

    assert_eq!(cpu.register(0), Some(4));
    assert_eq!(cpu.register(15), Some(3));
    assert_eq!(cpu.pc(), 3);
}

/// Memory host that counts every access.
#[derive(Default)]
struct CountingBus {
    cells: Vec<Word>,
    reads: usize,
    writes: usize,
}

impl MemoryBus for CountingBus {
    fn get_memory(&mut self, _cpu: &Registers, address: Word) -> Result<Word, MemoryError> {
        self.reads += 1;
        self.cells
            .get(address as usize)
            .copied()
            .ok_or(MemoryError::OutOfBounds { address })
    }

    fn set_memory(&mut self, _cpu: &Registers, address: Word, value: Word) -> Result<(), MemoryError> {
        self.writes += 1;
        let cell = self
            .cells
            .get_mut(address as usize)
            .ok_or(MemoryError::OutOfBounds { address })?;
        *cell = value;
        Ok(())
    }
}

#[test]
fn custom_memory_host() {
    let mut bus = CountingBus {
        cells: vec![encode(Movi, 2, 21, 0), encode(Store, 2, 4, 0), halt(), 0, 0],
        ..CountingBus::default()
    };
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut bus);
    cpu.set_running(true);
    cpu.run().unwrap();
    drop(cpu);

    assert_eq!(bus.cells[4], 21);
    assert_eq!(bus.reads, 3);
    assert_eq!(bus.writes, 1);
}

/// Writer that fails once it holds `limit` bytes.
struct FlakyWriter {
    written: Vec<u8>,
    limit: usize,
}

impl WriteDevice for FlakyWriter {
    fn write_byte(&mut self, byte: u8) -> Result<(), IoError> {
        if self.written.len() >= self.limit {
            return Err(IoError::WriteAccess("device full".into()));
        }
        self.written.push(byte);
        Ok(())
    }
}

struct ClosedReader;

impl ReadDevice for ClosedReader {
    fn read_byte(&mut self) -> Result<u8, IoError> {
        Err(IoError::ReadAccess("closed".into()))
    }
}

struct FlakyIo {
    reader: ClosedReader,
    writer: FlakyWriter,
}

impl FlakyIo {
    fn new(limit: usize) -> Self {
        Self {
            reader: ClosedReader,
            writer: FlakyWriter { written: Vec::new(), limit },
        }
    }
}

impl IoBus for FlakyIo {
    fn get_io(&mut self, _cpu: &Registers, descriptor: Word) -> Result<IoFunction<'_>, IoError> {
        match descriptor {
            0 => Ok(IoFunction::Read(&mut self.reader)),
            1 => Ok(IoFunction::Write(&mut self.writer)),
            _ => Err(IoError::FunctionDoesntExist { descriptor }),
        }
    }
}

#[test]
fn device_write_failure_is_contained() {
    let mut memory = memory_with(
        &[encode(Movi, 3, 1, 0), encode(Movi, 4, 5, 0), encode(Syscall, 0, 0, 0), halt()],
        16,
    );
    memory.load_cstring(5, b"abcdef").unwrap();
    let mut io = FlakyIo::new(3);

    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.install_io(&mut io);
    cpu.set_running(true);
    cpu.run().unwrap();

    assert!(!cpu.is_running());
    assert_eq!(cpu.pc(), 2);
    assert!(matches!(cpu.fault(), Some(Fault::Io(IoError::WriteAccess(_)))));
    drop(cpu);
    assert_eq!(io.writer.written, b"abc");
}

#[test]
fn device_read_failure_is_contained() {
    let mut memory = memory_with(
        &[encode(Movi, 4, 7, 0), encode(Syscall, 0, 0, 0), halt()],
        8,
    );
    let mut io = FlakyIo::new(0);

    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.install_io(&mut io);
    cpu.set_running(true);
    cpu.run().unwrap();

    assert_eq!(cpu.fault(), Some(&Fault::Io(IoError::ReadAccess("closed".into()))));
    assert_eq!(cpu.pc(), 1);
    drop(cpu);
    assert_eq!(memory.read(7), Ok(0));
}

#[test]
fn unbound_descriptor_is_contained() {
    let mut memory = memory_with(&[encode(Movi, 3, 9, 0), encode(Syscall, 0, 0, 0), halt()], 8);
    let mut io = BufferedIo::new();
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.install_io(&mut io);
    cpu.set_running(true);
    cpu.run().unwrap();

    assert_eq!(
        cpu.fault(),
        Some(&Fault::Io(IoError::FunctionDoesntExist { descriptor: 9 }))
    );
}

#[test]
fn syscall_without_io_is_ignored() {
    let mut memory = memory_with(
        &[encode(Movi, 3, 1, 0), encode(Syscall, 0, 0, 0), encode(Movi, 2, 1, 0), halt()],
        8,
    );
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut memory);
    cpu.set_running(true);
    cpu.run().unwrap();

    assert!(cpu.fault().is_none());
    assert_eq!(cpu.register(2), Some(1));
}

#[test]
fn state_survives_detach_and_reinstall() {
    let program = [encode(Addi, 2, 1, 0), encode(Jmp, 0, 0, 0)];
    let mut first = memory_with(&program, 4);
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.install_memory(&mut first);
    cpu.set_running(true);
    cpu.run_limited(4).unwrap();
    let cpu = cpu.detach();

    let mut second = memory_with(&program, 4);
    let mut cpu: Cpu<'_> = cpu;
    cpu.install_memory(&mut second);
    cpu.run_limited(4).unwrap();

    assert_eq!(cpu.register(2), Some(4));
    assert_eq!(cpu.cycles(), 8);
    assert!(cpu.is_running());
}
