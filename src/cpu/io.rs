//! I/O boundary.
//!
//! `Syscall` resolves a device through the host's [`IoBus`] by an integer
//! descriptor and gets back an [`IoFunction`]: either a byte reader or a
//! byte writer. Which descriptor maps to which device is host policy; the
//! tables here follow the usual convention of 0 for input and 1 for output.

use crate::cpu::registers::Registers;
use crate::cpu::Word;
use std::collections::{BTreeMap, VecDeque};
use std::io::{Read, Write};
use thiserror::Error;

/// Conventional descriptor of the input device.
pub const STDIN_DESCRIPTOR: Word = 0;

/// Conventional descriptor of the output device.
pub const STDOUT_DESCRIPTOR: Word = 1;

/// Produces one byte per call.
pub trait ReadDevice {
    fn read_byte(&mut self) -> Result<u8, IoError>;
}

/// Consumes one byte per call.
pub trait WriteDevice {
    fn write_byte(&mut self, byte: u8) -> Result<(), IoError>;
}

impl<F: FnMut() -> Result<u8, IoError>> ReadDevice for F {
    fn read_byte(&mut self) -> Result<u8, IoError> {
        self()
    }
}

impl<F: FnMut(u8) -> Result<(), IoError>> WriteDevice for F {
    fn write_byte(&mut self, byte: u8) -> Result<(), IoError> {
        self(byte)
    }
}

/// A resolved device capability, borrowed for one `Syscall`.
pub enum IoFunction<'a> {
    Read(&'a mut dyn ReadDevice),
    Write(&'a mut dyn WriteDevice),
}

impl std::fmt::Debug for IoFunction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoFunction::Read(_) => write!(f, "IoFunction::Read"),
            IoFunction::Write(_) => write!(f, "IoFunction::Write"),
        }
    }
}

/// Host-supplied device lookup.
pub trait IoBus {
    /// Resolve `descriptor` to a device.
    fn get_io(&mut self, cpu: &Registers, descriptor: Word) -> Result<IoFunction<'_>, IoError>;
}

impl<T: IoBus + ?Sized> IoBus for &mut T {
    fn get_io(&mut self, cpu: &Registers, descriptor: Word) -> Result<IoFunction<'_>, IoError> {
        (**self).get_io(cpu, descriptor)
    }
}

/// Reads bytes from the process's standard input.
#[derive(Debug, Default)]
pub struct StdinDevice;

impl ReadDevice for StdinDevice {
    fn read_byte(&mut self) -> Result<u8, IoError> {
        let mut byte = [0u8; 1];
        match std::io::stdin().lock().read(&mut byte) {
            Ok(0) => Err(IoError::ReadAccess("end of input".into())),
            Ok(_) => Ok(byte[0]),
            Err(e) => Err(IoError::ReadAccess(e.to_string())),
        }
    }
}

/// Writes bytes to the process's standard output.
#[derive(Debug, Default)]
pub struct StdoutDevice;

impl WriteDevice for StdoutDevice {
    fn write_byte(&mut self, byte: u8) -> Result<(), IoError> {
        let mut out = std::io::stdout().lock();
        out.write_all(&[byte])
            .and_then(|_| out.flush())
            .map_err(|e| IoError::WriteAccess(e.to_string()))
    }
}

/// Console device table: descriptor 0 reads stdin, 1 writes stdout.
#[derive(Debug, Default)]
pub struct ConsoleIo {
    stdin: StdinDevice,
    stdout: StdoutDevice,
}

impl ConsoleIo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IoBus for ConsoleIo {
    fn get_io(&mut self, _cpu: &Registers, descriptor: Word) -> Result<IoFunction<'_>, IoError> {
        match descriptor {
            STDIN_DESCRIPTOR => Ok(IoFunction::Read(&mut self.stdin)),
            STDOUT_DESCRIPTOR => Ok(IoFunction::Write(&mut self.stdout)),
            _ => Err(IoError::FunctionDoesntExist { descriptor }),
        }
    }
}

/// Input bytes queued ahead of time.
#[derive(Debug, Clone, Default)]
pub struct InputQueue(VecDeque<u8>);

impl ReadDevice for InputQueue {
    fn read_byte(&mut self) -> Result<u8, IoError> {
        self.0
            .pop_front()
            .ok_or_else(|| IoError::ReadAccess("input exhausted".into()))
    }
}

/// Output bytes collected in memory.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Vec<u8>);

impl WriteDevice for OutputBuffer {
    fn write_byte(&mut self, byte: u8) -> Result<(), IoError> {
        self.0.push(byte);
        Ok(())
    }
}

/// In-memory device table with the console descriptor layout.
///
/// Used where there is no terminal to talk to: tests, the debugger and
/// the WASM bindings.
#[derive(Debug, Clone, Default)]
pub struct BufferedIo {
    input: InputQueue,
    output: OutputBuffer,
}

impl BufferedIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `input` queued for reading.
    pub fn with_input(input: &[u8]) -> Self {
        let mut io = Self::new();
        io.push_input(input);
        io
    }

    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.0.extend(bytes.iter().copied());
    }

    /// Bytes not yet read by the program.
    pub fn pending_input(&self) -> usize {
        self.input.0.len()
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output.0
    }

    /// Drain the output buffer.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output.0)
    }

    pub fn clear(&mut self) {
        self.input.0.clear();
        self.output.0.clear();
    }
}

impl IoBus for BufferedIo {
    fn get_io(&mut self, _cpu: &Registers, descriptor: Word) -> Result<IoFunction<'_>, IoError> {
        match descriptor {
            STDIN_DESCRIPTOR => Ok(IoFunction::Read(&mut self.input)),
            STDOUT_DESCRIPTOR => Ok(IoFunction::Write(&mut self.output)),
            _ => Err(IoError::FunctionDoesntExist { descriptor }),
        }
    }
}

/// A device registered in a [`DeviceTable`].
pub enum Device {
    Reader(Box<dyn ReadDevice>),
    Writer(Box<dyn WriteDevice>),
}

/// Arbitrary descriptor-to-device mapping.
#[derive(Default)]
pub struct DeviceTable {
    devices: BTreeMap<Word, Device>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a reader to `descriptor`, replacing any previous device.
    pub fn bind_reader(&mut self, descriptor: Word, device: impl ReadDevice + 'static) -> &mut Self {
        self.devices.insert(descriptor, Device::Reader(Box::new(device)));
        self
    }

    /// Bind a writer to `descriptor`, replacing any previous device.
    pub fn bind_writer(&mut self, descriptor: Word, device: impl WriteDevice + 'static) -> &mut Self {
        self.devices.insert(descriptor, Device::Writer(Box::new(device)));
        self
    }

    pub fn unbind(&mut self, descriptor: Word) -> Option<Device> {
        self.devices.remove(&descriptor)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl IoBus for DeviceTable {
    fn get_io(&mut self, _cpu: &Registers, descriptor: Word) -> Result<IoFunction<'_>, IoError> {
        match self.devices.get_mut(&descriptor) {
            Some(Device::Reader(device)) => Ok(IoFunction::Read(device.as_mut())),
            Some(Device::Writer(device)) => Ok(IoFunction::Write(device.as_mut())),
            None => Err(IoError::FunctionDoesntExist { descriptor }),
        }
    }
}

impl std::fmt::Debug for DeviceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTable")
            .field("descriptors", &self.devices.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Errors reported across the I/O boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// No device is bound to the descriptor.
    #[error("no I/O function for descriptor {descriptor}")]
    FunctionDoesntExist { descriptor: Word },

    /// The read device failed.
    #[error("I/O read access error: {0}")]
    ReadAccess(String),

    /// The write device failed.
    #[error("I/O write access error: {0}")]
    WriteAccess(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_descriptors() {
        let regs = Registers::new();
        let mut io = BufferedIo::with_input(b"x");

        match io.get_io(&regs, STDIN_DESCRIPTOR).unwrap() {
            IoFunction::Read(device) => assert_eq!(device.read_byte(), Ok(b'x')),
            other => panic!("expected reader, got {:?}", other),
        }
        match io.get_io(&regs, STDOUT_DESCRIPTOR).unwrap() {
            IoFunction::Write(device) => device.write_byte(b'y').unwrap(),
            other => panic!("expected writer, got {:?}", other),
        }
        assert_eq!(io.output(), b"y");
        assert!(matches!(
            io.get_io(&regs, 7),
            Err(IoError::FunctionDoesntExist { descriptor: 7 })
        ));
    }

    #[test]
    fn test_input_exhausted() {
        let mut input = InputQueue::default();
        assert!(matches!(input.read_byte(), Err(IoError::ReadAccess(_))));
    }

    #[test]
    fn test_take_output_drains() {
        let mut io = BufferedIo::new();
        io.output.write_byte(1).unwrap();
        assert_eq!(io.take_output(), vec![1]);
        assert!(io.output().is_empty());
    }

    #[test]
    fn test_device_table_with_closures() {
        let regs = Registers::new();
        let mut next = 0u8;
        let mut table = DeviceTable::new();
        table
            .bind_reader(5, move || -> Result<u8, IoError> {
                next += 1;
                Ok(next)
            })
            .bind_writer(6, |_byte: u8| -> Result<(), IoError> {
                Err(IoError::WriteAccess("full".into()))
            });

        match table.get_io(&regs, 5).unwrap() {
            IoFunction::Read(device) => {
                assert_eq!(device.read_byte(), Ok(1));
                assert_eq!(device.read_byte(), Ok(2));
            }
            other => panic!("expected reader, got {:?}", other),
        }
        match table.get_io(&regs, 6).unwrap() {
            IoFunction::Write(device) => assert!(device.write_byte(0).is_err()),
            other => panic!("expected writer, got {:?}", other),
        }
        assert!(table.unbind(5).is_some());
        assert!(table.get_io(&regs, 5).is_err());
    }
}
