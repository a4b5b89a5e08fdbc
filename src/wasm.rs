//! WebAssembly bindings.
//!
//! Wraps a CPU together with flat memory and buffered devices so a browser
//! front-end can load an image, step it and read back registers and output.

use wasm_bindgen::prelude::*;
use crate::cpu::{BufferedIo, Cpu, CpuConfig, FlatMemory, Step, Word};
use crate::program::disasm::disassemble_word;
use crate::program::image::parse_image;

/// Memory size of a fresh VM, in words.
const WASM_MEMORY_SIZE: usize = 4096;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly VM wrapper.
#[wasm_bindgen]
pub struct WasmVm {
    cpu: Cpu<'static>,
    memory: FlatMemory,
    io: BufferedIo,
    program: Vec<Word>,
}

impl WasmVm {
    /// Install the callbacks, run `f`, and detach again.
    fn with_bus<T>(&mut self, f: impl FnOnce(&mut Cpu<'_>) -> T) -> T {
        let mut cpu = std::mem::take(&mut self.cpu).detach();
        cpu.install_memory(&mut self.memory);
        cpu.install_io(&mut self.io);
        let result = f(&mut cpu);
        self.cpu = cpu.detach();
        result
    }
}

#[wasm_bindgen]
impl WasmVm {
    /// Create an empty VM with the default register layout.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cpu: Cpu::default(),
            memory: FlatMemory::new(WASM_MEMORY_SIZE),
            io: BufferedIo::new(),
            program: Vec::new(),
        }
    }

    /// Change the PC and SP register indices. Resets the VM.
    #[wasm_bindgen]
    pub fn configure(&mut self, pc_register: usize, sp_register: usize) -> Result<(), JsError> {
        let config = CpuConfig::new(pc_register, sp_register)
            .map_err(|e| JsError::new(&e.to_string()))?;
        self.cpu = Cpu::new(config).map_err(|e| JsError::new(&e.to_string()))?;
        self.reset();
        Ok(())
    }

    /// Load a program image in text form. Returns the word count.
    #[wasm_bindgen]
    pub fn load_image(&mut self, source: &str) -> Result<usize, JsError> {
        let image = parse_image(source).map_err(|e| JsError::new(&e.to_string()))?;
        if image.len() > self.memory.len() {
            return Err(JsError::new(&format!(
                "program of {} words does not fit in {} words of memory",
                image.len(),
                self.memory.len()
            )));
        }

        self.program = image.words;
        self.reset();
        Ok(self.program.len())
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        if !self.cpu.is_running() {
            return Err(JsError::new("CPU is halted"));
        }

        match self.with_bus(|cpu| cpu.step()) {
            Ok(Step::Executed(instr)) => Ok(disassemble_word(instr.to_word())),
            Ok(Step::Faulted(fault)) => Err(JsError::new(&fault.to_string())),
            Ok(Step::Idle) => Err(JsError::new("CPU is halted")),
            Err(e) => Err(JsError::new(&e.to_string())),
        }
    }

    /// Run until halt, fault or max cycles. Returns the total cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        self.with_bus(|cpu| cpu.run_limited(max_cycles as u64))
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(self.cpu.cycles())
    }

    /// Reset CPU, memory and devices, then reload the program.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.memory.clear();
        self.io.clear();
        // Size was checked when the program was loaded.
        let _ = self.memory.load_program(0, &self.program);
        self.cpu.set_pc(0);
        self.cpu.set_running(!self.program.is_empty());
    }

    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// The fault that stopped the CPU, if any.
    #[wasm_bindgen]
    pub fn fault(&self) -> Option<String> {
        self.cpu.fault().map(|f| f.to_string())
    }

    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    #[wasm_bindgen]
    pub fn pc(&self) -> u64 {
        self.cpu.pc()
    }

    #[wasm_bindgen]
    pub fn flags(&self) -> String {
        self.cpu.flags().to_string()
    }

    /// Register value, or 0 for an index past the register file.
    #[wasm_bindgen]
    pub fn register(&self, index: usize) -> u64 {
        self.cpu.register(index).unwrap_or(0)
    }

    /// Full CPU state as a JSON document.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> String {
        serde_json::to_string(&self.cpu.snapshot()).unwrap_or_default()
    }

    /// Memory cell at `address`, or 0 outside memory.
    #[wasm_bindgen]
    pub fn memory_at(&self, address: u64) -> u64 {
        self.memory.read(address).unwrap_or(0)
    }

    /// Queue bytes for the input device.
    #[wasm_bindgen]
    pub fn push_input(&mut self, text: &str) {
        self.io.push_input(text.as_bytes());
    }

    /// Drain the output device as text.
    #[wasm_bindgen]
    pub fn take_output(&mut self) -> String {
        String::from_utf8_lossy(&self.io.take_output()).into_owned()
    }

    /// Drain the output device as raw bytes.
    #[wasm_bindgen]
    pub fn take_output_bytes(&mut self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.io.take_output().as_slice())
    }
}

impl Default for WasmVm {
    fn default() -> Self {
        Self::new()
    }
}

/// Disassemble a single instruction word.
#[wasm_bindgen]
pub fn wasm_disassemble(word: u64) -> String {
    disassemble_word(word)
}
