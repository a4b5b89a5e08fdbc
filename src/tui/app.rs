//! Debugger application state and logic.

use crate::config::HostConfig;
use crate::cpu::{BufferedIo, Cpu, CpuError, FlatMemory, Step, Word};
use crate::program::disasm::disassemble_word;
use std::collections::HashSet;
use std::io;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged. Callbacks are installed only for the
    /// duration of a step.
    pub cpu: Cpu<'static>,
    /// Backing store for the program and its data.
    pub memory: FlatMemory,
    /// Device table; program output is shown in its own pane.
    pub io: BufferedIo,
    /// Program words, reloaded on reset.
    pub program: Vec<Word>,
    /// Machine configuration.
    pub config: HostConfig,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<Word>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Fatal error that stopped the program, until reset.
    pub fatal: Option<CpuError>,
    /// Text written by the program so far.
    pub output: String,
    /// Memory view scroll offset.
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<Word>, config: HostConfig) -> io::Result<Self> {
        let invalid = |e: &dyn std::fmt::Display| io::Error::new(io::ErrorKind::InvalidInput, e.to_string());

        let cpu = Cpu::new(config.cpu).map_err(|e| invalid(&e))?;
        let mut app = Self {
            cpu,
            memory: FlatMemory::new(config.memory_size),
            io: BufferedIo::new(),
            program,
            config,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: String::new(),
            fatal: None,
            output: String::new(),
            mem_scroll: 0,
        };
        app.reset();
        if app.memory.load_program(app.config.load_address, &app.program).is_err() {
            return Err(invalid(&format!(
                "program of {} words does not fit in {} words of memory",
                app.program.len(),
                app.config.memory_size
            )));
        }
        app.status = "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into();
        Ok(app)
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if let Some(err) = &self.fatal {
            self.status = format!("Stopped by fatal error: {}. Press 'x' to reset.", err);
            self.running = false;
            return;
        }
        if !self.cpu.is_running() {
            self.status = format!("CPU halted after {} cycles", self.cpu.cycles());
            self.running = false;
            return;
        }

        let pc = self.cpu.pc();
        let mut cpu = std::mem::take(&mut self.cpu).detach();
        cpu.install_memory(&mut self.memory);
        cpu.install_io(&mut self.io);
        let result = cpu.step();
        self.cpu = cpu.detach();

        match result {
            Ok(Step::Executed(instr)) => {
                self.status = format!("PC={:04}: {}", pc, disassemble_word(instr.to_word()));
            }
            Ok(Step::Faulted(fault)) => {
                self.status = format!("Fault at PC={:04}: {}", pc, fault);
                self.running = false;
            }
            Ok(Step::Idle) => {
                self.running = false;
            }
            Err(e) => {
                self.status = format!("Fatal: {}", e);
                self.fatal = Some(e);
                self.running = false;
            }
        }

        let written = self.io.take_output();
        if !written.is_empty() {
            self.output.push_str(&String::from_utf8_lossy(&written));
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() || self.fatal.is_some() {
            self.running = false;
            self.status = format!("Halted after {} cycles", self.cpu.cycles());
            return;
        }

        // Check for breakpoint
        let pc = self.cpu.pc();
        if self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={}", pc);
            return;
        }

        self.step();
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.pc();
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={}", pc);
        }
    }

    /// Reset CPU, memory and devices to the freshly loaded program.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.memory.clear();
        // Fit was checked in `new`.
        let _ = self.memory.load_program(self.config.load_address, &self.program);
        self.io.clear();
        self.cpu.set_pc(self.config.load_address);
        self.cpu.set_running(true);
        self.fatal = None;
        self.output.clear();
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Get disassembly around current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(Word, String, bool)> {
        let pc = self.cpu.pc();
        let start = pc.saturating_sub(lines as Word / 2);

        (0..lines as Word)
            .filter_map(|i| {
                let addr = start.checked_add(i)?;
                let word = self.memory.read(addr).ok()?;
                Some((addr, disassemble_word(word), addr == pc))
            })
            .collect()
    }

    /// Scroll the memory view down, clamped to the last cell.
    pub fn scroll_down(&mut self) {
        if self.mem_scroll + 1 < self.memory.len() {
            self.mem_scroll += 1;
        }
    }

    pub fn scroll_up(&mut self) {
        self.mem_scroll = self.mem_scroll.saturating_sub(1);
    }
}

/// Mutes stderr logging while alive and restores the previous setting on
/// drop, including when the event loop returns early with an error.
struct MuteLog(bool);

impl MuteLog {
    fn new() -> Self {
        Self(crate::log::set_muted(true))
    }
}

impl Drop for MuteLog {
    fn drop(&mut self) {
        crate::log::set_muted(self.0);
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<Word>, config: HostConfig) -> io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Create app before touching the terminal so errors print normally
    let mut app = DebuggerApp::new(program, config)?;

    // Log lines would land on the alternate screen.
    let _mute = MuteLog::new();

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_up(),
                        KeyCode::Down => app.scroll_down(),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
