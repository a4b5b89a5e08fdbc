//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, List, ListItem, Paragraph, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::registers::{Flags, REGISTER_COUNT};
use crate::cpu::Word;
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let [code, side] =
        Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
            .areas(frame.area());
    let [disasm, regs, status] =
        Layout::vertical([Constraint::Min(10), Constraint::Length(8), Constraint::Length(3)])
            .areas(code);
    let [memory, output, help] =
        Layout::vertical([Constraint::Min(10), Constraint::Length(7), Constraint::Length(4)])
            .areas(side);

    draw_disassembly(frame, disasm, app);
    draw_registers(frame, regs, app);
    draw_status(frame, status, app);
    draw_memory(frame, memory, app);
    draw_output(frame, output, app);
    draw_help(frame, help);
}

fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:04}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else if instr.starts_with("???") {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(pane(" Disassembly ", Color::Cyan));

    frame.render_widget(list, area);
}

/// Register file in four columns, then flags and counters.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let config = app.cpu.config();
    let mut content: Vec<Line> = (0..REGISTER_COUNT / 4)
        .map(|row| {
            let spans: Vec<Span> = (0..4)
                .map(|col| {
                    let index = row * 4 + col;
                    let value = app.cpu.register(index).unwrap_or_default();
                    let style = if index == config.pc_register {
                        Style::default().fg(Color::Yellow)
                    } else if index == config.sp_register {
                        Style::default().fg(Color::Cyan)
                    } else if value != 0 {
                        Style::default().fg(Color::White)
                    } else {
                        Style::default().fg(Color::DarkGray)
                    };
                    Span::styled(format!("r{:<2} {:>12}  ", index, short_hex(value)), style)
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    let flags = app.cpu.flags();
    content.push(Line::from(vec![
        Span::raw("Flags: "),
        Span::styled(format!("{:<24}", flags), flag_style(flags)),
        Span::raw("Cycles: "),
        Span::styled(format!("{}", app.cpu.cycles()), Style::default().fg(Color::Cyan)),
        Span::raw("   Stack: "),
        Span::raw(format!("{}", app.cpu.stack.len())),
    ]));

    let paragraph = Paragraph::new(content)
        .block(pane(" Registers ", Color::Green));

    frame.render_widget(paragraph, area);
}

fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let pc = app.cpu.pc();
    let sp = app.cpu.sp();

    let items: Vec<ListItem> = app
        .memory
        .dump(app.mem_scroll, visible_rows)
        .into_iter()
        .map(|(addr, value)| {
            let text = format!("{:04}: {:#018x}", addr, value);

            let style = if addr as Word == pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if addr as Word == sp {
                Style::default().fg(Color::Cyan)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(pane(format!(" Memory ({} words) ", app.memory.len()), Color::Magenta));

    frame.render_widget(list, area);
}

/// Bytes the program has written through the write syscall.
fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let output = Paragraph::new(app.output.clone())
        .wrap(Wrap { trim: false })
        .block(pane(" Output ", Color::Blue));

    frame.render_widget(output, area);
}

fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let color = if app.fatal.is_some() || app.cpu.fault().is_some() {
        Color::Red
    } else {
        Color::White
    };
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(color))
        .block(pane(" Status ", Color::Gray));

    frame.render_widget(status, area);
}

fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  ↑↓: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(pane(" Help ", Color::Gray));

    frame.render_widget(help, area);
}

fn pane<'a>(title: impl Into<Line<'a>>, color: Color) -> Block<'a> {
    Block::bordered()
        .title(title)
        .border_style(Style::default().fg(color))
}

/// Hex without leading zeros, so sixteen registers fit the pane.
fn short_hex(value: Word) -> String {
    format!("{:#x}", value)
}

fn flag_style(flags: Flags) -> Style {
    if flags.contains(Flags::RUNNING) {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Red)
    }
}
