//! Disassembler.
//!
//! Renders instruction words as readable assembly text.

use crate::cpu::decode::{decode, InstructionWord, OperandKind};
use crate::cpu::Word;

/// Disassemble a single word.
///
/// Words whose opcode field is not defined come out as `???` followed by
/// the raw word, so data cells in a listing stay recognizable.
pub fn disassemble_word(word: Word) -> String {
    format_instruction(&decode(word))
}

/// Disassemble a slice of words into an addressed listing.
pub fn disassemble(words: &[Word]) -> String {
    let mut output = String::new();
    output.push_str("; regvm disassembly\n");
    output.push_str("; -----------------\n\n");

    for (addr, &word) in words.iter().enumerate() {
        let line = disassemble_word(word);
        output.push_str(&format!("{:04}: {:<24} ; {:#018x}\n", addr, line, word));
    }

    output
}

/// Format a decoded instruction as assembly text.
fn format_instruction(instr: &InstructionWord) -> String {
    let Some(op) = instr.op() else {
        return format!("??? {:#018x}", instr.to_word());
    };

    let operands: Vec<String> = op
        .operands()
        .iter()
        .zip(instr.args)
        .map(|(kind, value)| format_operand(*kind, value))
        .collect();

    if operands.is_empty() {
        op.mnemonic().to_string()
    } else {
        format!("{} {}", op.mnemonic(), operands.join(", "))
    }
}

fn format_operand(kind: OperandKind, value: u16) -> String {
    match kind {
        OperandKind::Register => format!("r{}", value),
        OperandKind::Immediate => format!("{}", value),
        OperandKind::Address => format!("@{}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, Opcode};

    #[test]
    fn test_disassemble_halt() {
        assert_eq!(disassemble_word(encode(Opcode::Halt, 0, 0, 0)), "HALT");
    }

    #[test]
    fn test_disassemble_operand_kinds() {
        assert_eq!(disassemble_word(encode(Opcode::Add, 2, 3, 0)), "ADD r2, r3");
        assert_eq!(disassemble_word(encode(Opcode::Movi, 2, 5, 0)), "MOVI r2, 5");
        assert_eq!(disassemble_word(encode(Opcode::Beq, 2, 3, 12)), "BEQ r2, r3, @12");
        assert_eq!(disassemble_word(encode(Opcode::JmpR, 6, 0, 0)), "JMPR r6");
    }

    #[test]
    fn test_disassemble_unknown() {
        assert!(disassemble_word(0x41).starts_with("???"));
    }

    #[test]
    fn test_listing_addresses() {
        let listing = disassemble(&[encode(Opcode::Nop, 0, 0, 0), encode(Opcode::Halt, 0, 0, 0)]);
        assert!(listing.contains("0000: NOP"));
        assert!(listing.contains("0001: HALT"));
    }
}
