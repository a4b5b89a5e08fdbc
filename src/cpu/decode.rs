//! Instruction word codec.
//!
//! Every instruction occupies one 64-bit memory cell, viewed either as an
//! opaque [`Word`] or as a 16-bit opcode followed by three 16-bit operands:
//!
//! ```text
//!  63          48 47          32 31          16 15           0
//! +--------------+--------------+--------------+--------------+
//! |    args[2]   |    args[1]   |    args[0]   |    opcode    |
//! +--------------+--------------+--------------+--------------+
//! ```
//!
//! The two views are a lossless reinterpretation of the same bits.

use crate::cpu::Word;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Operation selector of a decoded instruction.
///
/// The discriminants are part of the program encoding and must not be
/// reordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize,
)]
#[repr(u16)]
pub enum Opcode {
    // ==================== Control ====================
    /// No operation
    Nop = 0,

    // ==================== Register arithmetic ====================
    /// r0 := r0 + r1
    Add = 1,
    /// r0 := r0 - r1
    Sub = 2,
    /// r0 := r0 * r1
    Mul = 3,
    /// r0 := r0 / r1
    Div = 4,

    // ==================== Immediate arithmetic ====================
    /// r0 := r0 + imm
    Addi = 5,
    /// r0 := r0 - imm
    Subi = 6,
    /// r0 := r0 * imm
    Muli = 7,
    /// r0 := r0 / imm
    Divi = 8,

    // ==================== Data Transfer ====================
    /// r0 := r1
    Mov = 9,
    /// r0 := imm
    Movi = 10,
    /// r0 := [addr]
    Load = 11,
    /// [addr] := r0
    Store = 12,

    // ==================== Control Flow ====================
    /// if r0 == r1 then PC := addr
    Beq = 13,
    /// if r0 != r1 then PC := addr
    Bne = 14,
    /// if r0 < r1 then PC := addr
    Blt = 15,
    /// if r0 > r1 then PC := addr
    Bgt = 16,
    /// PC := addr
    Jmp = 17,
    /// PC := r0
    JmpR = 18,
    /// Clear the running flag
    Halt = 19,
    /// Device I/O through descriptor r3 and data pointer r4
    Syscall = 20,
}

/// How an operand slot is interpreted by its opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandKind {
    /// Index into the register file.
    Register,
    /// Literal value, zero-extended to a word.
    Immediate,
    /// Literal memory address.
    Address,
}

use OperandKind::{Address as A, Immediate as I, Register as R};

impl Opcode {
    /// Every opcode, in encoding order.
    pub const ALL: [Opcode; 21] = [
        Opcode::Nop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Addi,
        Opcode::Subi,
        Opcode::Muli,
        Opcode::Divi,
        Opcode::Mov,
        Opcode::Movi,
        Opcode::Load,
        Opcode::Store,
        Opcode::Beq,
        Opcode::Bne,
        Opcode::Blt,
        Opcode::Bgt,
        Opcode::Jmp,
        Opcode::JmpR,
        Opcode::Halt,
        Opcode::Syscall,
    ];

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Addi => "ADDI",
            Opcode::Subi => "SUBI",
            Opcode::Muli => "MULI",
            Opcode::Divi => "DIVI",
            Opcode::Mov => "MOV",
            Opcode::Movi => "MOVI",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Beq => "BEQ",
            Opcode::Bne => "BNE",
            Opcode::Blt => "BLT",
            Opcode::Bgt => "BGT",
            Opcode::Jmp => "JMP",
            Opcode::JmpR => "JMPR",
            Opcode::Halt => "HALT",
            Opcode::Syscall => "SYSCALL",
        }
    }

    /// Meaning of each used operand slot, in slot order.
    ///
    /// Slots past the end of this list are ignored by the CPU and should be
    /// encoded as zero.
    pub fn operands(self) -> &'static [OperandKind] {
        match self {
            Opcode::Nop | Opcode::Halt | Opcode::Syscall => &[],
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mov => &[R, R],
            Opcode::Addi | Opcode::Subi | Opcode::Muli | Opcode::Divi | Opcode::Movi => &[R, I],
            Opcode::Load | Opcode::Store => &[R, A],
            Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bgt => &[R, R, A],
            Opcode::Jmp => &[A],
            Opcode::JmpR => &[R],
        }
    }

    /// Whether this opcode sets the PC itself instead of advancing it.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bgt | Opcode::Jmp | Opcode::JmpR
        )
    }
}

/// Decoded view of an instruction word.
///
/// The opcode field is kept raw: any bit pattern decodes, and whether the
/// value names a known [`Opcode`] is decided at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct InstructionWord {
    pub opcode: u16,
    pub args: [u16; 3],
}

impl InstructionWord {
    pub const fn new(opcode: u16, args: [u16; 3]) -> Self {
        Self { opcode, args }
    }

    /// Reinterpret a memory cell as an instruction.
    #[inline]
    pub const fn from_word(word: Word) -> Self {
        Self {
            opcode: word as u16,
            args: [(word >> 16) as u16, (word >> 32) as u16, (word >> 48) as u16],
        }
    }

    /// Reinterpret this instruction as a memory cell.
    #[inline]
    pub const fn to_word(self) -> Word {
        (self.opcode as Word)
            | (self.args[0] as Word) << 16
            | (self.args[1] as Word) << 32
            | (self.args[2] as Word) << 48
    }

    /// The opcode, if the field holds one of the defined values.
    pub fn op(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }
}

impl From<Word> for InstructionWord {
    fn from(word: Word) -> Self {
        Self::from_word(word)
    }
}

impl From<InstructionWord> for Word {
    fn from(instr: InstructionWord) -> Self {
        instr.to_word()
    }
}

/// Pack an opcode and three operands into one word.
///
/// Operand count is not checked against the opcode; unused slots should be
/// zero.
pub fn encode(opcode: Opcode, arg0: u16, arg1: u16, arg2: u16) -> Word {
    InstructionWord::new(opcode.into(), [arg0, arg1, arg2]).to_word()
}

/// Split a word into its opcode field and operands. Never fails.
pub fn decode(word: Word) -> InstructionWord {
    InstructionWord::from_word(word)
}
