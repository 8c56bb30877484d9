//! Opcode table.
//!
//! Every instruction is one opcode byte followed by its operands, each a
//! big-endian unsigned integer of the width listed in [`Opcode::definition`].
//! The discriminants are part of the encoding and must not be reordered.

use std::fmt;

/// `Index`/`Slice` flag: a `null` target yields `null` (`?.`, `?[`), and an
/// out-of-range position yields `null`.
pub const FLAG_OPTIONAL: usize = 0b01;
/// `Index`/`LoadVar` flag: a missing key, position or variable yields `null`
/// (the access directly left of `??`).
pub const FLAG_SOFT: usize = 0b10;

/// `Pipe` alias operand meaning "no alias".
pub const NO_ALIAS: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // === Loads and stores ===
    /// Push constant `[index]`
    Constant = 0x00,
    /// Push context variable `[name index, flags]`
    LoadVar = 0x01,
    /// Push pipe-local `[name constant]`
    LoadLocal = 0x02,
    /// Bind the top of stack (without popping) to pipe-local `[name constant]`
    StoreLocal = 0x03,
    /// Discard the top of stack
    Pop = 0x04,

    // === Arithmetic (pop b, pop a, push a op b) ===
    Add = 0x10,
    Sub = 0x11,
    Mul = 0x12,
    Div = 0x13,
    Mod = 0x14,
    Pow = 0x15,

    // === Bitwise ===
    BitAnd = 0x20,
    BitOr = 0x21,
    BitXor = 0x22,
    /// Unary: pop a, push !a
    BitNot = 0x23,
    ShiftLeft = 0x24,
    ShiftRight = 0x25,

    // === Unary ===
    Negate = 0x30,
    Not = 0x31,

    // === Comparison ===
    Equal = 0x40,
    NotEqual = 0x41,
    Less = 0x42,
    Greater = 0x43,
    LessEqual = 0x44,
    GreaterEqual = 0x45,

    // === Logical (pop b, pop a, push bool) ===
    And = 0x50,
    Or = 0x51,

    // === Jumps (absolute byte offsets within the current block) ===
    /// Unconditional `[target]`
    Jump = 0x60,
    /// Pop; jump to `[target]` when falsy
    JumpIfFalse = 0x61,
    /// Falsy top: replace it with `false` and jump to `[target]`; else keep it
    AndShortCircuit = 0x62,
    /// Truthy top: replace it with `true` and jump to `[target]`; else keep it
    OrShortCircuit = 0x63,
    /// Non-null top: keep it and jump to `[target]`; null: pop it
    JumpIfNotNull = 0x64,

    // === Construction and access ===
    /// Pop `[count]` values into an array
    Array = 0x70,
    /// Pop `[count]` key/value pairs into an object
    Object = 0x71,
    /// Pop index, pop target, push element `[flags]`
    Index = 0x72,
    /// Pop step, end, start (null when omitted), pop target `[flags]`
    Slice = 0x73,

    // === Calls ===
    /// Call host function `[name constant, argc]`
    Call = 0x80,
    /// Run predicate block through a pipe handler
    /// `[pipe type constant, alias constant or NO_ALIAS, block index]`
    Pipe = 0x90,
}

/// Name and operand widths (in bytes) of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

impl Opcode {
    pub const ALL: [Opcode; 38] = [
        Opcode::Constant,
        Opcode::LoadVar,
        Opcode::LoadLocal,
        Opcode::StoreLocal,
        Opcode::Pop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Pow,
        Opcode::BitAnd,
        Opcode::BitOr,
        Opcode::BitXor,
        Opcode::BitNot,
        Opcode::ShiftLeft,
        Opcode::ShiftRight,
        Opcode::Negate,
        Opcode::Not,
        Opcode::Equal,
        Opcode::NotEqual,
        Opcode::Less,
        Opcode::Greater,
        Opcode::LessEqual,
        Opcode::GreaterEqual,
        Opcode::And,
        Opcode::Or,
        Opcode::Jump,
        Opcode::JumpIfFalse,
        Opcode::AndShortCircuit,
        Opcode::OrShortCircuit,
        Opcode::JumpIfNotNull,
        Opcode::Array,
        Opcode::Object,
        Opcode::Index,
        Opcode::Slice,
        Opcode::Call,
        Opcode::Pipe,
    ];

    pub fn definition(self) -> Definition {
        let (name, operand_widths): (&'static str, &'static [usize]) = match self {
            Opcode::Constant => ("Constant", &[2]),
            Opcode::LoadVar => ("LoadVar", &[2, 1]),
            Opcode::LoadLocal => ("LoadLocal", &[2]),
            Opcode::StoreLocal => ("StoreLocal", &[2]),
            Opcode::Pop => ("Pop", &[]),
            Opcode::Add => ("Add", &[]),
            Opcode::Sub => ("Sub", &[]),
            Opcode::Mul => ("Mul", &[]),
            Opcode::Div => ("Div", &[]),
            Opcode::Mod => ("Mod", &[]),
            Opcode::Pow => ("Pow", &[]),
            Opcode::BitAnd => ("BitAnd", &[]),
            Opcode::BitOr => ("BitOr", &[]),
            Opcode::BitXor => ("BitXor", &[]),
            Opcode::BitNot => ("BitNot", &[]),
            Opcode::ShiftLeft => ("ShiftLeft", &[]),
            Opcode::ShiftRight => ("ShiftRight", &[]),
            Opcode::Negate => ("Negate", &[]),
            Opcode::Not => ("Not", &[]),
            Opcode::Equal => ("Equal", &[]),
            Opcode::NotEqual => ("NotEqual", &[]),
            Opcode::Less => ("Less", &[]),
            Opcode::Greater => ("Greater", &[]),
            Opcode::LessEqual => ("LessEqual", &[]),
            Opcode::GreaterEqual => ("GreaterEqual", &[]),
            Opcode::And => ("And", &[]),
            Opcode::Or => ("Or", &[]),
            Opcode::Jump => ("Jump", &[2]),
            Opcode::JumpIfFalse => ("JumpIfFalse", &[2]),
            Opcode::AndShortCircuit => ("AndShortCircuit", &[2]),
            Opcode::OrShortCircuit => ("OrShortCircuit", &[2]),
            Opcode::JumpIfNotNull => ("JumpIfNotNull", &[2]),
            Opcode::Array => ("Array", &[2]),
            Opcode::Object => ("Object", &[2]),
            Opcode::Index => ("Index", &[1]),
            Opcode::Slice => ("Slice", &[1]),
            Opcode::Call => ("Call", &[2, 2]),
            Opcode::Pipe => ("Pipe", &[2, 2, 2]),
        };
        Definition {
            name,
            operand_widths,
        }
    }

    /// Total encoded size, opcode byte included.
    pub fn encoded_len(self) -> usize {
        1 + self.definition().operand_widths.iter().sum::<usize>()
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| *op as u8 == byte)
            .ok_or(byte)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.definition().name)
    }
}
