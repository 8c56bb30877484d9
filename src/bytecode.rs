//! Compiled program representation.
//!
//! A [`Bytecode`] holds the main instruction stream plus one extra stream per
//! pipe stage predicate (`blocks`). Pipe instructions refer to their block by
//! index, so a program is a single self-contained value that can be run any
//! number of times against different contexts.

pub mod instructions;
pub mod opcode;

use std::fmt::Write as _;

pub use instructions::{DecodeError, EncodeError, Instruction, decode, make};
pub use opcode::{FLAG_OPTIONAL, FLAG_SOFT, NO_ALIAS, Opcode};

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bytecode {
    pub instructions: Vec<u8>,
    /// Literal pool; also holds the names used by locals, calls and pipes
    pub constants: Vec<Value>,
    /// Distinct context variable names, indexed by `LoadVar`
    pub context_vars: Vec<String>,
    /// Predicate streams for pipe stages after the first
    pub blocks: Vec<Vec<u8>>,
}

impl Bytecode {
    /// Instruction stream for `block`, or the main stream for `None`.
    pub fn code(&self, block: Option<usize>) -> Option<&[u8]> {
        match block {
            None => Some(&self.instructions),
            Some(i) => self.blocks.get(i).map(Vec::as_slice),
        }
    }

    /// Constant at `index` as a name; names are always string constants.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.constants.get(index).and_then(Value::as_str)
    }

    /// Decodes every instruction of one stream.
    pub fn decode_all(code: &[u8]) -> Result<Vec<(usize, Instruction)>, DecodeError> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < code.len() {
            let instruction = decode(code, offset)?;
            out.push((offset, instruction));
            offset += instruction.len;
        }
        Ok(out)
    }

    /// Human-readable listing of the whole program.
    ///
    /// ```
    /// use tansy_lang::{compiler::compile, parser::{parse, ParserOptions}};
    ///
    /// let ast = parse("1 + x", &ParserOptions::default()).unwrap();
    /// let listing = compile(&ast).unwrap().disassemble();
    /// assert!(listing.contains("Constant"));
    /// assert!(listing.contains("LoadVar"));
    /// assert!(listing.contains("Add"));
    /// ```
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        out.push_str("== main ==\n");
        self.disassemble_stream(&self.instructions, &mut out);

        for (i, block) in self.blocks.iter().enumerate() {
            let _ = writeln!(out, "== block {} ==", i);
            self.disassemble_stream(block, &mut out);
        }

        if !self.constants.is_empty() {
            out.push_str("== constants ==\n");
            for (i, constant) in self.constants.iter().enumerate() {
                let _ = writeln!(out, "{:>4}  {}", i, constant);
            }
        }

        if !self.context_vars.is_empty() {
            out.push_str("== context ==\n");
            for (i, name) in self.context_vars.iter().enumerate() {
                let _ = writeln!(out, "{:>4}  {}", i, name);
            }
        }

        out
    }

    fn disassemble_stream(&self, code: &[u8], out: &mut String) {
        let mut offset = 0;
        while offset < code.len() {
            match decode(code, offset) {
                Ok(instruction) => {
                    let _ = writeln!(out, "{:04}  {}", offset, self.describe(&instruction));
                    offset += instruction.len;
                }
                Err(e) => {
                    let _ = writeln!(out, "{:04}  <{}>", offset, e);
                    return;
                }
            }
        }
    }

    fn describe(&self, instruction: &Instruction) -> String {
        let op = instruction.opcode;
        let arg = |i: usize| instruction.operand(i);
        let constant = |i: usize| {
            self.constants
                .get(i)
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".to_string())
        };
        let name = |i: usize| self.name_at(i).unwrap_or("?").to_string();

        match op {
            Opcode::Constant => format!("{:<16} {:>5} ({})", op, arg(0), constant(arg(0))),
            Opcode::LoadVar => {
                let var = self
                    .context_vars
                    .get(arg(0))
                    .map(String::as_str)
                    .unwrap_or("?");
                format!("{:<16} {:>5} ({}){}", op, arg(0), var, flags(arg(1)))
            }
            Opcode::LoadLocal | Opcode::StoreLocal => {
                format!("{:<16} {:>5} ({})", op, arg(0), name(arg(0)))
            }
            Opcode::Jump
            | Opcode::JumpIfFalse
            | Opcode::AndShortCircuit
            | Opcode::OrShortCircuit
            | Opcode::JumpIfNotNull => format!("{:<16} -> {:04}", op, arg(0)),
            Opcode::Array | Opcode::Object => format!("{:<16} {:>5}", op, arg(0)),
            Opcode::Index | Opcode::Slice => format!("{}{}", op, flags(arg(0))),
            Opcode::Call => format!("{:<16} {}/{}", op, name(arg(0)), arg(1)),
            Opcode::Pipe => {
                let alias = if arg(1) == NO_ALIAS {
                    String::new()
                } else {
                    format!(" as {}", name(arg(1)))
                };
                format!("{:<16} {}{} block {}", op, name(arg(0)), alias, arg(2))
            }
            _ => op.to_string(),
        }
    }
}

fn flags(bits: usize) -> String {
    let mut out = String::new();
    if bits & FLAG_OPTIONAL != 0 {
        out.push_str(" optional");
    }
    if bits & FLAG_SOFT != 0 {
        out.push_str(" soft");
    }
    out
}
