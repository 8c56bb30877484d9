use thiserror::Error;

use super::opcode::Opcode;

/// Most operands an instruction carries.
pub const MAX_OPERANDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{opcode} expects {expected} operands, got {got}")]
    OperandCount {
        opcode: Opcode,
        expected: usize,
        got: usize,
    },

    #[error("operand {value} of {opcode} does not fit in {width} byte(s)")]
    OperandOverflow {
        opcode: Opcode,
        value: usize,
        width: usize,
    },

    #[error("no patchable instruction at offset {offset}")]
    InvalidPatch { offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode 0x{byte:02x} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("truncated {opcode} instruction at offset {offset}")]
    Truncated { opcode: Opcode, offset: usize },

    #[error("instruction offset {offset} is out of bounds")]
    OutOfBounds { offset: usize },
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Operands in order; unused slots are zero
    pub operands: [usize; MAX_OPERANDS],
    /// Encoded size in bytes
    pub len: usize,
}

impl Instruction {
    pub fn operand(&self, i: usize) -> usize {
        self.operands[i]
    }
}

/// Encodes one instruction.
pub fn make(opcode: Opcode, operands: &[usize]) -> Result<Vec<u8>, EncodeError> {
    let widths = opcode.definition().operand_widths;
    if widths.len() != operands.len() {
        return Err(EncodeError::OperandCount {
            opcode,
            expected: widths.len(),
            got: operands.len(),
        });
    }

    let mut bytes = Vec::with_capacity(opcode.encoded_len());
    bytes.push(opcode as u8);
    for (&value, &width) in operands.iter().zip(widths) {
        if value >= 1usize << (width * 8) {
            return Err(EncodeError::OperandOverflow {
                opcode,
                value,
                width,
            });
        }
        for shift in (0..width).rev() {
            bytes.push((value >> (shift * 8)) as u8);
        }
    }
    Ok(bytes)
}

/// Decodes the instruction starting at `offset`, checking every byte read.
pub fn decode(code: &[u8], offset: usize) -> Result<Instruction, DecodeError> {
    let byte = *code
        .get(offset)
        .ok_or(DecodeError::OutOfBounds { offset })?;
    let opcode = Opcode::try_from(byte).map_err(|byte| DecodeError::UnknownOpcode { byte, offset })?;

    let mut operands = [0usize; MAX_OPERANDS];
    let mut cursor = offset + 1;
    for (slot, &width) in opcode.definition().operand_widths.iter().enumerate() {
        let bytes = code
            .get(cursor..cursor + width)
            .ok_or(DecodeError::Truncated { opcode, offset })?;
        operands[slot] = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
        cursor += width;
    }

    Ok(Instruction {
        opcode,
        operands,
        len: cursor - offset,
    })
}

/// Overwrites the first operand of the instruction at `offset`; used to
/// back-patch jump targets.
pub fn patch_operand(code: &mut [u8], offset: usize, value: usize) -> Result<(), EncodeError> {
    let opcode = code
        .get(offset)
        .and_then(|b| Opcode::try_from(*b).ok())
        .ok_or(EncodeError::InvalidPatch { offset })?;
    let patched = make(opcode, &[value])?;
    let target = code
        .get_mut(offset..offset + patched.len())
        .ok_or(EncodeError::InvalidPatch { offset })?;
    target.copy_from_slice(&patched);
    Ok(())
}

#[test]
fn test_make_big_endian() {
    let bytes = make(Opcode::Constant, &[65534]).unwrap();
    assert_eq!(bytes, vec![Opcode::Constant as u8, 0xFF, 0xFE]);

    let bytes = make(Opcode::LoadVar, &[1, 2]).unwrap();
    assert_eq!(bytes, vec![Opcode::LoadVar as u8, 0x00, 0x01, 0x02]);
}

#[test]
fn test_decode_rejects_truncated() {
    let code = [Opcode::Constant as u8, 0x00];
    assert!(matches!(
        decode(&code, 0),
        Err(DecodeError::Truncated { offset: 0, .. })
    ));
    assert!(matches!(
        decode(&[0xEE], 0),
        Err(DecodeError::UnknownOpcode { byte: 0xEE, .. })
    ));
}
