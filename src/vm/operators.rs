//! Arithmetic, bitwise, comparison and unary operator semantics.
//!
//! Numbers follow IEEE-754 except that division and modulo by zero are
//! errors. Bitwise operators only accept finite integral numbers.

use std::cmp::Ordering;

use crate::{
    bytecode::Opcode,
    value::Value,
    vm::VmError,
};

pub fn binary(op: Opcode, left: Value, right: Value) -> Result<Value, VmError> {
    let symbol = symbol(op);
    match op {
        Opcode::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(mut a), Value::String(b)) => {
                a.push_str(&b);
                Ok(Value::String(a))
            }
            (a, b) => Err(mismatch(symbol, &a, &b)),
        },

        Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Pow => {
            let (a, b) = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => (*a, *b),
                _ => return Err(mismatch(symbol, &left, &right)),
            };
            let result = match op {
                Opcode::Sub => a - b,
                Opcode::Mul => a * b,
                Opcode::Div if b == 0.0 => return Err(VmError::DivisionByZero),
                Opcode::Div => a / b,
                Opcode::Mod if b == 0.0 => return Err(VmError::ModuloByZero),
                // Rust's `%` on floats is fmod: the sign follows the dividend.
                Opcode::Mod => a % b,
                _ => a.powf(b),
            };
            Ok(Value::Number(result))
        }

        Opcode::BitAnd
        | Opcode::BitOr
        | Opcode::BitXor
        | Opcode::ShiftLeft
        | Opcode::ShiftRight => {
            let a = to_integer(symbol, &left, &right, &left)?;
            let b = to_integer(symbol, &left, &right, &right)?;
            let result = match op {
                Opcode::BitAnd => a & b,
                Opcode::BitOr => a | b,
                Opcode::BitXor => a ^ b,
                _ => {
                    if !(0..64).contains(&b) {
                        return Err(VmError::ShiftOutOfRange { amount: b });
                    }
                    if op == Opcode::ShiftLeft { a << b } else { a >> b }
                }
            };
            Ok(Value::Number(result as f64))
        }

        _ => Err(VmError::MalformedBytecode(format!("{} is not a binary operator", op))),
    }
}

pub fn unary(op: Opcode, operand: Value) -> Result<Value, VmError> {
    match (op, operand) {
        (Opcode::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
        (Opcode::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (Opcode::BitNot, Value::Number(n)) => {
            let n = exact_i64(n).ok_or(VmError::BitwiseNonInteger { op: "~" })?;
            Ok(Value::Number(!n as f64))
        }
        (Opcode::Negate | Opcode::BitNot, value) => Err(VmError::UnaryTypeMismatch {
            op: symbol(op),
            operand: value.type_name(),
        }),
        (op, _) => Err(VmError::MalformedBytecode(format!("{} is not a unary operator", op))),
    }
}

/// Comparison result. Every comparison involving NaN is `false` except `!=`.
pub fn compare(op: Opcode, left: &Value, right: &Value) -> Result<bool, VmError> {
    let symbol = symbol(op);
    match op {
        Opcode::Equal => equals(symbol, left, right),
        Opcode::NotEqual => equals(symbol, left, right).map(|eq| !eq),
        Opcode::Less | Opcode::Greater | Opcode::LessEqual | Opcode::GreaterEqual => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => return Err(mismatch(symbol, left, right)),
            };
            let Some(ordering) = ordering else {
                return Ok(false);
            };
            Ok(match op {
                Opcode::Less => ordering == Ordering::Less,
                Opcode::Greater => ordering == Ordering::Greater,
                Opcode::LessEqual => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        _ => Err(VmError::MalformedBytecode(format!("{} is not a comparison", op))),
    }
}

/// `null` equals only `null` and may be compared with anything; other values
/// must share a family. Arrays and objects compare structurally.
fn equals(symbol: &'static str, left: &Value, right: &Value) -> Result<bool, VmError> {
    match (left, right) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Number(a), Value::Number(b)) => Ok(a == b),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (Value::Boolean(a), Value::Boolean(b)) => Ok(a == b),
        (Value::Array(a), Value::Array(b)) => Ok(a == b),
        (Value::Object(a), Value::Object(b)) => Ok(a == b),
        _ => Err(mismatch(symbol, left, right)),
    }
}

/// `n` as an `i64` when it is integral and inside `[-2^63, 2^63)`.
fn exact_i64(n: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (n.fract() == 0.0 && (-LIMIT..LIMIT).contains(&n)).then_some(n as i64)
}

fn to_integer(symbol: &'static str, left: &Value, right: &Value, value: &Value) -> Result<i64, VmError> {
    match value {
        Value::Number(n) => exact_i64(*n).ok_or(VmError::BitwiseNonInteger { op: symbol }),
        _ => Err(mismatch(symbol, left, right)),
    }
}

fn mismatch(op: &'static str, left: &Value, right: &Value) -> VmError {
    VmError::TypeMismatch {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub | Opcode::Negate => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Mod => "%",
        Opcode::Pow => "**",
        Opcode::BitAnd => "&",
        Opcode::BitOr => "|",
        Opcode::BitXor | Opcode::BitNot => "~",
        Opcode::ShiftLeft => "<<",
        Opcode::ShiftRight => ">>",
        Opcode::Not => "!",
        Opcode::Equal => "==",
        Opcode::NotEqual => "!=",
        Opcode::Less => "<",
        Opcode::Greater => ">",
        Opcode::LessEqual => "<=",
        Opcode::GreaterEqual => ">=",
        Opcode::And => "&&",
        Opcode::Or => "||",
        _ => "?",
    }
}

#[test]
fn test_fmod_sign_follows_dividend() {
    let result = binary(Opcode::Mod, Value::Number(-7.0), Value::Number(3.0)).unwrap();
    assert_eq!(result, Value::Number(-1.0));
}

#[test]
fn test_negative_infinity_powers() {
    let odd = binary(Opcode::Pow, Value::Number(f64::NEG_INFINITY), Value::Number(3.0)).unwrap();
    let even = binary(Opcode::Pow, Value::Number(f64::NEG_INFINITY), Value::Number(2.0)).unwrap();
    assert_eq!(odd, Value::Number(f64::NEG_INFINITY));
    assert_eq!(even, Value::Number(f64::INFINITY));
}
