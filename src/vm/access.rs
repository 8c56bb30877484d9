//! Member, index and slice access.

use crate::{
    bytecode::{FLAG_OPTIONAL, FLAG_SOFT},
    value::{Value, format_number},
    vm::VmError,
};

/// `target[key]` / `target.key`.
///
/// With [`FLAG_OPTIONAL`] a `null` target yields `null`. Either flag turns a
/// missing key or an out-of-range position into `null`.
pub fn index(target: &Value, key: &Value, flags: usize) -> Result<Value, VmError> {
    let optional = flags & FLAG_OPTIONAL != 0;
    let forgiving = flags & (FLAG_OPTIONAL | FLAG_SOFT) != 0;

    match target {
        Value::Null if optional => Ok(Value::Null),
        Value::Null => Err(VmError::NullAccess {
            key: describe_key(key),
        }),

        Value::Object(map) => {
            let name = match key {
                Value::String(s) => s.clone(),
                Value::Number(n) => format_number(*n),
                other => {
                    return Err(VmError::InvalidIndex {
                        target: "object",
                        index: other.type_name(),
                    });
                }
            };
            match map.get(&name) {
                Some(value) => Ok(value.clone()),
                None if forgiving => Ok(Value::Null),
                None => Err(VmError::PropertyNotFound { key: name }),
            }
        }

        Value::Array(items) => {
            let position = integer_key(target, key)?;
            match resolve(position, items.len()) {
                Some(i) => Ok(items[i].clone()),
                None if forgiving => Ok(Value::Null),
                None => Err(VmError::IndexOutOfRange {
                    index: position,
                    len: items.len(),
                }),
            }
        }

        Value::String(s) => {
            let position = integer_key(target, key)?;
            let len = s.chars().count();
            match resolve(position, len).and_then(|i| s.chars().nth(i)) {
                Some(c) => Ok(Value::String(c.to_string())),
                None if forgiving => Ok(Value::Null),
                None => Err(VmError::IndexOutOfRange {
                    index: position,
                    len,
                }),
            }
        }

        other => Err(VmError::InvalidIndex {
            target: other.type_name(),
            index: key.type_name(),
        }),
    }
}

/// `target[start:end:step]`; omitted bounds arrive as `null`.
pub fn slice(
    target: &Value,
    start: &Value,
    end: &Value,
    step: &Value,
    flags: usize,
) -> Result<Value, VmError> {
    let step = match step {
        Value::Null => 1,
        Value::Number(n) if *n == 0.0 => {
            return Err(VmError::InvalidSlice("step cannot be zero".to_string()));
        }
        value => slice_bound("step", value)?.unwrap_or(1),
    };
    let start = slice_bound("start", start)?;
    let end = slice_bound("end", end)?;

    match target {
        Value::Null if flags & FLAG_OPTIONAL != 0 => Ok(Value::Null),
        Value::Null => Err(VmError::NullAccess {
            key: "a slice".to_string(),
        }),
        Value::Array(items) => {
            let picked = slice_positions(items.len(), start, end, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(Value::Array(picked))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_positions(chars.len(), start, end, step)
                .into_iter()
                .map(|i| chars[i])
                .collect();
            Ok(Value::String(picked))
        }
        other => Err(VmError::InvalidSlice(format!(
            "cannot slice {}",
            other.type_name()
        ))),
    }
}

/// Positions selected by a slice over a sequence of `len` elements.
///
/// Omitted bounds default by step direction (`0`/`len` ascending,
/// `len - 1`/before-the-start descending); given bounds count from the end
/// when negative and are clamped into range. Inverted ranges select nothing.
pub fn slice_positions(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |bound: i64| {
        let bound = if bound < 0 { bound.saturating_add(len) } else { bound };
        bound.clamp(lower, upper)
    };

    let start = start.map(clamp).unwrap_or(if step > 0 { lower } else { upper });
    let end = end.map(clamp).unwrap_or(if step > 0 { upper } else { lower });

    let mut positions = Vec::new();
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        positions.push(i as usize);
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    positions
}

fn slice_bound(name: &str, value: &Value) -> Result<Option<i64>, VmError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Ok(Some(*n as i64)),
        Value::Number(n) => Err(VmError::InvalidSlice(format!(
            "{} must be an integer, got {}",
            name,
            format_number(*n)
        ))),
        other => Err(VmError::InvalidSlice(format!(
            "{} must be a number, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn integer_key(target: &Value, key: &Value) -> Result<i64, VmError> {
    match key {
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Ok(*n as i64),
        other => Err(VmError::InvalidIndex {
            target: target.type_name(),
            index: other.type_name(),
        }),
    }
}

/// Maps a possibly negative position onto `0..len`.
fn resolve(position: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if position < 0 { position.checked_add(len)? } else { position };
    (0..len).contains(&i).then_some(i as usize)
}

fn describe_key(key: &Value) -> String {
    match key {
        Value::String(s) => format!("'{}'", s),
        other => format!("[{}]", other),
    }
}

#[test]
fn test_slice_positions() {
    assert_eq!(slice_positions(5, Some(1), Some(4), 1), vec![1, 2, 3]);
    assert_eq!(slice_positions(5, None, None, -1), vec![4, 3, 2, 1, 0]);
    assert_eq!(slice_positions(5, Some(4), Some(1), 1), Vec::<usize>::new());
    assert_eq!(slice_positions(5, Some(-2), None, 1), vec![3, 4]);
    assert_eq!(slice_positions(5, None, None, 2), vec![0, 2, 4]);
}
