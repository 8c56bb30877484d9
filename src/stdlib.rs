//! Standard library: host functions and extra pipe handlers installed by
//! [`LibContext::standard`].
//!
//! ```text
//! upper(trim(name))
//! round(price * 1.2, 2)
//! orders |filter: $item.total > 100 |sort: $item.total |map: $item.id
//! ```

use std::cmp::Ordering;

use indexmap::IndexMap;
use regex::Regex;
use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};

use crate::{
    value::{Map, Value},
    vm::{FunctionError, LibContext, PipeContext, VmError},
};

type FnResult = Result<Value, FunctionError>;

/// Installs every function and pipe handler of the standard library.
pub fn register(lib: &mut LibContext) {
    register_functions(lib);
    register_pipes(lib);
}

pub fn register_functions(lib: &mut LibContext) {
    // Strings
    lib.register_function("len", len)
        .register_function("substr", substr)
        .register_function("contains", contains)
        .register_function("startsWith", starts_with)
        .register_function("endsWith", ends_with)
        .register_function("upper", |args: &[Value]| {
            Ok(Value::String(string_arg(one(args)?, 0)?.to_uppercase()))
        })
        .register_function("lower", |args: &[Value]| {
            Ok(Value::String(string_arg(one(args)?, 0)?.to_lowercase()))
        })
        .register_function("trim", |args: &[Value]| {
            Ok(Value::from(string_arg(one(args)?, 0)?.trim()))
        })
        .register_function("split", split)
        .register_function("join", join)
        .register_function("replace", replace)
        .register_function("matches", matches);

    // Numbers
    lib.register_function("abs", |args: &[Value]| unary_math(args, f64::abs))
        .register_function("floor", |args: &[Value]| unary_math(args, f64::floor))
        .register_function("ceil", |args: &[Value]| unary_math(args, f64::ceil))
        .register_function("sqrt", |args: &[Value]| unary_math(args, f64::sqrt))
        .register_function("round", round)
        .register_function("min", |args: &[Value]| extremum(args, Ordering::Less))
        .register_function("max", |args: &[Value]| extremum(args, Ordering::Greater))
        .register_function("sum", |args: &[Value]| {
            let numbers = numbers_arg(one(args)?, 0)?;
            Ok(Value::Number(numbers.iter().sum()))
        })
        .register_function("avg", |args: &[Value]| {
            let numbers = numbers_arg(one(args)?, 0)?;
            if numbers.is_empty() {
                return Ok(Value::Null);
            }
            Ok(Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64))
        });

    // Objects and conversion
    lib.register_function("keys", |args: &[Value]| {
        let map = object_arg(one(args)?, 0)?;
        Ok(Value::Array(map.keys().map(|k| Value::from(k.as_str())).collect()))
    })
    .register_function("values", |args: &[Value]| {
        let map = object_arg(one(args)?, 0)?;
        Ok(Value::Array(map.values().cloned().collect()))
    })
    .register_function("type", |args: &[Value]| Ok(Value::from(one(args)?.type_name())))
    .register_function("str", |args: &[Value]| Ok(Value::String(one(args)?.as_string())))
    .register_function("num", num);
}

pub fn register_pipes(lib: &mut LibContext) {
    lib.register_pipe_handler("filter", filter_pipe)
        .register_pipe_handler("reduce", reduce_pipe)
        .register_pipe_handler("find", find_pipe)
        .register_pipe_handler("some", some_pipe)
        .register_pipe_handler("every", every_pipe)
        .register_pipe_handler("unique", unique_pipe)
        .register_pipe_handler("sort", sort_pipe)
        .register_pipe_handler("groupBy", group_by_pipe)
        .register_pipe_handler("flatMap", flat_map_pipe);
}

// ============================================================================
// Argument helpers
// ============================================================================

fn one(args: &[Value]) -> Result<&Value, FunctionError> {
    match args {
        [value] => Ok(value),
        _ => Err(FunctionError::arity("1", args.len())),
    }
}

fn arity(args: &[Value], min: usize, max: usize) -> Result<(), FunctionError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}-{}", min, max)
        };
        return Err(FunctionError::arity(&expected, args.len()));
    }
    Ok(())
}

fn string_arg(value: &Value, position: usize) -> Result<&str, FunctionError> {
    value
        .as_str()
        .ok_or_else(|| FunctionError::argument(position, "a string", value))
}

fn number_arg(value: &Value, position: usize) -> Result<f64, FunctionError> {
    value
        .as_number()
        .ok_or_else(|| FunctionError::argument(position, "a number", value))
}

fn integer_arg(value: &Value, position: usize) -> Result<i64, FunctionError> {
    match value {
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Ok(*n as i64),
        _ => Err(FunctionError::argument(position, "an integer", value)),
    }
}

fn array_arg(value: &Value, position: usize) -> Result<&[Value], FunctionError> {
    value
        .as_array()
        .ok_or_else(|| FunctionError::argument(position, "an array", value))
}

fn object_arg(value: &Value, position: usize) -> Result<&Map, FunctionError> {
    value
        .as_object()
        .ok_or_else(|| FunctionError::argument(position, "an object", value))
}

fn numbers_arg(value: &Value, position: usize) -> Result<Vec<f64>, FunctionError> {
    array_arg(value, position)?
        .iter()
        .map(|item| {
            item.as_number().ok_or_else(|| {
                FunctionError::new(format!(
                    "argument {} must contain only numbers, found {}",
                    position + 1,
                    item.type_name()
                ))
            })
        })
        .collect()
}

// ============================================================================
// String functions
// ============================================================================

fn len(args: &[Value]) -> FnResult {
    let count = match one(args)? {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Null => 0,
        other => return Err(FunctionError::argument(0, "a string, array or object", other)),
    };
    Ok(Value::from(count))
}

/// `substr(s, start, length?)`; a negative start counts from the end.
fn substr(args: &[Value]) -> FnResult {
    arity(args, 2, 3)?;
    let chars: Vec<char> = string_arg(&args[0], 0)?.chars().collect();
    let len = chars.len() as i64;

    let start = integer_arg(&args[1], 1)?;
    let start = if start < 0 { start.saturating_add(len).max(0) } else { start.min(len) };
    let end = match args.get(2) {
        Some(count) => {
            let count = integer_arg(count, 2)?;
            if count < 0 {
                return Err(FunctionError::new("length cannot be negative"));
            }
            start.saturating_add(count).min(len)
        }
        None => len,
    };

    Ok(Value::String(chars[start as usize..end as usize].iter().collect()))
}

fn contains(args: &[Value]) -> FnResult {
    arity(args, 2, 2)?;
    match (&args[0], &args[1]) {
        (Value::String(hay), needle) => Ok(Value::Boolean(hay.contains(string_arg(needle, 1)?))),
        (Value::Array(items), needle) => Ok(Value::Boolean(items.contains(needle))),
        (Value::Object(map), key) => Ok(Value::Boolean(map.contains_key(string_arg(key, 1)?))),
        (other, _) => Err(FunctionError::argument(0, "a string, array or object", other)),
    }
}

fn starts_with(args: &[Value]) -> FnResult {
    arity(args, 2, 2)?;
    let s = string_arg(&args[0], 0)?;
    Ok(Value::Boolean(s.starts_with(string_arg(&args[1], 1)?)))
}

fn ends_with(args: &[Value]) -> FnResult {
    arity(args, 2, 2)?;
    let s = string_arg(&args[0], 0)?;
    Ok(Value::Boolean(s.ends_with(string_arg(&args[1], 1)?)))
}

/// `split(s, sep)`; an empty separator splits into characters.
fn split(args: &[Value]) -> FnResult {
    arity(args, 2, 2)?;
    let s = string_arg(&args[0], 0)?;
    let sep = string_arg(&args[1], 1)?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::from).collect()
    };
    Ok(Value::Array(parts))
}

fn join(args: &[Value]) -> FnResult {
    arity(args, 1, 2)?;
    let items = array_arg(&args[0], 0)?;
    let sep = match args.get(1) {
        Some(sep) => string_arg(sep, 1)?,
        None => ",",
    };
    let parts: Vec<String> = items.iter().map(Value::as_string).collect();
    Ok(Value::String(parts.join(sep)))
}

fn replace(args: &[Value]) -> FnResult {
    arity(args, 3, 3)?;
    let s = string_arg(&args[0], 0)?;
    let from = string_arg(&args[1], 1)?;
    let to = string_arg(&args[2], 2)?;
    if from.is_empty() {
        return Ok(Value::from(s));
    }
    Ok(Value::String(s.replace(from, to)))
}

fn matches(args: &[Value]) -> FnResult {
    arity(args, 2, 2)?;
    let s = string_arg(&args[0], 0)?;
    let pattern = string_arg(&args[1], 1)?;
    let re = Regex::new(pattern).map_err(|e| FunctionError::new(format!("invalid regex: {e}")))?;
    Ok(Value::Boolean(re.is_match(s)))
}

// ============================================================================
// Numeric functions
// ============================================================================

fn unary_math(args: &[Value], f: fn(f64) -> f64) -> FnResult {
    Ok(Value::Number(f(number_arg(one(args)?, 0)?)))
}

/// `round(x, digits?)`: half away from zero, exact in decimal.
fn round(args: &[Value]) -> FnResult {
    arity(args, 1, 2)?;
    let x = number_arg(&args[0], 0)?;
    let digits = match args.get(1) {
        Some(digits) => integer_arg(digits, 1)?,
        None => 0,
    };
    if !(0..=28).contains(&digits) {
        return Err(FunctionError::new("digits must be between 0 and 28"));
    }
    if !x.is_finite() {
        return Ok(Value::Number(x));
    }

    let rounded = Decimal::from_f64(x)
        .map(|d| d.round_dp_with_strategy(digits as u32, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64());
    // Values outside the decimal range are already integral.
    Ok(Value::Number(rounded.unwrap_or(x)))
}

/// `min`/`max` over the arguments, or over a single array argument.
fn extremum(args: &[Value], wanted: Ordering) -> FnResult {
    let numbers = match args {
        [] => return Err(FunctionError::arity("at least 1", 0)),
        [Value::Array(_)] => numbers_arg(&args[0], 0)?,
        _ => args
            .iter()
            .enumerate()
            .map(|(i, arg)| number_arg(arg, i))
            .collect::<Result<Vec<_>, _>>()?,
    };

    let mut best: Option<f64> = None;
    for n in numbers {
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        best = match best {
            Some(b) if n.partial_cmp(&b) != Some(wanted) => Some(b),
            _ => Some(n),
        };
    }
    Ok(best.map(Value::Number).unwrap_or(Value::Null))
}

fn num(args: &[Value]) -> FnResult {
    match one(args)? {
        Value::Number(n) => Ok(Value::Number(*n)),
        Value::Boolean(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
        Value::String(s) => {
            let text = s.trim();
            let parsed = match text {
                "NaN" => Some(f64::NAN),
                "Inf" => Some(f64::INFINITY),
                "-Inf" => Some(f64::NEG_INFINITY),
                _ => text.parse::<f64>().ok().filter(|n| n.is_finite()),
            };
            parsed
                .map(Value::Number)
                .ok_or_else(|| FunctionError::new(format!("cannot convert \"{}\" to a number", s)))
        }
        other => Err(FunctionError::argument(0, "a number, string or boolean", other)),
    }
}

// ============================================================================
// Pipe handlers
// ============================================================================

fn filter_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    let mut kept = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if ctx.eval_item(item, index)?.is_truthy() {
            kept.push(item.clone());
        }
    }
    Ok(Value::Array(kept))
}

/// Folds the array; `$acc` starts as `null` and takes each stage result.
fn reduce_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    let mut acc = Value::Null;
    for (index, item) in items.iter().enumerate() {
        acc = ctx.eval(&[
            ("$item", item.clone()),
            ("$index", Value::from(index)),
            ("$acc", acc),
        ])?;
    }
    Ok(acc)
}

fn find_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    for (index, item) in items.iter().enumerate() {
        if ctx.eval_item(item, index)?.is_truthy() {
            return Ok(item.clone());
        }
    }
    Ok(Value::Null)
}

fn some_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    for (index, item) in items.iter().enumerate() {
        if ctx.eval_item(item, index)?.is_truthy() {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}

fn every_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    for (index, item) in items.iter().enumerate() {
        if !ctx.eval_item(item, index)?.is_truthy() {
            return Ok(Value::Boolean(false));
        }
    }
    Ok(Value::Boolean(true))
}

/// Keeps the first element for each distinct stage result.
fn unique_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    let mut seen: Vec<Value> = Vec::new();
    let mut kept = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let key = ctx.eval_item(item, index)?;
        if !seen.contains(&key) {
            seen.push(key);
            kept.push(item.clone());
        }
    }
    Ok(Value::Array(kept))
}

/// Stable ascending sort by the stage result.
fn sort_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    let mut keyed = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        keyed.push((ctx.eval_item(item, index)?, item.clone()));
    }
    keyed.sort_by(|(a, _), (b, _)| sort_order(a, b));
    Ok(Value::Array(keyed.into_iter().map(|(_, item)| item).collect()))
}

/// Groups elements into an object keyed by the stage result (as text), in
/// first-seen order.
fn group_by_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    let mut groups: IndexMap<String, Vec<Value>> = IndexMap::new();
    for (index, item) in items.iter().enumerate() {
        let key = ctx.eval_item(item, index)?.as_string();
        groups.entry(key).or_default().push(item.clone());
    }
    Ok(Value::Object(
        groups
            .into_iter()
            .map(|(key, group)| (key, Value::Array(group)))
            .collect(),
    ))
}

/// Maps each element and splices array results into the output.
fn flat_map_pipe(ctx: &mut PipeContext<'_>, input: Value) -> Result<Value, VmError> {
    let items = ctx.expect_array(&input)?;
    let mut output = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match ctx.eval_item(item, index)? {
            Value::Array(inner) => output.extend(inner),
            other => output.push(other),
        }
    }
    Ok(Value::Array(output))
}

/// Total order for sort keys: null, booleans, numbers (NaN last), strings,
/// then arrays and objects in input order.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.is_nan(), y.is_nan()) {
            (false, false) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (true, true) => Ordering::Equal,
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
