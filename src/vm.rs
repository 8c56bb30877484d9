//! Stack virtual machine.
//!
//! A [`Vm`] executes a [`Bytecode`] program against a context map, using the
//! functions and pipe handlers of its [`LibContext`]. The VM owns its operand
//! stack and pipe-scope stack, so one instance serves one evaluation at a
//! time; the bytecode itself is never mutated and can be shared.

pub mod access;
pub mod operators;
pub mod pipes;

use std::{collections::HashMap, fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, instrument, trace};

pub use pipes::{PipeContext, default_pipe, map_pipe};

use crate::{
    bytecode::{Bytecode, DecodeError, FLAG_OPTIONAL, FLAG_SOFT, NO_ALIAS, Opcode, decode},
    value::{Map, Value},
};

/// Host function: receives its arguments in call order.
pub type HostFunction = Arc<dyn Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync>;

/// Pipe handler: receives the stage input and evaluates the stage block
/// through the [`PipeContext`] as often as it needs.
pub type PipeHandler =
    Arc<dyn Fn(&mut PipeContext<'_>, Value) -> Result<Value, VmError> + Send + Sync>;

/// Default operand stack capacity.
pub const DEFAULT_STACK_SIZE: usize = 2048;

/// Error reported by a host function.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct FunctionError {
    pub message: String,
}

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        FunctionError {
            message: message.into(),
        }
    }

    pub fn arity(expected: &str, got: usize) -> Self {
        FunctionError::new(format!("expected {} argument(s), got {}", expected, got))
    }

    pub fn argument(position: usize, expected: &str, got: &Value) -> Self {
        FunctionError::new(format!(
            "argument {} must be {}, got {}",
            position + 1,
            expected,
            got.type_name()
        ))
    }
}

/// Runtime failure. Every variant aborts the current run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot apply '{op}' to {operand}")]
    UnaryTypeMismatch {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulo by zero")]
    ModuloByZero,

    #[error("bitwise '{op}' requires finite integers")]
    BitwiseNonInteger { op: &'static str },

    #[error("shift amount {amount} is out of range 0..64")]
    ShiftOutOfRange { amount: i64 },

    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("cannot index {target} with {index}")]
    InvalidIndex {
        target: &'static str,
        index: &'static str,
    },

    #[error("invalid slice: {0}")]
    InvalidSlice(String),

    #[error("cannot read {key} of null")]
    NullAccess { key: String },

    #[error("property '{key}' not found")]
    PropertyNotFound { key: String },

    #[error("variable '{0}' is not provided")]
    UndefinedVariable(String),

    #[error("pipe variable '{0}' is not bound")]
    UndefinedLocal(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown pipe handler '{0}'")]
    UnknownPipe(String),

    #[error("{name}(): {source}")]
    Function {
        name: String,
        #[source]
        source: FunctionError,
    },

    #[error("{pipe} pipe expects {expected}, got {got}")]
    PipeInput {
        pipe: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("stack overflow (capacity {limit})")]
    StackOverflow { limit: usize },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("malformed bytecode: {0}")]
    Decode(#[from] DecodeError),

    #[error("malformed bytecode: {0}")]
    MalformedBytecode(String),
}

impl VmError {
    /// Coarse category, stable across releases.
    pub fn category(&self) -> &'static str {
        match self {
            VmError::TypeMismatch { .. }
            | VmError::UnaryTypeMismatch { .. }
            | VmError::InvalidIndex { .. }
            | VmError::PipeInput { .. } => "type",
            VmError::DivisionByZero
            | VmError::ModuloByZero
            | VmError::BitwiseNonInteger { .. }
            | VmError::ShiftOutOfRange { .. } => "arithmetic",
            VmError::IndexOutOfRange { .. }
            | VmError::InvalidSlice(_)
            | VmError::NullAccess { .. }
            | VmError::PropertyNotFound { .. } => "access",
            VmError::UndefinedVariable(_) | VmError::UndefinedLocal(_) => "reference",
            VmError::UnknownFunction(_) | VmError::UnknownPipe(_) | VmError::Function { .. } => {
                "function"
            }
            VmError::StackOverflow { .. } | VmError::StackUnderflow => "stack",
            VmError::Decode(_) | VmError::MalformedBytecode(_) => "bytecode",
        }
    }
}

/// Host-supplied functions and pipe handlers.
#[derive(Clone, Default)]
pub struct LibContext {
    pub functions: HashMap<String, HostFunction>,
    pub pipe_handlers: HashMap<String, PipeHandler>,
}

impl LibContext {
    /// Registry with the built-in `default` (`|:`) and `map` pipe handlers.
    pub fn new() -> Self {
        let mut lib = LibContext::default();
        lib.register_pipe_handler(crate::ast::DEFAULT_PIPE, default_pipe);
        lib.register_pipe_handler("map", map_pipe);
        lib
    }

    /// [`LibContext::new`] plus the standard function library and the extra
    /// pipe handlers.
    pub fn standard() -> Self {
        let mut lib = LibContext::new();
        crate::stdlib::register(&mut lib);
        lib
    }

    pub fn register_function<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn register_pipe_handler<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut PipeContext<'_>, Value) -> Result<Value, VmError> + Send + Sync + 'static,
    {
        self.pipe_handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn has_pipe_handler(&self, name: &str) -> bool {
        self.pipe_handlers.contains_key(name)
    }
}

impl fmt::Debug for LibContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        functions.sort();
        let mut pipes: Vec<&String> = self.pipe_handlers.keys().collect();
        pipes.sort();
        f.debug_struct("LibContext")
            .field("functions", &functions)
            .field("pipe_handlers", &pipes)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Operand stack capacity; pushing past it is a [`VmError::StackOverflow`]
    pub stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Execution state of one instruction stream.
#[derive(Debug, Clone, Copy)]
struct Frame {
    ip: usize,
    /// Stack height when the frame started; it never pops below this
    base_pointer: usize,
}

#[derive(Debug)]
pub struct Vm {
    lib: LibContext,
    config: VmConfig,
    stack: Vec<Value>,
    /// Innermost scope last; index 0 holds pipe aliases
    scopes: Vec<HashMap<String, Value>>,
}

impl Vm {
    pub fn new(lib: LibContext) -> Self {
        Vm::with_config(lib, VmConfig::default())
    }

    pub fn with_config(lib: LibContext, config: VmConfig) -> Self {
        Vm {
            lib,
            config,
            stack: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn lib(&self) -> &LibContext {
        &self.lib
    }

    pub fn lib_mut(&mut self) -> &mut LibContext {
        &mut self.lib
    }

    pub fn config(&self) -> VmConfig {
        self.config
    }

    /// Runs a program and returns the value it leaves on the stack.
    ///
    /// ```
    /// use tansy_lang::{compiler::compile, parser::{parse, ParserOptions}};
    /// use tansy_lang::{LibContext, Map, Value, Vm};
    ///
    /// let ast = parse("total * 2", &ParserOptions::default()).unwrap();
    /// let bytecode = compile(&ast).unwrap();
    ///
    /// let mut context = Map::new();
    /// context.insert("total".to_string(), Value::Number(21.0));
    ///
    /// let mut vm = Vm::new(LibContext::new());
    /// assert_eq!(vm.run(&bytecode, &context).unwrap(), Value::Number(42.0));
    /// ```
    #[instrument(skip_all)]
    pub fn run(&mut self, bytecode: &Bytecode, context: &Map) -> Result<Value, VmError> {
        self.stack.clear();
        self.scopes.clear();
        self.scopes.push(HashMap::new());

        let result = self.execute(bytecode, None, context);

        self.scopes.clear();
        match &result {
            Ok(value) => debug!(result_type = value.type_name(), "program finished"),
            Err(e) => debug!(error = %e, category = e.category(), "program failed"),
        }
        result
    }

    /// Runs the main stream (`None`) or one predicate block to completion.
    fn execute(
        &mut self,
        bytecode: &Bytecode,
        block: Option<usize>,
        context: &Map,
    ) -> Result<Value, VmError> {
        let code = bytecode.code(block).ok_or_else(|| {
            VmError::MalformedBytecode(format!("block {} does not exist", block.unwrap_or(0)))
        })?;

        let mut frame = Frame {
            ip: 0,
            base_pointer: self.stack.len(),
        };
        if let Err(e) = self.run_frame(bytecode, code, &mut frame, context) {
            self.stack.truncate(frame.base_pointer);
            return Err(e);
        }

        let value = self.pop(&frame)?;
        if self.stack.len() != frame.base_pointer {
            self.stack.truncate(frame.base_pointer);
            return Err(VmError::MalformedBytecode(
                "program left extra values on the stack".to_string(),
            ));
        }
        Ok(value)
    }

    fn run_frame(
        &mut self,
        bytecode: &Bytecode,
        code: &[u8],
        frame: &mut Frame,
        context: &Map,
    ) -> Result<(), VmError> {
        while frame.ip < code.len() {
            let instruction = decode(code, frame.ip)?;
            frame.ip += instruction.len;
            let op = instruction.opcode;
            let arg = |i: usize| instruction.operand(i);

            match op {
                Opcode::Constant => {
                    let value = bytecode.constants.get(arg(0)).cloned().ok_or_else(|| {
                        VmError::MalformedBytecode(format!("constant {} does not exist", arg(0)))
                    })?;
                    self.push(value)?;
                }

                Opcode::LoadVar => {
                    let name = bytecode.context_vars.get(arg(0)).ok_or_else(|| {
                        VmError::MalformedBytecode(format!("context name {} does not exist", arg(0)))
                    })?;
                    let value = match context.get(name) {
                        Some(value) => value.clone(),
                        None if arg(1) & (FLAG_OPTIONAL | FLAG_SOFT) != 0 => Value::Null,
                        None => return Err(VmError::UndefinedVariable(name.clone())),
                    };
                    self.push(value)?;
                }

                Opcode::LoadLocal => {
                    let name = name_operand(bytecode, arg(0))?;
                    let value = self
                        .scopes
                        .iter()
                        .rev()
                        .find_map(|scope| scope.get(name))
                        .cloned()
                        .ok_or_else(|| VmError::UndefinedLocal(name.to_string()))?;
                    self.push(value)?;
                }

                Opcode::StoreLocal => {
                    let name = name_operand(bytecode, arg(0))?;
                    let value = self.peek(frame)?.clone();
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.insert(name.to_string(), value);
                    }
                }

                Opcode::Pop => {
                    self.pop(frame)?;
                }

                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::Pow
                | Opcode::BitAnd
                | Opcode::BitOr
                | Opcode::BitXor
                | Opcode::ShiftLeft
                | Opcode::ShiftRight => {
                    let right = self.pop(frame)?;
                    let left = self.pop(frame)?;
                    self.push(operators::binary(op, left, right)?)?;
                }

                Opcode::Equal
                | Opcode::NotEqual
                | Opcode::Less
                | Opcode::Greater
                | Opcode::LessEqual
                | Opcode::GreaterEqual => {
                    let right = self.pop(frame)?;
                    let left = self.pop(frame)?;
                    self.push(Value::Boolean(operators::compare(op, &left, &right)?))?;
                }

                Opcode::Negate | Opcode::Not | Opcode::BitNot => {
                    let operand = self.pop(frame)?;
                    self.push(operators::unary(op, operand)?)?;
                }

                Opcode::And | Opcode::Or => {
                    let right = self.pop(frame)?.is_truthy();
                    let left = self.pop(frame)?.is_truthy();
                    let result = if op == Opcode::And {
                        left && right
                    } else {
                        left || right
                    };
                    self.push(Value::Boolean(result))?;
                }

                Opcode::Jump => {
                    frame.ip = jump_target(code, arg(0))?;
                }

                Opcode::JumpIfFalse => {
                    let condition = self.pop(frame)?;
                    if !condition.is_truthy() {
                        frame.ip = jump_target(code, arg(0))?;
                    }
                }

                Opcode::AndShortCircuit | Opcode::OrShortCircuit => {
                    let truthy = self.peek(frame)?.is_truthy();
                    let decided = if op == Opcode::AndShortCircuit {
                        !truthy
                    } else {
                        truthy
                    };
                    if decided {
                        self.pop(frame)?;
                        self.push(Value::Boolean(truthy))?;
                        frame.ip = jump_target(code, arg(0))?;
                    }
                }

                Opcode::JumpIfNotNull => {
                    if self.peek(frame)?.is_null() {
                        self.pop(frame)?;
                    } else {
                        frame.ip = jump_target(code, arg(0))?;
                    }
                }

                Opcode::Array => {
                    let items = self.pop_n(frame, arg(0))?;
                    self.push(Value::Array(items))?;
                }

                Opcode::Object => {
                    let flat = self.pop_n(frame, arg(0) * 2)?;
                    let mut map = Map::with_capacity(arg(0));
                    let mut pairs = flat.into_iter();
                    while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
                        map.insert(key.as_string(), value);
                    }
                    self.push(Value::Object(map))?;
                }

                Opcode::Index => {
                    let key = self.pop(frame)?;
                    let target = self.pop(frame)?;
                    self.push(access::index(&target, &key, arg(0))?)?;
                }

                Opcode::Slice => {
                    let step = self.pop(frame)?;
                    let end = self.pop(frame)?;
                    let start = self.pop(frame)?;
                    let target = self.pop(frame)?;
                    self.push(access::slice(&target, &start, &end, &step, arg(0))?)?;
                }

                Opcode::Call => {
                    let name = name_operand(bytecode, arg(0))?;
                    let function = self
                        .lib
                        .functions
                        .get(name)
                        .cloned()
                        .ok_or_else(|| VmError::UnknownFunction(name.to_string()))?;
                    let args = self.pop_n(frame, arg(1))?;
                    let result = function(&args).map_err(|source| VmError::Function {
                        name: name.to_string(),
                        source,
                    })?;
                    self.push(result)?;
                }

                Opcode::Pipe => {
                    let pipe_type = name_operand(bytecode, arg(0))?;
                    let handler = self
                        .lib
                        .pipe_handlers
                        .get(pipe_type)
                        .cloned()
                        .ok_or_else(|| VmError::UnknownPipe(pipe_type.to_string()))?;
                    let block = arg(2);
                    if block >= bytecode.blocks.len() {
                        return Err(VmError::MalformedBytecode(format!(
                            "block {} does not exist",
                            block
                        )));
                    }

                    let input = self.pop(frame)?;
                    trace!(pipe = pipe_type, block, input = input.type_name(), "pipe stage");
                    let mut ctx = PipeContext::new(self, bytecode, block, context, pipe_type);
                    let output = handler(&mut ctx, input)?;

                    if arg(1) != NO_ALIAS {
                        let alias = name_operand(bytecode, arg(1))?;
                        if let Some(base) = self.scopes.first_mut() {
                            base.insert(alias.to_string(), output.clone());
                        }
                    }
                    self.push(output)?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Pipe scopes
    // ========================================================================

    /// Runs predicate block `block` with `bindings` in a fresh innermost scope.
    pub(crate) fn eval_block(
        &mut self,
        bytecode: &Bytecode,
        block: usize,
        context: &Map,
        bindings: Vec<(String, Value)>,
    ) -> Result<Value, VmError> {
        self.scopes.push(bindings.into_iter().collect());
        let result = self.execute(bytecode, Some(block), context);
        self.scopes.pop();
        result
    }

    // ========================================================================
    // Stack
    // ========================================================================

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= self.config.stack_size {
            return Err(VmError::StackOverflow {
                limit: self.config.stack_size,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, frame: &Frame) -> Result<Value, VmError> {
        if self.stack.len() <= frame.base_pointer {
            return Err(VmError::StackUnderflow);
        }
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn peek(&self, frame: &Frame) -> Result<&Value, VmError> {
        if self.stack.len() <= frame.base_pointer {
            return Err(VmError::StackUnderflow);
        }
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    /// Pops `count` values, returned in push order.
    fn pop_n(&mut self, frame: &Frame, count: usize) -> Result<Vec<Value>, VmError> {
        if self.stack.len() < frame.base_pointer + count {
            return Err(VmError::StackUnderflow);
        }
        let at = self.stack.len() - count;
        Ok(self.stack.split_off(at))
    }
}

fn name_operand(bytecode: &Bytecode, index: usize) -> Result<&str, VmError> {
    bytecode
        .name_at(index)
        .ok_or_else(|| VmError::MalformedBytecode(format!("constant {} is not a name", index)))
}

fn jump_target(code: &[u8], target: usize) -> Result<usize, VmError> {
    if target > code.len() {
        return Err(VmError::MalformedBytecode(format!(
            "jump target {} is past the end of the block",
            target
        )));
    }
    Ok(target)
}

#[test]
fn test_stack_overflow_is_an_error() {
    use crate::bytecode::make;

    let mut code = Vec::new();
    for _ in 0..4 {
        code.extend(make(Opcode::Constant, &[0]).unwrap());
    }
    let bytecode = Bytecode {
        instructions: code,
        constants: vec![Value::Number(1.0)],
        ..Bytecode::default()
    };

    let mut vm = Vm::with_config(LibContext::new(), VmConfig { stack_size: 3 });
    let err = vm.run(&bytecode, &Map::new()).unwrap_err();
    assert_eq!(err, VmError::StackOverflow { limit: 3 });
    assert_eq!(err.category(), "stack");
}

#[test]
fn test_truncated_bytecode_is_an_error() {
    let bytecode = Bytecode {
        instructions: vec![Opcode::Constant as u8, 0x00],
        constants: vec![Value::Null],
        ..Bytecode::default()
    };
    let err = Vm::new(LibContext::new())
        .run(&bytecode, &Map::new())
        .unwrap_err();
    assert_eq!(err.category(), "bytecode");
}
