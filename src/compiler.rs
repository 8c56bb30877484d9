//! AST to bytecode compiler.
//!
//! The compiler walks the tree once. Literals go to the constant pool (every
//! occurrence gets its own slot), `$`-prefixed names become pipe-local loads,
//! and every other identifier becomes a context load against a deduplicated
//! name table. Each pipe stage after the first is compiled into its own
//! predicate block.

use indexmap::IndexSet;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    ast::{BinOp, Expr, ExprKind, PipeStage, Position, Property, UnaryOp},
    bytecode::{
        Bytecode, EncodeError, FLAG_OPTIONAL, FLAG_SOFT, NO_ALIAS, Opcode, instructions,
    },
    value::Value,
};

/// Deepest expression nesting the compiler will recurse into.
pub const MAX_NESTING: usize = 1024;

const MAX_INDEX: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("{position}: only named functions can be called")]
    InvalidCallee { position: Position },

    #[error("{position}: constant pool is full ({limit} entries)")]
    TooManyConstants { position: Position, limit: usize },

    #[error("{position}: too many context variables (limit {limit})")]
    TooManyVariables { position: Position, limit: usize },

    #[error("{position}: {count} elements exceed the limit of {limit}")]
    TooManyElements {
        position: Position,
        count: usize,
        limit: usize,
    },

    #[error("{position}: too many pipe stages (limit {limit})")]
    TooManyBlocks { position: Position, limit: usize },

    #[error("{position}: pipe expressions are only allowed at the top level")]
    NestedPipe { position: Position },

    #[error("{position}: expression nested deeper than {limit} levels")]
    NestingTooDeep { position: Position, limit: usize },

    #[error("bytecode encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

/// Instruction buffer for the block being compiled.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Vec<u8>,
}

pub struct Compiler {
    constants: Vec<Value>,
    context_vars: IndexSet<String>,
    blocks: Vec<Vec<u8>>,
    scopes: Vec<CompilationScope>,
    depth: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles a parsed program.
///
/// ```
/// use tansy_lang::{compiler::compile, parser::{parse, ParserOptions}};
///
/// let ast = parse("price * qty", &ParserOptions::default()).unwrap();
/// let bytecode = compile(&ast).unwrap();
/// assert_eq!(bytecode.context_vars, vec!["price", "qty"]);
/// ```
pub fn compile(expr: &Expr) -> Result<Bytecode, CompileError> {
    Compiler::new().compile(expr)
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            constants: Vec::new(),
            context_vars: IndexSet::new(),
            blocks: Vec::new(),
            scopes: vec![CompilationScope::default()],
            depth: 0,
        }
    }

    #[instrument(skip_all)]
    pub fn compile(mut self, expr: &Expr) -> Result<Bytecode, CompileError> {
        match &expr.kind {
            ExprKind::Pipe(stages) => self.compile_pipe(stages, expr.position)?,
            _ => self.compile_expr(expr)?,
        }

        let main = self.scopes.pop().unwrap_or_default();
        let bytecode = Bytecode {
            instructions: main.instructions,
            constants: self.constants,
            context_vars: self.context_vars.into_iter().collect(),
            blocks: self.blocks,
        };
        debug!(
            bytes = bytecode.instructions.len(),
            constants = bytecode.constants.len(),
            context_vars = bytecode.context_vars.len(),
            blocks = bytecode.blocks.len(),
            "compiled program"
        );
        Ok(bytecode)
    }

    // ========================================================================
    // Pipes
    // ========================================================================

    fn compile_pipe(&mut self, stages: &[PipeStage], position: Position) -> Result<(), CompileError> {
        let Some((head, rest)) = stages.split_first() else {
            self.emit_constant(Value::Null, position)?;
            return Ok(());
        };

        self.compile_expr(&head.expression)?;
        if let Some(alias) = &head.alias {
            let name = self.add_constant(Value::from(alias.as_str()), head.position)?;
            self.emit(Opcode::StoreLocal, &[name])?;
        }

        for stage in rest {
            let pipe_type = self.add_constant(Value::from(stage.pipe_type.as_str()), stage.position)?;
            let alias = match &stage.alias {
                Some(alias) => self.add_constant(Value::from(alias.as_str()), stage.position)?,
                None => NO_ALIAS,
            };
            let block = self.compile_block(&stage.expression, stage.position)?;
            self.emit(Opcode::Pipe, &[pipe_type, alias, block])?;
        }
        Ok(())
    }

    fn compile_block(&mut self, expr: &Expr, position: Position) -> Result<usize, CompileError> {
        if self.blocks.len() >= MAX_INDEX {
            return Err(CompileError::TooManyBlocks {
                position,
                limit: MAX_INDEX,
            });
        }

        self.scopes.push(CompilationScope::default());
        let compiled = self.compile_expr(expr);
        let scope = self.scopes.pop().unwrap_or_default();
        compiled?;

        self.blocks.push(scope.instructions);
        Ok(self.blocks.len() - 1)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        if self.depth >= MAX_NESTING {
            return Err(CompileError::NestingTooDeep {
                position: expr.position,
                limit: MAX_NESTING,
            });
        }
        self.depth += 1;
        let result = self.compile_kind(expr);
        self.depth -= 1;
        result
    }

    fn compile_kind(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let position = expr.position;
        match &expr.kind {
            ExprKind::Number(n) => self.emit_constant(Value::Number(*n), position),
            ExprKind::String { value, .. } => self.emit_constant(Value::from(value.as_str()), position),
            ExprKind::Boolean(b) => self.emit_constant(Value::Boolean(*b), position),
            ExprKind::Null => self.emit_constant(Value::Null, position),

            ExprKind::Identifier { name, optional } => {
                let flags = if *optional { FLAG_OPTIONAL } else { 0 };
                self.load_identifier(name, flags, position)
            }

            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand)?;
                let opcode = match op {
                    UnaryOp::Negate => Opcode::Negate,
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::BitNot => Opcode::BitNot,
                };
                self.emit(opcode, &[])?;
                Ok(())
            }

            ExprKind::Binary { op, left, right } => self.compile_binary(*op, left, right),

            ExprKind::Conditional {
                condition,
                consequent,
                alternate,
            } => {
                self.compile_expr(condition)?;
                let to_alternate = self.emit(Opcode::JumpIfFalse, &[0])?;
                self.compile_expr(consequent)?;
                let to_end = self.emit(Opcode::Jump, &[0])?;
                self.patch_jump(to_alternate)?;
                self.compile_expr(alternate)?;
                self.patch_jump(to_end)
            }

            ExprKind::Array(items) => {
                let count = Self::check_count(items.len(), position)?;
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Opcode::Array, &[count])?;
                Ok(())
            }

            ExprKind::Object(entries) => {
                let count = Self::check_count(entries.len(), position)?;
                // Stable sort: with duplicate keys the last one still wins.
                let mut sorted: Vec<&(String, Expr)> = entries.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                for (key, value) in sorted {
                    self.emit_constant(Value::from(key.as_str()), position)?;
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::Object, &[count])?;
                Ok(())
            }

            ExprKind::Call { callee, args } => {
                // The grammar accepts `f(1)(2)`; only named host functions are callable.
                let name = match &callee.kind {
                    ExprKind::Identifier {
                        name,
                        optional: false,
                    } if !name.starts_with('$') => name,
                    _ => return Err(CompileError::InvalidCallee { position }),
                };
                let argc = Self::check_count(args.len(), position)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let name = self.add_constant(Value::from(name.as_str()), position)?;
                self.emit(Opcode::Call, &[name, argc])?;
                Ok(())
            }

            ExprKind::Member {
                target,
                property,
                optional,
            } => {
                self.compile_expr(target)?;
                self.emit_property(property, position)?;
                self.emit(Opcode::Index, &[access_flags(*optional, false)])?;
                Ok(())
            }

            ExprKind::Index {
                target,
                index,
                optional,
            } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.emit(Opcode::Index, &[access_flags(*optional, false)])?;
                Ok(())
            }

            ExprKind::Slice {
                target,
                start,
                end,
                step,
                optional,
            } => {
                self.compile_expr(target)?;
                for bound in [start, end, step] {
                    match bound {
                        Some(bound) => self.compile_expr(bound)?,
                        None => self.emit_constant(Value::Null, position)?,
                    }
                }
                self.emit(Opcode::Slice, &[access_flags(*optional, false)])?;
                Ok(())
            }

            ExprKind::Pipe(_) => Err(CompileError::NestedPipe { position }),
        }
    }

    fn compile_binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<(), CompileError> {
        let opcode = match op {
            BinOp::And => return self.compile_short_circuit(left, right, Opcode::AndShortCircuit, Opcode::And),
            BinOp::Or => return self.compile_short_circuit(left, right, Opcode::OrShortCircuit, Opcode::Or),
            BinOp::NullCoalesce => {
                self.compile_soft(left)?;
                let jump = self.emit(Opcode::JumpIfNotNull, &[0])?;
                self.compile_expr(right)?;
                return self.patch_jump(jump);
            }
            BinOp::Add => Opcode::Add,
            BinOp::Subtract => Opcode::Sub,
            BinOp::Multiply => Opcode::Mul,
            BinOp::Divide => Opcode::Div,
            BinOp::Modulo => Opcode::Mod,
            BinOp::Power => Opcode::Pow,
            BinOp::BitAnd => Opcode::BitAnd,
            BinOp::BitOr => Opcode::BitOr,
            BinOp::BitXor => Opcode::BitXor,
            BinOp::ShiftLeft => Opcode::ShiftLeft,
            BinOp::ShiftRight => Opcode::ShiftRight,
            BinOp::Equal => Opcode::Equal,
            BinOp::NotEqual => Opcode::NotEqual,
            BinOp::LessThan => Opcode::Less,
            BinOp::GreaterThan => Opcode::Greater,
            BinOp::LessEqual => Opcode::LessEqual,
            BinOp::GreaterEqual => Opcode::GreaterEqual,
        };
        self.compile_expr(left)?;
        self.compile_expr(right)?;
        self.emit(opcode, &[])?;
        Ok(())
    }

    /// `a && b` / `a || b`: the right side only runs when the left does not
    /// decide the result; both paths leave a boolean.
    fn compile_short_circuit(
        &mut self,
        left: &Expr,
        right: &Expr,
        short: Opcode,
        combine: Opcode,
    ) -> Result<(), CompileError> {
        self.compile_expr(left)?;
        let jump = self.emit(short, &[0])?;
        self.compile_expr(right)?;
        self.emit(combine, &[])?;
        self.patch_jump(jump)
    }

    /// Left operand of `??`: the final access step (or a bare context
    /// variable) yields `null` instead of failing when the key is missing.
    fn compile_soft(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let position = expr.position;
        match &expr.kind {
            ExprKind::Identifier { name, optional } if !name.starts_with('$') => {
                self.load_identifier(name, access_flags(*optional, true), position)
            }
            ExprKind::Member {
                target,
                property,
                optional,
            } => {
                self.compile_expr(target)?;
                self.emit_property(property, position)?;
                self.emit(Opcode::Index, &[access_flags(*optional, true)])?;
                Ok(())
            }
            ExprKind::Index {
                target,
                index,
                optional,
            } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.emit(Opcode::Index, &[access_flags(*optional, true)])?;
                Ok(())
            }
            _ => self.compile_expr(expr),
        }
    }

    fn load_identifier(&mut self, name: &str, flags: usize, position: Position) -> Result<(), CompileError> {
        if name.starts_with('$') {
            let index = self.add_constant(Value::from(name), position)?;
            self.emit(Opcode::LoadLocal, &[index])?;
        } else {
            let (index, _) = self.context_vars.insert_full(name.to_string());
            if index >= MAX_INDEX {
                return Err(CompileError::TooManyVariables {
                    position,
                    limit: MAX_INDEX,
                });
            }
            self.emit(Opcode::LoadVar, &[index, flags])?;
        }
        Ok(())
    }

    fn emit_property(&mut self, property: &Property, position: Position) -> Result<(), CompileError> {
        let key = match property {
            Property::Name(name) => Value::from(name.as_str()),
            Property::Index(i) => Value::from(*i),
        };
        self.emit_constant(key, position)
    }

    // ========================================================================
    // Emission
    // ========================================================================

    fn add_constant(&mut self, value: Value, position: Position) -> Result<usize, CompileError> {
        if self.constants.len() >= MAX_INDEX {
            return Err(CompileError::TooManyConstants {
                position,
                limit: MAX_INDEX,
            });
        }
        self.constants.push(value);
        Ok(self.constants.len() - 1)
    }

    fn emit_constant(&mut self, value: Value, position: Position) -> Result<(), CompileError> {
        let index = self.add_constant(value, position)?;
        self.emit(Opcode::Constant, &[index])?;
        Ok(())
    }

    /// Appends an instruction to the current scope and returns its offset.
    fn emit(&mut self, opcode: Opcode, operands: &[usize]) -> Result<usize, CompileError> {
        let bytes = instructions::make(opcode, operands)?;
        let scope = self.current_scope();
        let offset = scope.instructions.len();
        scope.instructions.extend_from_slice(&bytes);
        Ok(offset)
    }

    /// Points the jump at `offset` to the end of the current scope.
    fn patch_jump(&mut self, offset: usize) -> Result<(), CompileError> {
        let scope = self.current_scope();
        let target = scope.instructions.len();
        instructions::patch_operand(&mut scope.instructions, offset, target)?;
        Ok(())
    }

    fn current_scope(&mut self) -> &mut CompilationScope {
        if self.scopes.is_empty() {
            self.scopes.push(CompilationScope::default());
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn check_count(count: usize, position: Position) -> Result<usize, CompileError> {
        if count > MAX_INDEX {
            return Err(CompileError::TooManyElements {
                position,
                count,
                limit: MAX_INDEX,
            });
        }
        Ok(count)
    }
}

fn access_flags(optional: bool, soft: bool) -> usize {
    let mut flags = 0;
    if optional {
        flags |= FLAG_OPTIONAL;
    }
    if soft {
        flags |= FLAG_SOFT;
    }
    flags
}
