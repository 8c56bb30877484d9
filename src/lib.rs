//! # Tansy
//!
//! An embeddable expression language. Source text is tokenized, parsed into
//! an [`Expr`] tree, compiled to [`Bytecode`] and executed on a stack
//! [`Vm`] against a host-supplied context and function registry.
//!
//! ```
//! use serde_json::json;
//! use tansy_lang::{convert::json_to_context, evaluate, Value};
//!
//! let context = json_to_context(json!({"items": [1, 2, 3]})).unwrap();
//! let result = evaluate("items |map: $item * 2", &context).unwrap();
//! assert_eq!(result, Value::Array(vec![2.0.into(), 4.0.into(), 6.0.into()]));
//! ```
pub mod ast;
pub mod bytecode;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compiler;
pub mod convert;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod stdlib;
pub mod value;
pub mod vm;

pub use ast::{BinOp, Expr, ExprKind, PipeStage, Position, Token, TokenKind, UnaryOp};
pub use bytecode::{Bytecode, Opcode};
pub use compiler::{CompileError, Compiler, compile};
pub use error::{Error, ErrorCode, ParseError, ParseErrors};
pub use lexer::Lexer;
pub use parser::{Parser, ParserOptions, parse};
pub use value::{Map, Value};
pub use vm::{FunctionError, LibContext, PipeContext, Vm, VmConfig, VmError};

/// Parses, compiles and runs `source` with the standard library.
pub fn evaluate(source: &str, context: &Map) -> Result<Value, Error> {
    let expr = parse(source, &ParserOptions::default())?;
    let bytecode = compile(&expr)?;
    let mut vm = Vm::new(LibContext::standard());
    Ok(vm.run(&bytecode, context)?)
}
