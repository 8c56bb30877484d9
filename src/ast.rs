//! # Tansy Expression Language - Abstract Syntax Tree
//!
//! This module defines the tokens and syntax tree of the Tansy expression
//! language, an embeddable language whose programs are compiled to bytecode
//! and executed against a host-supplied context.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Positioned lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes and pipe stages
//! - **[operators]** - Binary and unary operators
//!
//! ## Quick Start
//!
//! ```text
//! orders |filter: $item.total > 100 |map: $item.id
//! ```
//!
//! This expression keeps the orders above 100 and returns their ids.
//!
//! ## Operator Precedence
//!
//! From loosest to tightest:
//!
//! | Level | Operators |
//! |---|---|
//! | conditional | `?:` (right-associative) |
//! | nullish | `??` |
//! | logical or | `\|\|` |
//! | logical and | `&&` |
//! | bitwise or | `\|` |
//! | bitwise xor | `~` |
//! | bitwise and | `&` |
//! | equality | `==` `!=` `<>` |
//! | relational | `<` `>` `<=` `>=` |
//! | shift | `<<` `>>` |
//! | additive | `+` `-` |
//! | multiplicative | `*` `/` `%` |
//! | power | `**` `^` (right-associative) |
//! | unary | `!` `-` `~` |
//! | postfix | `.` `?.` `[]` `?[]` `()` |
//!
//! Unary operators bind tighter than power, so `-2 ** 2` is `(-2) ** 2`.
//!
//! ### Pipes
//!
//! ```text
//! expr |type: expr as $alias |type: expr
//! ```
//!
//! Pipes and aliases are only valid at the top level of a program.
pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::{DEFAULT_PIPE, Expr, ExprKind, PipeStage, Property, SOURCE_STAGE};
pub use operators::{BinOp, UnaryOp};
pub use tokens::{Position, Token, TokenKind};
