//! CLI support for tansy-lang
//!
//! Provides programmatic access to the `tansy` commands for embedding in
//! other tools.

mod check;

pub use check::{CheckOptions, CheckResult, execute_check, execute_disasm};

use std::io;

use thiserror::Error;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Parse(#[from] crate::ParseErrors),

    #[error("compile error: {0}")]
    Compile(#[from] crate::CompileError),

    #[error("runtime error ({category}): {0}", category = .0.category())]
    Runtime(#[from] crate::VmError),

    #[error("invalid JSON context: {0}")]
    Json(#[from] serde_json::Error),

    #[error("context must be a JSON object")]
    ContextNotObject,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
