//! Evaluate and disassemble tansy expressions

use tracing::debug;

use super::CliError;
use crate::{
    LibContext, Map, ParserOptions, Vm, compile,
    convert::{json_to_context, value_to_json},
    parse,
};

/// Options for the check command
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// The expression to evaluate
    pub expression: String,
    /// JSON object supplying the context variables
    pub context: Option<String>,
    /// Only validate syntax, don't execute
    pub syntax_only: bool,
}

/// Result of a check operation
#[derive(Debug)]
pub enum CheckResult {
    /// Syntax validation passed
    SyntaxValid,
    /// Expression evaluated successfully
    Success(serde_json::Value),
}

/// Parse, compile and run an expression against an optional JSON context.
pub fn execute_check(options: &CheckOptions) -> Result<CheckResult, CliError> {
    let expr = parse(&options.expression, &ParserOptions::default())?;
    if options.syntax_only {
        return Ok(CheckResult::SyntaxValid);
    }

    let context = match &options.context {
        Some(text) if !text.trim().is_empty() => {
            let json: serde_json::Value = serde_json::from_str(text)?;
            json_to_context(json).ok_or(CliError::ContextNotObject)?
        }
        _ => Map::new(),
    };
    debug!(variables = context.len(), "loaded context");

    let bytecode = compile(&expr)?;
    let mut vm = Vm::new(LibContext::standard());
    let result = vm.run(&bytecode, &context)?;
    Ok(CheckResult::Success(value_to_json(result)))
}

/// Compile an expression and render its bytecode listing.
pub fn execute_disasm(expression: &str) -> Result<String, CliError> {
    let expr = parse(expression, &ParserOptions::default())?;
    let bytecode = compile(&expr)?;
    Ok(bytecode.disassemble())
}

#[test]
fn test_execute_check_with_context() {
    let options = CheckOptions {
        expression: "a + b".to_string(),
        context: Some(r#"{"a": 1, "b": 2}"#.to_string()),
        syntax_only: false,
    };
    match execute_check(&options).unwrap() {
        CheckResult::Success(value) => assert_eq!(value, serde_json::json!(3)),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_execute_check_rejects_non_object_context() {
    let options = CheckOptions {
        expression: "1".to_string(),
        context: Some("[1, 2]".to_string()),
        syntax_only: false,
    };
    assert!(matches!(
        execute_check(&options),
        Err(CliError::ContextNotObject)
    ));
}

#[test]
fn test_execute_check_reports_runtime_category() {
    let options = CheckOptions {
        expression: "total / count".to_string(),
        context: Some(r#"{"total": 10, "count": 0}"#.to_string()),
        syntax_only: false,
    };
    let err = execute_check(&options).unwrap_err();
    assert!(matches!(err, CliError::Runtime(crate::VmError::DivisionByZero)));
    assert_eq!(err.to_string(), "runtime error (arithmetic): division by zero");
}
