// tests/spec_compliance.rs
//
// End-to-end language behaviour through the public `evaluate` entry point.

use serde_json::json;
use tansy_lang::convert::{json_to_context, json_to_value};
use tansy_lang::{
    Error, ErrorCode, Map, ParserOptions, Value, VmError, compile, evaluate, parse,
};

fn eval_expr(expr_str: &str, doc: serde_json::Value) -> Result<Value, Error> {
    let context = json_to_context(doc).expect("context must be an object");
    evaluate(expr_str, &context)
}

fn eval_ok(expr_str: &str) -> Value {
    eval_expr(expr_str, json!({}))
        .unwrap_or_else(|e| panic!("Failed to evaluate '{}': {}", expr_str, e))
}

fn assert_nan(value: Value, expr_str: &str) {
    match value {
        Value::Number(n) => assert!(n.is_nan(), "Expected NaN for '{}', got {}", expr_str, n),
        other => panic!("Expected NaN for '{}', got {:?}", expr_str, other),
    }
}

// ============================================================================
// Precedence
// ============================================================================

#[test]
fn test_precedence() {
    let test_cases = vec![
        ("1 + 2 * 3", 7.0),
        ("-2 ** 2", 4.0),
        ("2 ** 3 ** 2", 512.0),
        ("(1 + 2) * 3", 9.0),
        ("2 * 3 ^ 2", 18.0),
        ("1 + 2 << 1", 6.0),
        ("1 | 2 & 3", 3.0),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval_ok(input), Value::Number(expected), "Failed for input: {}", input);
    }
}

#[test]
fn test_ternary_is_loosest() {
    assert_eq!(eval_ok("null ?? 0 ? 'yes' : 'no'"), Value::from("no"));
    assert_eq!(eval_ok("1 < 2 ? 'a' : 'b'"), Value::from("a"));
}

// ============================================================================
// Round-trip Stability
// ============================================================================

#[test]
fn test_parse_and_compile_are_stable() {
    let sources = [
        "1 + 2 * 3",
        "user?.profile.name ?? 'Anonymous'",
        "items[::-1][0]",
        "{z: 1, a: [1, 2, {m: x}]}",
        "orders |filter: $item.total > 100 as $big |map: $item.id |: len($big)",
    ];

    for source in sources {
        let first = parse(source, &ParserOptions::default()).unwrap();
        let second = parse(source, &ParserOptions::default()).unwrap();
        assert_eq!(first, second, "AST differs for: {}", source);

        let first_code = compile(&first).unwrap();
        let second_code = compile(&first).unwrap();
        assert_eq!(
            first_code.instructions, second_code.instructions,
            "Bytecode differs for: {}",
            source
        );
        assert_eq!(first_code, second_code, "Program differs for: {}", source);
    }
}

// ============================================================================
// Optional Chaining and Nullish Coalescing
// ============================================================================

#[test]
fn test_nullish_falls_back_on_missing_member() {
    let result = eval_expr(r#".user.name ?? "Anonymous""#, json!({"user": {}})).unwrap();
    assert_eq!(result, Value::from("Anonymous"));
}

#[test]
fn test_optional_chain_over_null() {
    let result = eval_expr(r#"?.u?.name ?? "anon""#, json!({"u": null})).unwrap();
    assert_eq!(result, Value::from("anon"));
}

#[test]
fn test_optional_chaining_only_guards_its_own_base() {
    let result = eval_expr(r#"?.u.name ?? "anon""#, json!({}));
    assert!(
        matches!(result, Err(Error::Runtime(VmError::NullAccess { .. }))),
        "got {:?}",
        result
    );
}

#[test]
fn test_nullish_only_softens_final_step() {
    let doc = json!({"a": {}});
    assert_eq!(eval_expr("a.b ?? 1", doc.clone()).unwrap(), Value::Number(1.0));
    assert!(matches!(
        eval_expr("a.b.c ?? 1", doc),
        Err(Error::Runtime(VmError::PropertyNotFound { .. }))
    ));
    assert!(matches!(
        eval_expr("a?.b.c ?? 1", json!({"a": null})),
        Err(Error::Runtime(VmError::NullAccess { .. }))
    ));
    assert!(matches!(
        eval_expr("a.b.c ?? 1", json!({})),
        Err(Error::Runtime(VmError::UndefinedVariable(_)))
    ));
}

#[test]
fn test_nullish_keeps_present_falsy_values() {
    let doc = json!({"n": 0, "s": "", "f": false});
    assert_eq!(eval_expr("n ?? 5", doc.clone()).unwrap(), Value::Number(0.0));
    assert_eq!(eval_expr("s ?? 'x'", doc.clone()).unwrap(), Value::from(""));
    assert_eq!(eval_expr("f ?? true", doc).unwrap(), Value::Boolean(false));
}

// ============================================================================
// Slicing
// ============================================================================

#[test]
fn test_slicing() {
    let doc = json!({"arr": [1, 2, 3, 4, 5]});

    let test_cases = vec![
        ("arr[1:4]", json!([2, 3, 4])),
        ("arr[::-1]", json!([5, 4, 3, 2, 1])),
        ("arr[4:1]", json!([])),
        ("arr[4:1:-1]", json!([5, 4, 3])),
    ];

    for (input, expected) in test_cases {
        assert_eq!(
            eval_expr(input, doc.clone()).unwrap(),
            json_to_value(expected),
            "Failed for input: {}",
            input
        );
    }
}

// ============================================================================
// IEEE-754
// ============================================================================

#[test]
fn test_nan_comparisons() {
    assert_eq!(eval_ok("NaN == NaN"), Value::Boolean(false));
    assert_eq!(eval_ok("NaN != NaN"), Value::Boolean(true));
    assert_eq!(eval_ok("NaN <> NaN"), Value::Boolean(true));
}

#[test]
fn test_non_finite_arithmetic() {
    for input in ["Inf - Inf", "Inf + -Inf", "0 * Inf", "NaN * 0"] {
        assert_nan(eval_ok(input), input);
    }
    assert_eq!(eval_ok("5 / Inf"), Value::Number(0.0));
    assert_eq!(eval_ok("-Inf ** 3"), Value::Number(f64::NEG_INFINITY));
    assert_eq!(eval_ok("-Inf ** 2"), Value::Number(f64::INFINITY));
}

#[test]
fn test_negative_infinity_literal() {
    let test_cases = vec![
        ("-Inf", f64::NEG_INFINITY),
        ("1-Inf", f64::NEG_INFINITY),
        ("-Inf * -1", f64::INFINITY),
        ("-Inf ^ 2", f64::INFINITY),
        ("[-Inf][0]", f64::NEG_INFINITY),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval_ok(input), Value::Number(expected), "Failed for input: {}", input);
    }
    assert_eq!(eval_ok("-Inf < -1e308"), Value::Boolean(true));
}

#[test]
fn test_division_by_zero_is_an_error() {
    assert!(matches!(
        eval_expr("1/0", json!({})),
        Err(Error::Runtime(VmError::DivisionByZero))
    ));
}

#[test]
fn test_bitwise_requires_finite_integers() {
    let err = eval_expr("NaN & 1", json!({})).unwrap_err();
    assert!(matches!(err, Error::Runtime(VmError::BitwiseNonInteger { .. })));
    assert!(err.to_string().contains("requires finite integers"));
}

// ============================================================================
// Excel-compatible Operators
// ============================================================================

#[test]
fn test_excel_operators() {
    let test_cases = vec![
        ("2 ^ 3", Value::Number(8.0)),
        ("2 ** 3", Value::Number(8.0)),
        ("5 ~ 3", Value::Number(6.0)),
        ("~5", Value::Number(-6.0)),
        ("5 <> 3", Value::Boolean(true)),
        ("5 <> 5", Value::Boolean(false)),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval_ok(input), expected, "Failed for input: {}", input);
    }
}

// ============================================================================
// Pipes
// ============================================================================

#[test]
fn test_map_pipe() {
    assert_eq!(
        eval_ok("[1,2,3] |map: $item * 2"),
        json_to_value(json!([2, 4, 6]))
    );
}

#[test]
fn test_alias_visible_in_later_segments() {
    let result = eval_ok("[1, 2, 3] as $x |map: $item * len($x) |: sum($last) + len($x)");
    assert_eq!(result, Value::Number(21.0));
}

#[test]
fn test_alias_inside_subexpression_is_rejected() {
    for input in ["(1 as $x) + 1", "[1, 2 as $x]", "max(1 as $x, 2)"] {
        match eval_expr(input, json!({})) {
            Err(Error::Parse(errors)) => assert!(
                errors.has_code(ErrorCode::AliasInSubexpression),
                "Failed for input: {}: {}",
                input,
                errors
            ),
            other => panic!("Expected parse error for '{}', got {:?}", input, other),
        }
    }
}

// ============================================================================
// Error Accumulation
// ============================================================================

#[test]
fn test_unexpected_token_yields_no_ast() {
    let result = parse("1 + + 2", &ParserOptions::default());
    let errors = result.unwrap_err();
    assert!(!errors.is_empty());
    assert!(errors.has_code(ErrorCode::UnexpectedToken));
}

#[test]
fn test_malformed_input_never_panics() {
    let inputs = [
        "",
        "(",
        "[",
        "{",
        "'",
        "r\"",
        "\"\\u",
        "|",
        "|:",
        "?.",
        "a?",
        "a[:",
        "x as",
        "1e",
        "--",
        "!!!",
        "#$%",
        "a ? b :",
        "{a:}",
        "f(,)",
    ];

    for input in inputs {
        let _ = evaluate(input, &Map::new());
    }
}
