// tests/parser_tests.rs

use tansy_lang::ast::{BinOp, Expr, ExprKind, Position, Property, UnaryOp};
use tansy_lang::error::{ErrorCode, ParseErrors};
use tansy_lang::parser::{DEFAULT_MAX_DEPTH, Parser, ParserOptions, parse};

fn parse_ok(input: &str) -> Expr {
    parse(input, &ParserOptions::default())
        .unwrap_or_else(|e| panic!("Failed to parse '{}': {}", input, e))
}

fn parse_err(input: &str) -> ParseErrors {
    match parse(input, &ParserOptions::default()) {
        Ok(expr) => panic!("Expected '{}' to fail, got {:?}", input, expr),
        Err(errors) => errors,
    }
}

fn first_code(input: &str) -> ErrorCode {
    parse_err(input).first().map(|e| e.code).unwrap()
}

fn binary_parts(expr: &Expr) -> (BinOp, &Expr, &Expr) {
    match &expr.kind {
        ExprKind::Binary { op, left, right } => (*op, left, right),
        other => panic!("Expected binary expression, got {:?}", other),
    }
}

fn is_ident(expr: &Expr, expected: &str) -> bool {
    matches!(&expr.kind, ExprKind::Identifier { name, .. } if name == expected)
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_literals() {
    assert_eq!(parse_ok("42").kind, ExprKind::Number(42.0));
    assert_eq!(parse_ok("true").kind, ExprKind::Boolean(true));
    assert_eq!(parse_ok("null").kind, ExprKind::Null);
    assert_eq!(
        parse_ok("'hi'").kind,
        ExprKind::String {
            value: "hi".to_string(),
            raw: false,
            single_quoted: true
        }
    );
    assert_eq!(
        parse_ok(r"r'C:\path'").kind,
        ExprKind::String {
            value: r"C:\path".to_string(),
            raw: true,
            single_quoted: true
        }
    );
}

#[test]
fn test_ieee754_literals() {
    let expr = parse_ok("-Inf");
    match expr.kind {
        ExprKind::Unary { op, operand } => {
            assert_eq!(op, UnaryOp::Negate);
            assert_eq!(operand.kind, ExprKind::Number(f64::INFINITY));
        }
        other => panic!("Expected unary, got {:?}", other),
    }

    let options = ParserOptions {
        enable_ieee754_specials: false,
        ..ParserOptions::default()
    };
    let expr = parse("NaN", &options).unwrap();
    assert!(is_ident(&expr, "NaN"));
}

#[test]
fn test_array_literal() {
    match parse_ok("[1, 'a', [true]]").kind {
        ExprKind::Array(elements) => {
            assert_eq!(elements.len(), 3);
            assert!(matches!(elements[2].kind, ExprKind::Array(ref inner) if inner.len() == 1));
        }
        other => panic!("Expected array, got {:?}", other),
    }
    assert_eq!(parse_ok("[]").kind, ExprKind::Array(vec![]));
}

#[test]
fn test_object_literal_keys() {
    match parse_ok("{a: 1, 'b': 2, 3: x, null: 4}").kind {
        ExprKind::Object(pairs) => {
            let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(keys, vec!["a", "b", "3", "null"]);
            assert!(is_ident(&pairs[2].1, "x"));
        }
        other => panic!("Expected object, got {:?}", other),
    }
}

// ============================================================================
// Precedence and Associativity
// ============================================================================

#[test]
fn test_multiplication_binds_tighter() {
    let expr = parse_ok("1 + 2 * 3");
    let (op, left, right) = binary_parts(&expr);
    assert_eq!(op, BinOp::Add);
    assert_eq!(left.kind, ExprKind::Number(1.0));
    assert_eq!(binary_parts(right).0, BinOp::Multiply);
}

#[test]
fn test_left_associativity() {
    let expr = parse_ok("10 - 4 - 3");
    let (op, left, right) = binary_parts(&expr);
    assert_eq!(op, BinOp::Subtract);
    assert_eq!(binary_parts(left).0, BinOp::Subtract);
    assert_eq!(right.kind, ExprKind::Number(3.0));
}

#[test]
fn test_power_is_right_associative() {
    let expr = parse_ok("2 ** 3 ^ 2");
    let (op, left, right) = binary_parts(&expr);
    assert_eq!(op, BinOp::Power);
    assert_eq!(left.kind, ExprKind::Number(2.0));
    assert_eq!(binary_parts(right).0, BinOp::Power);
}

#[test]
fn test_unary_binds_tighter_than_power() {
    let expr = parse_ok("-2 ** 2");
    let (op, left, _) = binary_parts(&expr);
    assert_eq!(op, BinOp::Power);
    assert!(matches!(
        left.kind,
        ExprKind::Unary {
            op: UnaryOp::Negate,
            ..
        }
    ));
}

#[test]
fn test_operator_levels() {
    // (input, operator at the root)
    let test_cases = vec![
        ("a ?? b || c", BinOp::NullCoalesce),
        ("a || b && c", BinOp::Or),
        ("a && b | c", BinOp::And),
        ("a | b ~ c", BinOp::BitOr),
        ("a ~ b & c", BinOp::BitXor),
        ("a & b == c", BinOp::BitAnd),
        ("a == b < c", BinOp::Equal),
        ("a <> b", BinOp::NotEqual),
        ("a < b << c", BinOp::LessThan),
        ("a << b + c", BinOp::ShiftLeft),
        ("a + b % c", BinOp::Add),
        ("a % b ** c", BinOp::Modulo),
    ];

    for (input, expected) in test_cases {
        let expr = parse_ok(input);
        assert_eq!(binary_parts(&expr).0, expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_tilde_is_unary_and_binary() {
    assert!(matches!(
        parse_ok("~5").kind,
        ExprKind::Unary {
            op: UnaryOp::BitNot,
            ..
        }
    ));
    assert_eq!(binary_parts(&parse_ok("5 ~ 3")).0, BinOp::BitXor);
}

#[test]
fn test_conditional_nests_in_alternate() {
    match parse_ok("a ? b : c ? d : e").kind {
        ExprKind::Conditional {
            condition,
            alternate,
            ..
        } => {
            assert!(is_ident(&condition, "a"));
            assert!(matches!(alternate.kind, ExprKind::Conditional { .. }));
        }
        other => panic!("Expected conditional, got {:?}", other),
    }
}

#[test]
fn test_parentheses_override_precedence() {
    let expr = parse_ok("(1 + 2) * 3");
    let (op, left, _) = binary_parts(&expr);
    assert_eq!(op, BinOp::Multiply);
    assert_eq!(binary_parts(left).0, BinOp::Add);
}

#[test]
fn test_binary_position_is_left_operand() {
    let expr = parse_ok("  a + b");
    assert_eq!(expr.position, Position::new(1, 3));
}

// ============================================================================
// Access and Calls
// ============================================================================

#[test]
fn test_member_access() {
    match parse_ok("user.name").kind {
        ExprKind::Member {
            target,
            property,
            optional,
        } => {
            assert!(is_ident(&target, "user"));
            assert_eq!(property, Property::Name("name".to_string()));
            assert!(!optional);
        }
        other => panic!("Expected member, got {:?}", other),
    }
}

#[test]
fn test_positional_member() {
    match parse_ok("matrix.0.1").kind {
        ExprKind::Member {
            target, property, ..
        } => {
            assert_eq!(property, Property::Index(1));
            assert!(matches!(
                target.kind,
                ExprKind::Member {
                    property: Property::Index(0),
                    ..
                }
            ));
        }
        other => panic!("Expected member, got {:?}", other),
    }
}

#[test]
fn test_keyword_as_property_name() {
    assert!(matches!(
        parse_ok("flags.true").kind,
        ExprKind::Member { property: Property::Name(ref n), .. } if n == "true"
    ));
}

#[test]
fn test_computed_member() {
    match parse_ok("obj.(key)").kind {
        ExprKind::Index { index, optional, .. } => {
            assert!(is_ident(&index, "key"));
            assert!(!optional);
        }
        other => panic!("Expected index, got {:?}", other),
    }
}

#[test]
fn test_optional_access() {
    assert!(matches!(
        parse_ok("a?.b").kind,
        ExprKind::Member { optional: true, .. }
    ));
    assert!(matches!(
        parse_ok("a?[0]").kind,
        ExprKind::Index { optional: true, .. }
    ));
    assert!(matches!(
        parse_ok("a?[1:]").kind,
        ExprKind::Slice { optional: true, .. }
    ));
}

#[test]
fn test_leading_dot_identifiers() {
    assert_eq!(
        parse_ok(".user").kind,
        ExprKind::Identifier {
            name: "user".to_string(),
            optional: false
        }
    );
    assert_eq!(
        parse_ok("?.user").kind,
        ExprKind::Identifier {
            name: "user".to_string(),
            optional: true
        }
    );
}

#[test]
fn test_slices() {
    match parse_ok("arr[1:4]").kind {
        ExprKind::Slice {
            start, end, step, ..
        } => {
            assert_eq!(start.map(|e| e.kind), Some(ExprKind::Number(1.0)));
            assert_eq!(end.map(|e| e.kind), Some(ExprKind::Number(4.0)));
            assert!(step.is_none());
        }
        other => panic!("Expected slice, got {:?}", other),
    }

    match parse_ok("arr[::-1]").kind {
        ExprKind::Slice {
            start, end, step, ..
        } => {
            assert!(start.is_none());
            assert!(end.is_none());
            assert!(matches!(
                step.map(|e| e.kind),
                Some(ExprKind::Unary {
                    op: UnaryOp::Negate,
                    ..
                })
            ));
        }
        other => panic!("Expected slice, got {:?}", other),
    }

    assert!(matches!(
        parse_ok("arr[:]").kind,
        ExprKind::Slice {
            start: None,
            end: None,
            step: None,
            ..
        }
    ));
}

#[test]
fn test_calls() {
    match parse_ok("max(a, 2)").kind {
        ExprKind::Call { callee, args } => {
            assert!(is_ident(&callee, "max"));
            assert_eq!(args.len(), 2);
        }
        other => panic!("Expected call, got {:?}", other),
    }
    assert!(matches!(parse_ok("now()").kind, ExprKind::Call { ref args, .. } if args.is_empty()));
}

#[test]
fn test_postfix_chain() {
    match parse_ok("items[0].tags[-1]").kind {
        ExprKind::Index { target, .. } => {
            assert!(matches!(target.kind, ExprKind::Member { .. }));
        }
        other => panic!("Expected index, got {:?}", other),
    }
}

// ============================================================================
// Pipes
// ============================================================================

#[test]
fn test_pipe_stages() {
    match parse_ok("[1, 2, 3] |filter: $item > 1 |map: $item * 2").kind {
        ExprKind::Pipe(stages) => {
            let types: Vec<&str> = stages.iter().map(|s| s.pipe_type.as_str()).collect();
            assert_eq!(types, vec!["source", "filter", "map"]);
            assert!(stages.iter().all(|s| s.alias.is_none()));
        }
        other => panic!("Expected pipe, got {:?}", other),
    }
}

#[test]
fn test_default_pipe_type() {
    match parse_ok("x |: $last").kind {
        ExprKind::Pipe(stages) => assert_eq!(stages[1].pipe_type, "default"),
        other => panic!("Expected pipe, got {:?}", other),
    }
}

#[test]
fn test_aliases() {
    match parse_ok("items as $all |map: $item as $doubled").kind {
        ExprKind::Pipe(stages) => {
            assert_eq!(stages[0].alias.as_deref(), Some("$all"));
            assert_eq!(stages[1].alias.as_deref(), Some("$doubled"));
        }
        other => panic!("Expected pipe, got {:?}", other),
    }

    // A lone aliased expression is still a pipe
    assert!(matches!(parse_ok("x as $y").kind, ExprKind::Pipe(ref s) if s.len() == 1));
}

#[test]
fn test_single_stage_is_plain_expression() {
    assert!(matches!(parse_ok("a + 1").kind, ExprKind::Binary { .. }));
}

#[test]
fn test_stage_positions() {
    match parse_ok("x |map: 1").kind {
        ExprKind::Pipe(stages) => {
            assert_eq!(stages[0].position, Position::new(1, 1));
            assert_eq!(stages[1].position, Position::new(1, 3));
        }
        other => panic!("Expected pipe, got {:?}", other),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_codes() {
    let test_cases = vec![
        ("", ErrorCode::EmptyExpression),
        ("   ", ErrorCode::EmptyExpression),
        ("1 + + 2", ErrorCode::UnexpectedToken),
        ("1 +", ErrorCode::UnexpectedEof),
        ("()", ErrorCode::UnexpectedToken),
        ("x++", ErrorCode::UnexpectedToken),
        ("1 2", ErrorCode::UnexpectedToken),
        ("(1 + 2", ErrorCode::UnclosedParen),
        ("[1, 2", ErrorCode::UnclosedBracket),
        ("{a: 1", ErrorCode::UnclosedBrace),
        ("a[1", ErrorCode::UnclosedBracket),
        ("{a 1}", ErrorCode::ExpectedToken),
        ("{[1]: 2}", ErrorCode::InvalidObjectKey),
        ("[1,,2]", ErrorCode::EmptyElement),
        ("a[]", ErrorCode::EmptyElement),
        ("[1, 2,]", ErrorCode::TrailingComma),
        ("f(1,)", ErrorCode::TrailingComma),
        ("a.+", ErrorCode::InvalidProperty),
        ("a.b(1)", ErrorCode::InvalidCallTarget),
        ("a[0](1)", ErrorCode::InvalidCallTarget),
        ("x |map:", ErrorCode::EmptyPipe),
        ("x |map: |filter: 1", ErrorCode::EmptyPipe),
        ("x |map: as $y", ErrorCode::EmptyPipeWithAlias),
        ("(x as $y)", ErrorCode::AliasInSubexpression),
        ("f(x as $y)", ErrorCode::AliasInSubexpression),
        ("x as $a as $b", ErrorCode::DuplicateAlias),
        ("x as y", ErrorCode::InvalidAlias),
        ("(1 |map: 2)", ErrorCode::PipeInSubexpression),
        ("[x |map: 2]", ErrorCode::PipeInSubexpression),
        ("a ? b", ErrorCode::ExpectedToken),
        ("'open", ErrorCode::UnterminatedString),
        ("a = 1", ErrorCode::InvalidCharacter),
    ];

    for (input, expected) in test_cases {
        assert_eq!(first_code(input), expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_unclosed_reports_opening_position() {
    let errors = parse_err("1 + (2 * 3");
    let error = errors.first().unwrap();
    assert_eq!(error.code, ErrorCode::UnclosedParen);
    assert_eq!((error.line, error.column), (1, 5));
    assert_eq!(error.expected.as_deref(), Some(")"));
}

#[test]
fn test_error_position_and_token() {
    let errors = parse_err("1 +\n  )");
    assert_eq!(errors.len(), 1);
    let error = errors.first().unwrap();
    assert_eq!(error.code, ErrorCode::UnexpectedToken);
    assert_eq!((error.line, error.column), (2, 3));
    assert_eq!(error.token.as_deref(), Some(")"));
}

#[test]
fn test_errors_accumulate() {
    let errors = parse_err("[1,,2,] |map:");
    let codes: Vec<ErrorCode> = errors.iter().map(|e| e.code).collect();
    assert_eq!(
        codes,
        vec![
            ErrorCode::EmptyElement,
            ErrorCode::TrailingComma,
            ErrorCode::EmptyPipe
        ]
    );
}

#[test]
fn test_errors_in_separate_stages() {
    let errors = parse_err("1 + |map: (2 |filter: 3");
    assert!(errors.has_code(ErrorCode::UnexpectedToken));
    assert!(errors.has_code(ErrorCode::PipeInSubexpression));
}

#[test]
fn test_lexical_error_suppresses_follow_on_errors() {
    let errors = parse_err("1 + 'abc");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.first().unwrap().code, ErrorCode::UnterminatedString);
}

#[test]
fn test_error_display_includes_code() {
    let errors = parse_err("1 + + 2");
    let text = errors.to_string();
    assert!(text.contains("unexpected-token"), "got: {}", text);
    assert!(text.contains("1:5"), "got: {}", text);
}

// ============================================================================
// Options
// ============================================================================

#[test]
fn test_disabled_features() {
    let test_cases = vec![
        (
            "a ?? b",
            ParserOptions {
                enable_nullish: false,
                ..ParserOptions::default()
            },
        ),
        (
            "a?.b",
            ParserOptions {
                enable_optional_chaining: false,
                ..ParserOptions::default()
            },
        ),
        (
            "?.a",
            ParserOptions {
                enable_optional_chaining: false,
                ..ParserOptions::default()
            },
        ),
        (
            "x |map: 1",
            ParserOptions {
                enable_pipes: false,
                ..ParserOptions::default()
            },
        ),
    ];

    for (input, options) in test_cases {
        let errors = parse(input, &options).unwrap_err();
        assert!(
            errors.has_code(ErrorCode::FeatureDisabled),
            "Failed for input: {}",
            input
        );
    }
}

#[test]
fn test_disabled_pipes_report_every_segment() {
    let options = ParserOptions {
        enable_pipes: false,
        ..ParserOptions::default()
    };
    let errors = parse("x |map: 1 |: 2", &options).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.code == ErrorCode::FeatureDisabled));
    let positions: Vec<(usize, usize)> = errors.iter().map(|e| (e.line, e.column)).collect();
    assert_eq!(positions, vec![(1, 3), (1, 11)]);
}

#[test]
fn test_max_depth() {
    let options = ParserOptions {
        max_depth: 8,
        ..ParserOptions::default()
    };
    let input = format!("{}1{}", "(".repeat(10), ")".repeat(10));
    let errors = parse(&input, &options).unwrap_err();
    assert!(errors.has_code(ErrorCode::MaxDepthExceeded));

    assert!(parse("((1))", &options).is_ok());
}

#[test]
fn test_deep_prefix_chain_does_not_overflow() {
    let input = format!("{}1", "-".repeat(10_000));
    let errors = parse_err(&input);
    assert!(errors.has_code(ErrorCode::MaxDepthExceeded));
}

#[test]
fn test_default_depth_fits_a_spawned_thread() {
    let handle = std::thread::spawn(|| {
        let nested = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));

        let deepest = parse(&nested(DEFAULT_MAX_DEPTH - 1), &ParserOptions::default());
        assert_eq!(deepest.map(|e| e.kind), Ok(ExprKind::Number(1.0)));

        let too_deep = parse(&nested(DEFAULT_MAX_DEPTH), &ParserOptions::default()).unwrap_err();
        assert!(too_deep.has_code(ErrorCode::MaxDepthExceeded));

        let arrays = format!("{}{}", "[".repeat(500), "]".repeat(500));
        let errors = parse(&arrays, &ParserOptions::default()).unwrap_err();
        assert!(errors.has_code(ErrorCode::MaxDepthExceeded));
    });
    assert!(handle.join().is_ok());
}

#[test]
fn test_parser_over_custom_lexer() {
    let lexer = tansy_lang::Lexer::new("NaN").with_ieee754_specials(true);
    let expr = Parser::new(lexer).parse().unwrap();
    assert!(matches!(expr.kind, ExprKind::Number(n) if n.is_nan()));
}

#[test]
fn test_parse_is_deterministic() {
    let source = "orders |filter: $item.total > 100 && !$item.void |map: {id: $item.id} as $ids";
    assert_eq!(parse_ok(source), parse_ok(source));
}
