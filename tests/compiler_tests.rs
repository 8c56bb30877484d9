// tests/compiler_tests.rs

use tansy_lang::ast::{Expr, ExprKind, PipeStage, Position};
use tansy_lang::bytecode::{
    Bytecode, FLAG_OPTIONAL, FLAG_SOFT, Instruction, NO_ALIAS, Opcode, decode, make,
};
use tansy_lang::compiler::{CompileError, MAX_NESTING, compile};
use tansy_lang::parser::{ParserOptions, parse};
use tansy_lang::value::Value;

fn compile_src(input: &str) -> Bytecode {
    let expr = parse(input, &ParserOptions::default())
        .unwrap_or_else(|e| panic!("Failed to parse '{}': {}", input, e));
    compile(&expr).unwrap_or_else(|e| panic!("Failed to compile '{}': {}", input, e))
}

fn instructions(code: &[u8]) -> Vec<Instruction> {
    Bytecode::decode_all(code)
        .unwrap()
        .into_iter()
        .map(|(_, instruction)| instruction)
        .collect()
}

fn opcodes(code: &[u8]) -> Vec<Opcode> {
    instructions(code).into_iter().map(|i| i.opcode).collect()
}

fn at(line: usize, column: usize) -> Position {
    Position::new(line, column)
}

// ============================================================================
// Instruction Encoding
// ============================================================================

#[test]
fn test_operand_widths() {
    let test_cases = vec![
        (Opcode::Constant, vec![65534], vec![0x00, 0xFF, 0xFE]),
        (Opcode::LoadVar, vec![1, FLAG_SOFT], vec![0x01, 0x00, 0x01, 0x02]),
        (Opcode::Add, vec![], vec![0x10]),
        (Opcode::Index, vec![FLAG_OPTIONAL], vec![0x72, 0x01]),
        (Opcode::Call, vec![3, 2], vec![0x80, 0x00, 0x03, 0x00, 0x02]),
        (
            Opcode::Pipe,
            vec![1, NO_ALIAS, 0],
            vec![0x90, 0x00, 0x01, 0xFF, 0xFF, 0x00, 0x00],
        ),
    ];

    for (opcode, operands, expected) in test_cases {
        assert_eq!(
            make(opcode, &operands).unwrap(),
            expected,
            "Failed for opcode: {}",
            opcode
        );
    }
}

#[test]
fn test_make_rejects_bad_operands() {
    assert!(make(Opcode::Constant, &[]).is_err());
    assert!(make(Opcode::Constant, &[70_000]).is_err());
    assert!(make(Opcode::Index, &[256]).is_err());
}

#[test]
fn test_every_opcode_byte_is_recognised() {
    for opcode in Opcode::ALL {
        assert_eq!(Opcode::try_from(opcode as u8), Ok(opcode));
    }
    assert!(Opcode::try_from(0xEE).is_err());
}

#[test]
fn test_decode_reports_unknown_opcode() {
    assert!(decode(&[0xEE], 0).is_err());
    assert!(decode(&[0x10], 5).is_err());
}

// ============================================================================
// Constants and Variables
// ============================================================================

#[test]
fn test_literals_are_not_deduplicated() {
    let bytecode = compile_src("1 + 1");
    assert_eq!(bytecode.constants, vec![Value::Number(1.0), Value::Number(1.0)]);
    assert_eq!(
        opcodes(&bytecode.instructions),
        vec![Opcode::Constant, Opcode::Constant, Opcode::Add]
    );
}

#[test]
fn test_context_names_are_deduplicated() {
    let bytecode = compile_src("a + a * b");
    assert_eq!(bytecode.context_vars, vec!["a", "b"]);

    let loads: Vec<usize> = instructions(&bytecode.instructions)
        .into_iter()
        .filter(|i| i.opcode == Opcode::LoadVar)
        .map(|i| i.operand(0))
        .collect();
    assert_eq!(loads, vec![0, 0, 1]);
}

#[test]
fn test_local_names_use_the_constant_pool() {
    let bytecode = compile_src("$item + 1");
    let code = instructions(&bytecode.instructions);
    assert_eq!(code[0].opcode, Opcode::LoadLocal);
    assert_eq!(bytecode.name_at(code[0].operand(0)), Some("$item"));
    assert!(bytecode.context_vars.is_empty());
}

#[test]
fn test_optional_identifier_sets_flag() {
    let bytecode = compile_src("?.user");
    let code = instructions(&bytecode.instructions);
    assert_eq!(code[0].opcode, Opcode::LoadVar);
    assert_eq!(code[0].operand(1), FLAG_OPTIONAL);
}

// ============================================================================
// Access
// ============================================================================

#[test]
fn test_member_access_pushes_key_constant() {
    let bytecode = compile_src("user.name");
    assert_eq!(
        opcodes(&bytecode.instructions),
        vec![Opcode::LoadVar, Opcode::Constant, Opcode::Index]
    );
    assert_eq!(bytecode.constants, vec![Value::from("name")]);
}

#[test]
fn test_positional_member_key_is_a_number() {
    let bytecode = compile_src("items.2");
    assert_eq!(bytecode.constants, vec![Value::Number(2.0)]);
}

#[test]
fn test_optional_access_flags() {
    let bytecode = compile_src("a?.b?[0]");
    let flags: Vec<usize> = instructions(&bytecode.instructions)
        .into_iter()
        .filter(|i| i.opcode == Opcode::Index)
        .map(|i| i.operand(0))
        .collect();
    assert_eq!(flags, vec![FLAG_OPTIONAL, FLAG_OPTIONAL]);
}

#[test]
fn test_slice_fills_missing_bounds_with_null() {
    let bytecode = compile_src("items[::-1]");
    assert_eq!(
        opcodes(&bytecode.instructions),
        vec![
            Opcode::LoadVar,
            Opcode::Constant,
            Opcode::Constant,
            Opcode::Constant,
            Opcode::Negate,
            Opcode::Slice
        ]
    );
    assert_eq!(bytecode.constants[0], Value::Null);
    assert_eq!(bytecode.constants[1], Value::Null);
}

// ============================================================================
// Nullish Coalescing
// ============================================================================

#[test]
fn test_nullish_softens_final_access_only() {
    let bytecode = compile_src("a.b.c ?? 1");
    let code = instructions(&bytecode.instructions);

    let flags: Vec<usize> = code
        .iter()
        .filter(|i| i.opcode == Opcode::Index)
        .map(|i| i.operand(0))
        .collect();
    assert_eq!(flags, vec![0, FLAG_SOFT]);
    assert_eq!(code[0].operand(1), 0);
    assert!(code.iter().any(|i| i.opcode == Opcode::JumpIfNotNull));
}

#[test]
fn test_nullish_softens_bare_variable() {
    let bytecode = compile_src("missing ?? 'x'");
    let code = instructions(&bytecode.instructions);
    assert_eq!(code[0].opcode, Opcode::LoadVar);
    assert_eq!(code[0].operand(1), FLAG_SOFT);
}

#[test]
fn test_nullish_jump_targets_end() {
    let bytecode = compile_src("a ?? 2");
    let code = Bytecode::decode_all(&bytecode.instructions).unwrap();
    let (_, jump) = code
        .iter()
        .find(|(_, i)| i.opcode == Opcode::JumpIfNotNull)
        .unwrap();
    assert_eq!(jump.operand(0), bytecode.instructions.len());
}

// ============================================================================
// Control Flow
// ============================================================================

#[test]
fn test_conditional_jumps() {
    let bytecode = compile_src("a ? 1 : 2");
    let code = Bytecode::decode_all(&bytecode.instructions).unwrap();
    let kinds: Vec<Opcode> = code.iter().map(|(_, i)| i.opcode).collect();
    assert_eq!(
        kinds,
        vec![
            Opcode::LoadVar,
            Opcode::JumpIfFalse,
            Opcode::Constant,
            Opcode::Jump,
            Opcode::Constant
        ]
    );

    // JumpIfFalse lands on the alternate, Jump on the end.
    assert_eq!(code[1].1.operand(0), code[4].0);
    assert_eq!(code[3].1.operand(0), bytecode.instructions.len());
}

#[test]
fn test_logical_operators_short_circuit() {
    assert_eq!(
        opcodes(&compile_src("a && b").instructions),
        vec![
            Opcode::LoadVar,
            Opcode::AndShortCircuit,
            Opcode::LoadVar,
            Opcode::And
        ]
    );
    assert_eq!(
        opcodes(&compile_src("a || b").instructions),
        vec![
            Opcode::LoadVar,
            Opcode::OrShortCircuit,
            Opcode::LoadVar,
            Opcode::Or
        ]
    );
}

#[test]
fn test_operator_opcodes() {
    let test_cases = vec![
        ("1 - 2", Opcode::Sub),
        ("1 * 2", Opcode::Mul),
        ("1 / 2", Opcode::Div),
        ("1 % 2", Opcode::Mod),
        ("1 ^ 2", Opcode::Pow),
        ("1 ** 2", Opcode::Pow),
        ("1 & 2", Opcode::BitAnd),
        ("1 | 2", Opcode::BitOr),
        ("1 ~ 2", Opcode::BitXor),
        ("1 << 2", Opcode::ShiftLeft),
        ("1 >> 2", Opcode::ShiftRight),
        ("1 == 2", Opcode::Equal),
        ("1 <> 2", Opcode::NotEqual),
        ("1 < 2", Opcode::Less),
        ("1 >= 2", Opcode::GreaterEqual),
    ];

    for (input, expected) in test_cases {
        let ops = opcodes(&compile_src(input).instructions);
        assert_eq!(ops.last(), Some(&expected), "Failed for input: {}", input);
    }
}

// ============================================================================
// Collections and Calls
// ============================================================================

#[test]
fn test_object_keys_are_sorted() {
    let bytecode = compile_src("{b: 1, a: 2}");
    assert_eq!(
        bytecode.constants,
        vec![
            Value::from("a"),
            Value::Number(2.0),
            Value::from("b"),
            Value::Number(1.0)
        ]
    );
    let code = instructions(&bytecode.instructions);
    let last = code.last().unwrap();
    assert_eq!(last.opcode, Opcode::Object);
    assert_eq!(last.operand(0), 2);
}

#[test]
fn test_array_count() {
    let bytecode = compile_src("[1, 2, 3]");
    let last = *instructions(&bytecode.instructions).last().unwrap();
    assert_eq!(last.opcode, Opcode::Array);
    assert_eq!(last.operand(0), 3);
}

#[test]
fn test_call_encoding() {
    let bytecode = compile_src("max(1, 2)");
    let last = *instructions(&bytecode.instructions).last().unwrap();
    assert_eq!(last.opcode, Opcode::Call);
    assert_eq!(bytecode.name_at(last.operand(0)), Some("max"));
    assert_eq!(last.operand(1), 2);
}

#[test]
fn test_calling_a_local_is_rejected() {
    let expr = parse("$f(1)", &ParserOptions::default()).unwrap();
    assert_eq!(
        compile(&expr),
        Err(CompileError::InvalidCallee {
            position: at(1, 1)
        })
    );
}

#[test]
fn test_calling_a_literal_is_rejected() {
    let callee = Expr::new(ExprKind::Number(1.0), at(1, 1));
    let expr = Expr::new(
        ExprKind::Call {
            callee: Box::new(callee),
            args: vec![],
        },
        at(1, 1),
    );
    assert!(matches!(
        compile(&expr),
        Err(CompileError::InvalidCallee { .. })
    ));
}

#[test]
fn test_chained_call_is_rejected() {
    let expr = parse("f(1)(2)", &ParserOptions::default()).unwrap();
    match &expr.kind {
        ExprKind::Call { callee, .. } => assert!(matches!(callee.kind, ExprKind::Call { .. })),
        other => panic!("Expected call, got {:?}", other),
    }
    assert_eq!(
        compile(&expr),
        Err(CompileError::InvalidCallee {
            position: at(1, 1)
        })
    );
}

// ============================================================================
// Pipes
// ============================================================================

#[test]
fn test_pipe_stage_becomes_block() {
    let bytecode = compile_src("[1, 2] |map: $item * 2");
    assert_eq!(bytecode.blocks.len(), 1);

    let last = *instructions(&bytecode.instructions).last().unwrap();
    assert_eq!(last.opcode, Opcode::Pipe);
    assert_eq!(bytecode.name_at(last.operand(0)), Some("map"));
    assert_eq!(last.operand(1), NO_ALIAS);
    assert_eq!(last.operand(2), 0);

    assert_eq!(
        opcodes(&bytecode.blocks[0]),
        vec![Opcode::LoadLocal, Opcode::Constant, Opcode::Mul]
    );
}

#[test]
fn test_pipe_aliases() {
    let bytecode = compile_src("items as $all |: $last as $copy");
    let main = instructions(&bytecode.instructions);

    assert_eq!(main[1].opcode, Opcode::StoreLocal);
    assert_eq!(bytecode.name_at(main[1].operand(0)), Some("$all"));

    let pipe = main[2];
    assert_eq!(pipe.opcode, Opcode::Pipe);
    assert_eq!(bytecode.name_at(pipe.operand(0)), Some("default"));
    assert_eq!(bytecode.name_at(pipe.operand(1)), Some("$copy"));
}

#[test]
fn test_each_stage_gets_its_own_block() {
    let bytecode = compile_src("xs |filter: $item > 1 |map: $item |sort: $item");
    assert_eq!(bytecode.blocks.len(), 3);

    let blocks: Vec<usize> = instructions(&bytecode.instructions)
        .into_iter()
        .filter(|i| i.opcode == Opcode::Pipe)
        .map(|i| i.operand(2))
        .collect();
    assert_eq!(blocks, vec![0, 1, 2]);
}

#[test]
fn test_jumps_inside_blocks_are_block_relative() {
    let bytecode = compile_src("xs |map: $item ? 1 : 2");
    let block = &bytecode.blocks[0];
    let code = Bytecode::decode_all(block).unwrap();
    let (_, jump) = code.iter().find(|(_, i)| i.opcode == Opcode::Jump).unwrap();
    assert_eq!(jump.operand(0), block.len());
}

#[test]
fn test_nested_pipe_is_rejected() {
    let stage = |expression: Expr, pipe_type: &str| PipeStage {
        expression,
        pipe_type: pipe_type.to_string(),
        alias: None,
        position: at(1, 1),
    };
    let inner = Expr::new(
        ExprKind::Pipe(vec![
            stage(Expr::new(ExprKind::Null, at(1, 1)), "source"),
            stage(Expr::new(ExprKind::Null, at(1, 1)), "map"),
        ]),
        at(1, 2),
    );
    let outer = Expr::new(ExprKind::Array(vec![inner]), at(1, 1));

    assert_eq!(
        compile(&outer),
        Err(CompileError::NestedPipe {
            position: at(1, 2)
        })
    );
}

// ============================================================================
// Limits and Determinism
// ============================================================================

#[test]
fn test_nesting_limit() {
    // Debug builds need more than the default test thread stack here.
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let mut expr = Expr::new(ExprKind::Number(1.0), at(1, 1));
            for _ in 0..MAX_NESTING + 10 {
                expr = Expr::new(
                    ExprKind::Unary {
                        op: tansy_lang::UnaryOp::Negate,
                        operand: Box::new(expr),
                    },
                    at(1, 1),
                );
            }
            compile(&expr)
        })
        .unwrap();

    assert!(matches!(
        handle.join().unwrap(),
        Err(CompileError::NestingTooDeep { .. })
    ));
}

#[test]
fn test_compilation_is_deterministic() {
    let source = "orders |filter: $item.total > 100 |map: {id: $item.id, n: len($item.lines)} as $out";
    assert_eq!(compile_src(source), compile_src(source));
}

#[test]
fn test_disassembly_sections() {
    let listing = compile_src("xs |map: $item + 1").disassemble();
    assert!(listing.contains("== main =="), "got:\n{}", listing);
    assert!(listing.contains("== block 0 =="), "got:\n{}", listing);
    assert!(listing.contains("== constants =="), "got:\n{}", listing);
    assert!(listing.contains("Pipe"), "got:\n{}", listing);
    assert!(listing.contains("LoadLocal"), "got:\n{}", listing);
}
