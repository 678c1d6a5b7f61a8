/// End-to-end compilation: expression trees in, a readable progs image out
use progsc::progs_compiler::ast::{BinaryOp, Expr, Param, UnaryOp};
use progsc::progs_compiler::opcodes::Opcode;
use progsc::progs_compiler::program::{ProgramData, HEADER_SIZE};
use progsc::progs_compiler::types::Type;
use progsc::progs_compiler::value::Value;
use progsc::progs_compiler::{CompilerError, ProgsCompiler};

fn unit() -> Vec<Expr> {
    vec![
        Expr::builtin("print", Type::function(Type::Void, vec![Type::String]), 1),
        Expr::Declaration {
            name: "speed".to_string(),
            ty: Type::Float,
            value: Some(Value::Float(2.5)),
        },
        Expr::declare("health", Type::field(Type::Float)),
        Expr::function(
            "scale",
            Type::Float,
            vec![Param::new("x", Type::Float)],
            vec![Expr::ret(Some(Expr::binary(
                BinaryOp::Multiply,
                Expr::reference("x"),
                Expr::reference("speed"),
            )))],
        ),
        Expr::function(
            "main",
            Type::Void,
            Vec::new(),
            vec![
                Expr::declare("i", Type::Float),
                Expr::for_loop(
                    vec![Expr::assign(Expr::reference("i"), Expr::int(0))],
                    Expr::binary(BinaryOp::Lt, Expr::reference("i"), Expr::int(3)),
                    vec![Expr::unary(UnaryOp::PreIncrement, Expr::reference("i"))],
                    Expr::Block(vec![Expr::call("print", vec![Expr::string("tick")])]),
                ),
                Expr::if_else(
                    Expr::binary(BinaryOp::Gt, Expr::reference("i"), Expr::int(2)),
                    Expr::call("scale", vec![Expr::reference("i")]),
                    None,
                ),
            ],
        ),
    ]
}

fn name_of<'p>(program: &'p ProgramData, offset: i32) -> &'p str {
    program.strings.get(offset).unwrap_or("?")
}

#[test]
fn test_compiles_function_table() {
    let program = ProgsCompiler::new().compile(unit()).unwrap();

    assert_eq!(program.header.version, 6);
    assert_eq!(program.header.crc, 5927);
    assert_eq!(program.statements[0].op, Opcode::Done);

    let names: Vec<&str> = program
        .functions
        .iter()
        .skip(1)
        .map(|function| name_of(&program, function.name))
        .collect();
    assert_eq!(names, vec!["print", "scale", "main"]);
    assert_eq!(program.functions[1].first_statement, -1);
    assert_eq!(program.functions[2].num_params, 1);
    assert_eq!(program.functions[2].first_statement, 1);
    assert!(program.functions[3].first_statement > 1);
    assert_eq!(program.header.entity_fields, 1);
    assert!(program.strings.entries().iter().any(|s| s == "tick"));
}

#[test]
fn test_jumps_stay_inside_their_function() {
    let program = ProgsCompiler::new().compile(unit()).unwrap();
    let mut bodies: Vec<usize> = program
        .functions
        .iter()
        .filter(|function| function.first_statement > 0)
        .map(|function| function.first_statement as usize)
        .collect();
    bodies.sort_unstable();

    for (n, &start) in bodies.iter().enumerate() {
        let end = bodies.get(n + 1).copied().unwrap_or(program.statements.len());
        assert_eq!(program.statements[end - 1].op, Opcode::Done);
        for index in start..end {
            let statement = program.statements[index];
            let offset = match statement.op.jump_operand() {
                Some(0) => statement.a,
                Some(_) => statement.b,
                None => continue,
            };
            assert_ne!(offset, 0, "zero jump at {}", index);
            let target = index as i64 + offset as i64;
            assert!(
                (start as i64..end as i64).contains(&target),
                "{} at {} jumps outside {}..{}",
                statement,
                index,
                start,
                end
            );
        }
    }
}

#[test]
fn test_output_is_deterministic_and_reads_back() {
    let compiler = ProgsCompiler::new();
    let first = compiler.compile_to_bytes(unit()).unwrap();
    let second = compiler.compile_to_bytes(unit()).unwrap();
    assert_eq!(first, second);

    let program = ProgramData::read(&first).unwrap();
    assert_eq!(program.header.statements.offset, HEADER_SIZE as i32);
    assert_eq!(program.to_bytes(), first);

    let speed = program
        .global_defs
        .iter()
        .find(|def| name_of(&program, def.name) == "speed")
        .unwrap();
    assert_eq!(
        f32::from_bits(program.global_data[speed.offset as usize]),
        2.5
    );
}

#[test]
fn test_errors_propagate() {
    let err = ProgsCompiler::new()
        .compile(vec![Expr::function(
            "main",
            Type::Void,
            Vec::new(),
            vec![Expr::call("nowhere", Vec::new())],
        )])
        .unwrap_err();
    assert_eq!(err, CompilerError::UndefinedSymbol("nowhere".to_string()));
}
