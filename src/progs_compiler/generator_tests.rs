// IR generator tests

#[cfg(test)]
mod generator_tests {
    use crate::progs_compiler::ast::{BinaryOp, Expr, FunctionDecl, Param, UnaryOp};
    use crate::progs_compiler::config::CompilerOptions;
    use crate::progs_compiler::error::CompilerError;
    use crate::progs_compiler::generator::Generator;
    use crate::progs_compiler::instruction::{BinaryInstr, Instruction, Jump, Ref};
    use crate::progs_compiler::ir::{Ir, IrProgram};
    use crate::progs_compiler::registry::{OperationRegistry, BUILTIN_MOD, BUILTIN_XOR};
    use crate::progs_compiler::types::Type;
    use crate::progs_compiler::value::Value;
    use test_log::test;

    fn lower(roots: Vec<Expr>) -> Result<IrProgram, CompilerError> {
        let registry = OperationRegistry::new();
        let mut generator = Generator::new(&registry, CompilerOptions::default());
        generator.generate_program(roots)
    }

    fn body<'p>(program: &'p IrProgram, name: &str) -> &'p [Ir] {
        program
            .functions
            .iter()
            .find(|function| function.name == name)
            .and_then(|function| function.body.as_deref())
            .unwrap_or_else(|| panic!("no body for {}", name))
    }

    fn instructions(ir: &[Ir]) -> Vec<&Instruction> {
        ir.iter().filter_map(|node| node.instruction.as_ref()).collect()
    }

    fn count(ir: &[Ir], pred: impl Fn(&Instruction) -> bool) -> usize {
        instructions(ir).into_iter().filter(|i| pred(i)).count()
    }

    /// `void name(float n) { statements }`
    fn with_param(name: &str, statements: Vec<Expr>) -> Expr {
        Expr::function(
            name,
            Type::Void,
            vec![Param::new("n", Type::Float)],
            statements,
        )
    }

    fn positive() -> Expr {
        Expr::binary(BinaryOp::Gt, Expr::reference("n"), Expr::int(0))
    }

    fn decrement() -> Expr {
        Expr::assign(
            Expr::reference("n"),
            Expr::binary(BinaryOp::Subtract, Expr::reference("n"), Expr::int(1)),
        )
    }

    fn loop_jumps(ir: &[Ir]) -> Vec<(bool, Jump)> {
        instructions(ir)
            .into_iter()
            .filter_map(|i| match i {
                Instruction::If { expect, target, .. } => Some((*expect, target.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_folded_assignment_is_a_single_store() {
        let program = lower(vec![
            Expr::declare("x", Type::Float),
            Expr::function(
                "main",
                Type::Void,
                Vec::new(),
                vec![Expr::assign(
                    Expr::reference("x"),
                    Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(2)),
                )],
            ),
        ])
        .unwrap();
        let main = body(&program, "main");
        assert_eq!(count(main, |i| matches!(i, Instruction::Store { .. })), 1);
        assert_eq!(count(main, |i| matches!(i, Instruction::Binary { .. })), 0);
        assert_eq!(program.declarations.len(), 1);
    }

    #[test]
    fn test_while_loop_layout() {
        let program = lower(vec![with_param(
            "drain",
            vec![Expr::while_loop(positive(), Expr::Block(vec![decrement()]))],
        )])
        .unwrap();
        let drain = body(&program, "drain");
        // predicate (1) is emitted before the body and again after it
        let compares = count(drain, |i| {
            matches!(i, Instruction::Binary { op: BinaryInstr::Gt, .. })
        });
        assert_eq!(compares, 2);
        // body = SUB + STORE, no update, predicate = GT
        assert_eq!(
            loop_jumps(drain),
            vec![(false, Jump::Relative(5)), (true, Jump::Relative(-3))]
        );
    }

    #[test]
    fn test_do_while_skips_the_entry_test() {
        let program = lower(vec![with_param(
            "drain",
            vec![Expr::do_while(Expr::Block(vec![decrement()]), positive())],
        )])
        .unwrap();
        let drain = body(&program, "drain");
        assert_eq!(loop_jumps(drain), vec![(true, Jump::Relative(-3))]);
        // leading predicate is still evaluated, only the skip is dropped
        let compares = count(drain, |i| {
            matches!(i, Instruction::Binary { op: BinaryInstr::Gt, .. })
        });
        assert_eq!(compares, 2);
        let position = |wanted: BinaryInstr| {
            instructions(drain)
                .into_iter()
                .position(|i| matches!(i, Instruction::Binary { op, .. } if *op == wanted))
                .unwrap()
        };
        assert!(position(BinaryInstr::Gt) < position(BinaryInstr::SubFloat));
    }

    #[test]
    fn test_empty_loop_is_rejected() {
        let err = lower(vec![with_param(
            "idle",
            vec![Expr::while_loop(Expr::reference("n"), Expr::Block(Vec::new()))],
        )])
        .unwrap_err();
        assert_eq!(
            err,
            CompilerError::UnsupportedConstruct("empty loop".to_string())
        );
    }

    #[test]
    fn test_string_condition_is_tested_directly() {
        let program = lower(vec![Expr::function(
            "greet",
            Type::Void,
            vec![Param::new("s", Type::String)],
            vec![Expr::if_else(
                Expr::reference("s"),
                Expr::Block(Vec::new()),
                None,
            )],
        )])
        .unwrap();
        let greet = body(&program, "greet");
        let tests: Vec<_> = instructions(greet)
            .into_iter()
            .filter_map(|i| match i {
                Instruction::If {
                    condition, expect, ..
                } => Some((*condition, *expect)),
                _ => None,
            })
            .collect();
        assert_eq!(tests, vec![(Ref::Local(0), false)]);
        assert_eq!(count(greet, |i| matches!(i, Instruction::Binary { .. })), 0);
    }

    #[test]
    fn test_break_and_continue_become_relative_jumps() {
        let program = lower(vec![with_param(
            "spin",
            vec![Expr::while_loop(
                positive(),
                Expr::Block(vec![Expr::Break, Expr::Continue]),
            )],
        )])
        .unwrap();
        let gotos: Vec<Jump> = instructions(body(&program, "spin"))
            .into_iter()
            .filter_map(|i| match i {
                Instruction::Goto(target) => Some(target.clone()),
                _ => None,
            })
            .collect();
        // break skips the rest of the body, the predicate copy and the IF;
        // continue lands on the predicate copy
        assert_eq!(gotos, vec![Jump::Relative(4), Jump::Relative(1)]);
    }

    #[test]
    fn test_for_loop_update_runs_before_the_retest() {
        let program = lower(vec![with_param(
            "count",
            vec![
                Expr::declare("i", Type::Float),
                Expr::for_loop(
                    vec![Expr::assign(Expr::reference("i"), Expr::int(0))],
                    Expr::binary(BinaryOp::Lt, Expr::reference("i"), Expr::reference("n")),
                    vec![Expr::unary(UnaryOp::PreIncrement, Expr::reference("i"))],
                    Expr::Block(vec![Expr::Continue]),
                ),
            ],
        )])
        .unwrap();
        let ir = body(&program, "count");
        // body 1, update ADD + STORE, predicate 1
        assert_eq!(
            loop_jumps(ir),
            vec![(false, Jump::Relative(6)), (true, Jump::Relative(-4))]
        );
        assert!(instructions(ir).contains(&&Instruction::Goto(Jump::Relative(1))));
    }

    #[test]
    fn test_postfix_increment_yields_previous_value() {
        let program = lower(vec![with_param(
            "bump",
            vec![Expr::unary(UnaryOp::PostIncrement, Expr::reference("n"))],
        )])
        .unwrap();
        let ops: Vec<&Instruction> = instructions(body(&program, "bump"));
        assert_eq!(ops.len(), 3);
        assert!(matches!(
            ops[0],
            Instruction::Binary { op: BinaryInstr::AddFloat, .. }
        ));
        assert!(matches!(ops[1], Instruction::Store { ty: Type::Float, .. }));
        assert!(matches!(
            ops[2],
            Instruction::Binary { op: BinaryInstr::SubFloat, .. }
        ));
    }

    #[test]
    fn test_entity_compound_assignment_evaluates_entity_once() {
        let program = lower(vec![
            Expr::declare("health", Type::field(Type::Float)),
            Expr::builtin("spawn", Type::function(Type::Entity, Vec::new()), 14),
            Expr::function(
                "heal",
                Type::Void,
                Vec::new(),
                vec![Expr::binary(
                    BinaryOp::AddAssign,
                    Expr::index(Expr::call("spawn", Vec::new()), Expr::reference("health")),
                    Expr::int(5),
                )],
            ),
        ])
        .unwrap();
        let heal = body(&program, "heal");
        assert_eq!(count(heal, |i| matches!(i, Instruction::Call { .. })), 1);
        assert_eq!(count(heal, |i| matches!(i, Instruction::Load { .. })), 1);
        assert_eq!(count(heal, |i| matches!(i, Instruction::Address { .. })), 1);
        assert_eq!(
            count(heal, |i| matches!(i, Instruction::StoreP { ty: Type::Float, .. })),
            1
        );
    }

    #[test]
    fn test_modulo_binds_builtin_on_first_use() {
        let program = lower(vec![Expr::function(
            "wrap",
            Type::Float,
            vec![Param::new("a", Type::Float), Param::new("b", Type::Float)],
            vec![Expr::ret(Some(Expr::binary(
                BinaryOp::Modulo,
                Expr::reference("a"),
                Expr::reference("b"),
            )))],
        )])
        .unwrap();
        let builtin = program
            .functions
            .iter()
            .find(|function| function.name == BUILTIN_MOD)
            .unwrap();
        assert_eq!(builtin.builtin, Some(CompilerOptions::default().builtin_mod));
        assert_eq!(builtin.param_sizes, vec![1, 1]);
        let wrap = body(&program, "wrap");
        assert_eq!(count(wrap, |i| matches!(i, Instruction::Call { .. })), 1);
    }

    #[test]
    fn test_exclusive_or_binds_builtin_on_first_use() {
        let program = lower(vec![Expr::function(
            "flip",
            Type::Float,
            vec![Param::new("a", Type::Float), Param::new("b", Type::Float)],
            vec![
                Expr::binary(
                    BinaryOp::ExclusiveOrAssign,
                    Expr::reference("a"),
                    Expr::reference("b"),
                ),
                Expr::ret(Some(Expr::binary(
                    BinaryOp::ExclusiveOr,
                    Expr::reference("a"),
                    Expr::reference("b"),
                ))),
            ],
        )])
        .unwrap();
        let bound: Vec<_> = program
            .functions
            .iter()
            .filter(|function| function.name == BUILTIN_XOR)
            .collect();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].builtin, Some(CompilerOptions::default().builtin_xor));
        assert_eq!(bound[0].builtin, Some(246));
        assert_eq!(bound[0].param_sizes, vec![1, 1]);
        let flip = body(&program, "flip");
        assert_eq!(count(flip, |i| matches!(i, Instruction::Call { .. })), 2);
    }

    #[test]
    fn test_constant_and_variable_casts_agree() {
        // `(int)2.5` is not folded, so both casts only relabel their operand
        let cast = |operand: Expr| Expr::Cast {
            ty: Type::Int,
            operand: Box::new(operand),
        };
        let program = lower(vec![
            Expr::function(
                "fixed",
                Type::Int,
                Vec::new(),
                vec![Expr::ret(Some(cast(Expr::float(2.5))))],
            ),
            Expr::function(
                "dynamic",
                Type::Int,
                vec![Param::new("n", Type::Float)],
                vec![Expr::ret(Some(cast(Expr::reference("n"))))],
            ),
        ])
        .unwrap();
        for name in ["fixed", "dynamic"] {
            let ir = body(&program, name);
            let at = ir
                .iter()
                .position(|node| node.name.starts_with("(int) "))
                .unwrap_or_else(|| panic!("no cast in {}", name));
            assert!(at > 0);
            assert_eq!(ir[at].result, ir[at - 1].result);
            assert!(ir.iter().any(|node| matches!(
                &node.instruction,
                Some(Instruction::Return { value }) if *value == ir[at].result
            )));
        }
    }

    #[test]
    fn test_logical_and_short_circuits_only_when_impure() {
        let pure = lower(vec![Expr::function(
            "both",
            Type::Float,
            vec![Param::new("a", Type::Float), Param::new("b", Type::Float)],
            vec![Expr::ret(Some(Expr::binary(
                BinaryOp::And,
                Expr::reference("a"),
                Expr::reference("b"),
            )))],
        )])
        .unwrap();
        let both = body(&pure, "both");
        assert_eq!(
            count(both, |i| matches!(i, Instruction::Binary { op: BinaryInstr::And, .. })),
            1
        );
        assert_eq!(count(both, |i| matches!(i, Instruction::If { .. })), 0);

        let impure = lower(vec![
            Expr::builtin("random", Type::function(Type::Float, Vec::new()), 7),
            Expr::function(
                "chance",
                Type::Float,
                vec![Param::new("a", Type::Float)],
                vec![Expr::ret(Some(Expr::binary(
                    BinaryOp::And,
                    Expr::call("random", Vec::new()),
                    Expr::reference("a"),
                )))],
            ),
        ])
        .unwrap();
        let chance = body(&impure, "chance");
        assert_eq!(
            count(chance, |i| matches!(i, Instruction::Binary { op: BinaryInstr::And, .. })),
            0
        );
        assert!(count(chance, |i| matches!(i, Instruction::If { .. })) >= 2);
    }

    #[test]
    fn test_switch_rewrites_break_to_its_end() {
        let program = lower(vec![with_param(
            "pick",
            vec![Expr::Switch {
                test: Box::new(Expr::reference("n")),
                body: vec![
                    Expr::Case(Some(Box::new(Expr::float(1.0)))),
                    decrement(),
                    Expr::Break,
                    Expr::Case(None),
                    Expr::Nop,
                ],
            }],
        )])
        .unwrap();
        let ir = body(&program, "pick");
        let targets: Vec<&Jump> = instructions(ir)
            .into_iter()
            .filter_map(|i| match i {
                Instruction::Goto(target) | Instruction::If { target, .. } => Some(target),
                _ => None,
            })
            .collect();
        assert_eq!(targets.len(), 3);
        assert!(targets
            .iter()
            .all(|target| matches!(target, Jump::Label(id) if id.contains('.'))));
    }

    #[test]
    fn test_second_default_is_rejected() {
        let err = lower(vec![with_param(
            "pick",
            vec![Expr::Switch {
                test: Box::new(Expr::reference("n")),
                body: vec![Expr::Case(None), Expr::Case(None)],
            }],
        )])
        .unwrap_err();
        assert!(matches!(err, CompilerError::UnsupportedConstruct(_)));
    }

    #[test]
    fn test_undefined_symbol() {
        let err = lower(vec![Expr::function(
            "main",
            Type::Float,
            Vec::new(),
            vec![Expr::ret(Some(Expr::reference("missing")))],
        )])
        .unwrap_err();
        assert_eq!(err, CompilerError::UndefinedSymbol("missing".to_string()));
    }

    #[test]
    fn test_prototype_and_definition_share_an_index() {
        let signature = Type::function(Type::Void, Vec::new());
        let prototype = Expr::Function(Box::new(FunctionDecl {
            name: "think".to_string(),
            signature,
            params: Vec::new(),
            vararg: None,
            body: None,
            builtin: None,
        }));
        let program = lower(vec![
            prototype,
            Expr::function("main", Type::Void, Vec::new(), vec![Expr::call("think", Vec::new())]),
            Expr::function("think", Type::Void, Vec::new(), Vec::new()),
        ])
        .unwrap();
        let names: Vec<&str> = program.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["think", "main"]);
        assert!(program.functions[0].body.is_some());
    }

    #[test]
    fn test_type_of_uses_registry_results() {
        let registry = OperationRegistry::new();
        let generator = Generator::new(&registry, CompilerOptions::default());
        let scaled = Expr::binary(
            BinaryOp::Multiply,
            Expr::float(2.0),
            Expr::Constant(Value::Vector([1.0, 0.0, 0.0])),
        );
        assert_eq!(generator.type_of(&scaled).unwrap(), Type::Vector);
        let compare = Expr::binary(BinaryOp::Lt, Expr::int(1), Expr::float(2.0));
        assert_eq!(generator.type_of(&compare).unwrap(), Type::Bool);
    }
}
