// IR Generator - Control Flow
//
// Conditionals, loops and switch. Loops use relative jumps computed from
// statement counts; conditionals and switch use labels resolved at emission.

use super::super::allocator::ScopeKind;
use super::super::ast::{BinaryOp, Expr, LoopExpr};
use super::super::error::CompilerError;
use super::super::instruction::{Instruction, Jump, Ref};
use super::super::ir::{result_of, statement_count, Ir};
use super::Generator;
use indexmap::IndexMap;

impl Generator<'_> {
    /// IF and IFNOT test the raw condition slot, so any nonzero word, non-null
    /// string, entity or nonzero vector counts as true.
    pub(super) fn generate_conditional(
        &mut self,
        test: &Expr,
        pass: &Expr,
        fail: Option<&Expr>,
        expression: bool,
    ) -> Result<Vec<Ir>, CompilerError> {
        let out = match expression {
            true => {
                let ty = self.type_of(pass)?;
                Some((self.allocate_temp(&ty), ty))
            }
            false => None,
        };
        let end = self.next_label("endif");

        let mut ir = self.generate(test)?;
        let condition = result_of(&ir);

        let branch = |generator: &mut Self, expr: &Expr| -> Result<Vec<Ir>, CompilerError> {
            let mut ir = generator.generate(expr)?;
            if let Some((out, ty)) = &out {
                let value = result_of(&ir);
                ir.extend(Self::store_ir(ty, value, *out));
            }
            Ok(ir)
        };

        match fail {
            Some(fail) => {
                let otherwise = self.next_label("else");
                ir.push(if_jump(condition, false, &otherwise));
                ir.extend(branch(self, pass)?);
                ir.push(Ir::new(
                    Instruction::Goto(Jump::Label(end.clone())),
                    Ref::Null,
                    format!("goto {}", end),
                ));
                ir.push(Ir::label(otherwise));
                ir.extend(branch(self, fail)?);
            }
            None => {
                ir.push(if_jump(condition, false, &end));
                ir.extend(branch(self, pass)?);
            }
        }
        ir.push(Ir::label(end));
        if let Some((out, _)) = out {
            ir.push(Ir::value(out, "conditional result"));
        }
        Ok(ir)
    }

    /// Layout (while-style; do-while keeps the leading pred but drops the skip):
    ///
    /// ```text
    ///     init
    ///     pred                 P statements
    ///     IFNOT pred, +(B+U+P+2)
    ///     body                 B statements
    ///     update               U statements
    ///     pred
    ///     IF pred, -(B+U+P)
    /// ```
    pub(super) fn generate_loop(&mut self, lp: &LoopExpr) -> Result<Vec<Ir>, CompilerError> {
        self.allocator.push("loop", ScopeKind::Block);
        let result = self.generate_loop_scoped(lp);
        self.allocator.pop();
        result
    }

    fn generate_loop_scoped(&mut self, lp: &LoopExpr) -> Result<Vec<Ir>, CompilerError> {
        let mut init = Vec::new();
        for expr in &lp.initializer {
            init.extend(self.generate(expr)?);
        }
        let pred = self.generate(&lp.predicate)?;
        let condition = result_of(&pred);
        let mut body = self.generate(&lp.body)?;
        let mut update = Vec::new();
        for expr in &lp.update {
            update.extend(self.generate(expr)?);
        }

        let pred_count = statement_count(&pred) as i32;
        let body_count = statement_count(&body) as i32;
        let update_count = statement_count(&update) as i32;
        let total = body_count + update_count + pred_count;
        log::debug!(
            "LOOP body={} update={} predicate={}",
            body_count,
            update_count,
            pred_count
        );
        if total == 0 {
            return Err(CompilerError::UnsupportedConstruct("empty loop".to_string()));
        }

        patch_loop_jumps(&mut body, body_count, update_count + pred_count + 1);
        let pred_copy = self.relabel(&pred);

        let mut ir = init;
        ir.extend(pred);
        if lp.check_before {
            ir.push(Ir::new(
                Instruction::If {
                    condition,
                    expect: false,
                    target: Jump::Relative(total + 2),
                },
                Ref::Null,
                "loop exit",
            ));
        }
        ir.extend(body);
        ir.extend(update);
        ir.extend(pred_copy);
        ir.push(Ir::new(
            Instruction::If {
                condition,
                expect: true,
                target: Jump::Relative(-total),
            },
            Ref::Null,
            "loop repeat",
        ));
        Ok(ir)
    }

    /// Copy of `ir` with every label it defines renamed, so a sequence can
    /// be emitted twice in one function.
    fn relabel(&mut self, ir: &[Ir]) -> Vec<Ir> {
        let mut renamed: IndexMap<String, String> = IndexMap::new();
        for node in ir {
            if let Some(Instruction::Label(id)) = &node.instruction {
                let fresh = format!("{}/{}", id, self.next_label("copy"));
                renamed.insert(id.clone(), fresh);
            }
        }
        ir.iter()
            .cloned()
            .map(|mut node| {
                match &mut node.instruction {
                    Some(Instruction::Label(id)) => {
                        if let Some(fresh) = renamed.get(id) {
                            *id = fresh.clone();
                            node.name = fresh.clone();
                        }
                    }
                    Some(instruction) => {
                        if let Some(Jump::Label(id)) = instruction.jump_target_mut() {
                            if let Some(fresh) = renamed.get(id) {
                                *id = fresh.clone();
                            }
                        }
                    }
                    None => {}
                }
                node
            })
            .collect()
    }

    pub(super) fn generate_switch(
        &mut self,
        test: &Expr,
        body: &[Expr],
    ) -> Result<Vec<Ir>, CompilerError> {
        self.allocator.push("switch", ScopeKind::Block);
        let result = self.generate_switch_scoped(test, body);
        self.allocator.pop();
        result
    }

    fn generate_switch_scoped(
        &mut self,
        test: &Expr,
        body: &[Expr],
    ) -> Result<Vec<Ir>, CompilerError> {
        let ty = self.type_of(test)?;
        let mut ir = self.generate(test)?;
        let subject = Expr::Memory {
            reference: result_of(&ir),
            ty,
        };
        let end = self.next_label("endswitch");

        let mut labels = Vec::with_capacity(body.len());
        let mut default = None;
        for child in body {
            let Expr::Case(value) = child else {
                labels.push(None);
                continue;
            };
            let label = self.next_label("case");
            match value {
                Some(value) => {
                    let compare =
                        Expr::binary(BinaryOp::Eq, subject.clone(), (**value).clone());
                    let compare_ir = self.generate(&compare)?;
                    let matched = result_of(&compare_ir);
                    ir.extend(compare_ir);
                    ir.push(if_jump(matched, true, &label));
                }
                None => {
                    if default.is_some() {
                        return Err(CompilerError::UnsupportedConstruct(
                            "switch with more than one default".to_string(),
                        ));
                    }
                    default = Some(label.clone());
                }
            }
            labels.push(Some(label));
        }
        let fallback = default.unwrap_or_else(|| end.clone());
        ir.push(Ir::new(
            Instruction::Goto(Jump::Label(fallback.clone())),
            Ref::Null,
            format!("goto {}", fallback),
        ));

        let mut cases = Vec::new();
        for (child, label) in body.iter().zip(labels) {
            match label {
                Some(label) => cases.push(Ir::label(label)),
                None => cases.extend(self.generate(child)?),
            }
        }
        // `continue` belongs to an enclosing loop and is left alone
        for node in &mut cases {
            if let Some(target) = node.instruction.as_mut().and_then(|i| i.jump_target_mut()) {
                if *target == Jump::Break {
                    *target = Jump::Label(end.clone());
                }
            }
        }
        ir.extend(cases);
        ir.push(Ir::label(end));
        Ok(ir)
    }
}

fn if_jump(condition: Ref, expect: bool, label: &str) -> Ir {
    let name = if expect { "if" } else { "ifnot" };
    Ir::new(
        Instruction::If {
            condition,
            expect,
            target: Jump::Label(label.to_string()),
        },
        Ref::Null,
        format!("{} {}", name, label),
    )
}

/// Resolve `break`/`continue` placeholders left in a loop body. A jump at
/// statement `i` continues at the update (`B - i`) or breaks past the
/// trailing test (`B - i + after_body`).
fn patch_loop_jumps(body: &mut [Ir], body_count: i32, after_body: i32) {
    let mut position = 0;
    for node in body.iter_mut() {
        let count = node.statement_count() as i32;
        if let Some(Instruction::Goto(target)) = &mut node.instruction {
            let remaining = body_count - 1 - position;
            match target {
                Jump::Continue => *target = Jump::Relative(remaining + 1),
                Jump::Break => *target = Jump::Relative(remaining + 1 + after_body),
                _ => {}
            }
        }
        position += count;
    }
}
