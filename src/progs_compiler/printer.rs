// C-like pretty printer
//
// Renders (reduced) expression trees back to readable source. The printer
// holds no state; indentation depth is threaded through the calls.

use super::ast::{Expr, FunctionDecl, LoopExpr, UnaryOp};
use super::types::Type;
use super::value::Value;

/// Pre-order walk over `expr`, passing each node with its depth
pub fn walk(expr: &Expr, visit: &mut impl FnMut(&Expr, usize)) {
    fn go(expr: &Expr, depth: usize, visit: &mut impl FnMut(&Expr, usize)) {
        visit(expr, depth);
        for child in expr.children() {
            go(child, depth + 1, visit);
        }
    }
    go(expr, 0, visit);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CPrinter;

impl CPrinter {
    pub fn new() -> Self {
        CPrinter
    }

    /// Every root as a top-level statement, one per line
    pub fn print(&self, roots: &[Expr]) -> String {
        let mut out = String::new();
        for root in roots {
            out.push_str(&self.statement(root, 0));
            out.push('\n');
        }
        out
    }

    pub fn statement(&self, expr: &Expr, depth: usize) -> String {
        let pad = indent(depth);
        match expr {
            Expr::Nop => format!("{};", pad),
            Expr::Block(children) => format!("{}{}", pad, self.block(children, depth)),
            Expr::Declaration { name, ty, value } => match value {
                Some(value) => format!("{}{} = {};", pad, declarator(ty, name), constant(value)),
                None => format!("{}{};", pad, declarator(ty, name)),
            },
            Expr::Function(decl) => format!("{}{}", pad, self.function(decl, depth)),
            Expr::Conditional {
                test,
                pass,
                fail,
                expression: false,
            } => {
                let mut out = format!(
                    "{}if ({})\n{}",
                    pad,
                    self.expr(test),
                    self.nested(pass, depth)
                );
                if let Some(fail) = fail {
                    out.push_str(&format!("\n{}else\n{}", pad, self.nested(fail, depth)));
                }
                out
            }
            Expr::Loop(lp) => format!("{}{}", pad, self.loop_statement(lp, depth)),
            Expr::Switch { test, body } => {
                let mut out = format!("{}switch ({}) {{\n", pad, self.expr(test));
                for child in body {
                    let inner = match child {
                        Expr::Case(_) => depth,
                        _ => depth + 1,
                    };
                    out.push_str(&self.statement(child, inner));
                    out.push('\n');
                }
                out.push_str(&format!("{}}}", pad));
                out
            }
            Expr::Case(Some(value)) => format!("{}case {}:", pad, self.expr(value)),
            Expr::Case(None) => format!("{}default:", pad),
            Expr::Label(label) => format!("{}:", label),
            Expr::Break => format!("{}break;", pad),
            Expr::Continue => format!("{}continue;", pad),
            Expr::Goto(label) => format!("{}goto {};", pad, label),
            Expr::Return(Some(value)) => format!("{}return {};", pad, self.expr(value)),
            Expr::Return(None) => format!("{}return;", pad),
            Expr::Constant(_)
            | Expr::Reference(_)
            | Expr::Memory { .. }
            | Expr::Binary { .. }
            | Expr::Unary { .. }
            | Expr::Cast { .. }
            | Expr::Conditional { .. }
            | Expr::Call { .. }
            | Expr::Member { .. }
            | Expr::Index { .. } => format!("{}{};", pad, self.expr(expr)),
        }
    }

    /// Expression-position rendering
    pub fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Constant(value) => constant(value),
            Expr::Reference(name) => name.clone(),
            Expr::Memory { reference, .. } => reference.to_string(),
            Expr::Binary { op, left, right } if op.is_assignment() => {
                format!("{} {} {}", self.expr(left), op.symbol(), self.expr(right))
            }
            Expr::Binary { op, left, right } => {
                format!("({} {} {})", self.expr(left), op.symbol(), self.expr(right))
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::PostIncrement => format!("{}++", self.expr(operand)),
                UnaryOp::PostDecrement => format!("{}--", self.expr(operand)),
                _ => format!("{}{}", op.symbol(), self.expr(operand)),
            },
            Expr::Cast { ty, operand } => format!("({}) {}", ty, self.expr(operand)),
            Expr::Conditional {
                test, pass, fail, ..
            } => match fail {
                Some(fail) => format!(
                    "({} ? {} : {})",
                    self.expr(test),
                    self.expr(pass),
                    self.expr(fail)
                ),
                None => format!("({} ? {})", self.expr(test), self.expr(pass)),
            },
            Expr::Call { function, args } => {
                let args: Vec<String> = args.iter().map(|arg| self.expr(arg)).collect();
                format!("{}({})", self.expr(function), args.join(", "))
            }
            Expr::Member { left, field } => format!("{}.{}", self.expr(left), field),
            Expr::Index { left, right } => format!("{}[{}]", self.expr(left), self.expr(right)),
            Expr::Declaration { name, .. } => name.clone(),
            other => format!("/* {} */", other.shape()),
        }
    }

    fn block(&self, children: &[Expr], depth: usize) -> String {
        let mut out = String::from("{\n");
        for child in children {
            out.push_str(&self.statement(child, depth + 1));
            out.push('\n');
        }
        out.push_str(&indent(depth));
        out.push('}');
        out
    }

    /// Body of an `if`/loop: blocks stay at the current depth
    fn nested(&self, expr: &Expr, depth: usize) -> String {
        match expr {
            Expr::Block(_) => self.statement(expr, depth),
            _ => self.statement(expr, depth + 1),
        }
    }

    fn function(&self, decl: &FunctionDecl, depth: usize) -> String {
        let ret = match &decl.signature {
            Type::Function { ret, .. } => ret.to_string(),
            other => other.to_string(),
        };
        let mut params: Vec<String> = decl
            .params
            .iter()
            .map(|param| declarator(&param.ty, &param.name))
            .collect();
        if let Some(vararg) = &decl.vararg {
            params.push(format!("{}...", declarator(&vararg.ty, &vararg.name)));
        }
        let head = format!("{} {}({})", ret, decl.name, params.join(", "));
        match (&decl.body, decl.builtin) {
            (_, Some(number)) => format!("{} = #{};", head, number),
            (None, None) => format!("{};", head),
            (Some(body), None) => format!("{} {}", head, self.block(body, depth)),
        }
    }

    fn loop_statement(&self, lp: &LoopExpr, depth: usize) -> String {
        let list = |items: &[Expr]| -> String {
            items
                .iter()
                .map(|item| self.expr(item))
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !lp.check_before {
            return format!(
                "do\n{}\n{}while ({});",
                self.nested(&lp.body, depth),
                indent(depth),
                self.expr(&lp.predicate)
            );
        }
        if lp.initializer.is_empty() && lp.update.is_empty() {
            return format!(
                "while ({})\n{}",
                self.expr(&lp.predicate),
                self.nested(&lp.body, depth)
            );
        }
        format!(
            "for ({}; {}; {})\n{}",
            list(&lp.initializer),
            self.expr(&lp.predicate),
            list(&lp.update),
            self.nested(&lp.body, depth)
        )
    }
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn constant(value: &Value) -> String {
    match value {
        Value::Vector([x, y, z]) => format!("(vector) {{ {:?}, {:?}, {:?} }}", x, y, z),
        other => other.to_string(),
    }
}

fn declarator(ty: &Type, name: &str) -> String {
    match ty {
        Type::Function { ret, args, .. } => {
            let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
            format!("{} (*{})({})", ret, name, args.join(", "))
        }
        Type::Array(element, length) => format!("{} {}[{}]", element, name, length),
        other => format!("{} {}", other, name),
    }
}

#[cfg(test)]
#[path = "printer_tests.rs"]
mod tests;
