// Operation registry
//
// Maps (operator, left type, right type) to the handler that lowers it. The
// table is built once per compiler instance and only read afterwards.
//
// Resolution order:
//   1. exact key, then the key with composite types erased to their family
//   2. one numeric coercion step (float widens int/bool, int widens bool,
//      bool moves to the numeric side)
//   3. the universal (op, void, void) handlers: comma, && and ||
//   4. UnsupportedOperation

use super::ast::{BinaryOp, Expr};
use super::error::CompilerError;
use super::generator::Generator;
use super::instruction::{BinaryInstr, Instruction};
use super::ir::{result_of, Ir};
use super::types::Type;
use super::value::Value;
use indexmap::IndexMap;
use std::fmt;

pub const BUILTIN_MOD: &str = "__builtin_mod";
pub const BUILTIN_XOR: &str = "__builtin_xor";

/// Lowering function: (generator, result type, left, right) -> IR
pub type Lowering =
    dyn Fn(&mut Generator<'_>, &Type, &Expr, Option<&Expr>) -> Result<Vec<Ir>, CompilerError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    pub op: &'static str,
    pub left: Type,
    pub right: Option<Type>,
}

impl Operation {
    pub fn new(op: &'static str, left: Type, right: Option<Type>) -> Self {
        Operation { op, left, right }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.right {
            Some(right) => write!(f, "{} {} {}", self.left, self.op, right),
            None => write!(f, "{}{}", self.op, self.left),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultType {
    Fixed(Type),
    Left,
    Right,
}

pub struct OperationHandler {
    result: ResultType,
    lower: Box<Lowering>,
}

impl OperationHandler {
    pub fn new(
        result: ResultType,
        lower: impl Fn(&mut Generator<'_>, &Type, &Expr, Option<&Expr>) -> Result<Vec<Ir>, CompilerError>
            + 'static,
    ) -> Self {
        OperationHandler {
            result,
            lower: Box::new(lower),
        }
    }

    pub fn result(&self) -> &ResultType {
        &self.result
    }

    pub fn lower(
        &self,
        generator: &mut Generator<'_>,
        result: &Type,
        left: &Expr,
        right: Option<&Expr>,
    ) -> Result<Vec<Ir>, CompilerError> {
        (self.lower)(generator, result, left, right)
    }
}

impl fmt::Debug for OperationHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("OperationHandler")
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// Outcome of a lookup: the key that matched and the concrete result type
#[derive(Debug)]
pub struct Resolved<'r> {
    pub key: Operation,
    pub handler: &'r OperationHandler,
    pub result: Type,
}

#[derive(Debug)]
pub struct OperationRegistry {
    handlers: IndexMap<Operation, OperationHandler>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        let mut registry = OperationRegistry {
            handlers: IndexMap::new(),
        };
        for ty in [Type::Float, Type::Int] {
            registry.register_number(ty);
        }
        registry.register_bool();
        registry.register_vector();
        for ty in [
            Type::String,
            Type::Entity,
            Type::field(Type::Void),
            Type::function(Type::Void, Vec::new()),
        ] {
            registry.register_reference_type(ty);
        }
        registry.register(
            "=",
            Type::Struct(Vec::new()),
            Some(Type::Struct(Vec::new())),
            ResultType::Left,
            assign(None),
        );
        registry.register_universal();
        log::debug!("REGISTRY built with {} handlers", registry.len());
        registry
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn get(&self, key: &Operation) -> Option<&OperationHandler> {
        self.handlers.get(key)
    }

    pub fn resolve(
        &self,
        op: &'static str,
        left: &Type,
        right: Option<&Type>,
    ) -> Result<Resolved<'_>, CompilerError> {
        if let Some(found) = self.lookup(op, left, right, left, right) {
            return Ok(found);
        }

        if let Some(right) = right {
            if let Some((l, r)) = coerce(left, right) {
                log::debug!("COERCE {} {} {} -> {} {} {}", left, op, right, l, op, r);
                if let Some(found) = self.lookup(op, &l, Some(&r), &l, Some(&r)) {
                    return Ok(found);
                }
            }
        }

        let void = Type::Void;
        let void_right = right.map(|_| &void);
        if let Some(found) = self.lookup(op, &void, void_right, left, right) {
            return Ok(found);
        }

        Err(CompilerError::unsupported_operation(
            op,
            left,
            right.map(|r| r as &dyn fmt::Display),
        ))
    }

    fn lookup(
        &self,
        op: &'static str,
        key_left: &Type,
        key_right: Option<&Type>,
        left: &Type,
        right: Option<&Type>,
    ) -> Option<Resolved<'_>> {
        let exact = Operation::new(op, key_left.clone(), key_right.cloned());
        let family = Operation::new(op, key_left.family(), key_right.map(Type::family));
        let (key, handler) = match self.handlers.get_key_value(&exact) {
            Some(found) => found,
            None => self.handlers.get_key_value(&family)?,
        };
        let result = match &handler.result {
            ResultType::Fixed(ty) => ty.clone(),
            ResultType::Left => left.clone(),
            ResultType::Right => right.cloned().unwrap_or(Type::Void),
        };
        Some(Resolved {
            key: key.clone(),
            handler,
            result,
        })
    }

    fn register(
        &mut self,
        op: &'static str,
        left: Type,
        right: Option<Type>,
        result: ResultType,
        lower: impl Fn(&mut Generator<'_>, &Type, &Expr, Option<&Expr>) -> Result<Vec<Ir>, CompilerError>
            + 'static,
    ) {
        let key = Operation::new(op, left, right);
        let previous = self
            .handlers
            .insert(key.clone(), OperationHandler::new(result, lower));
        debug_assert!(previous.is_none(), "duplicate handler for {}", key);
    }

    fn register_number(&mut self, ty: Type) {
        let zero = zero_of(&ty);
        let one = one_of(&ty);
        let minus_one = one.neg().unwrap_or(Value::Int(-1));
        let some = Some(ty.clone());

        self.register("=", ty.clone(), some.clone(), ResultType::Left, assign(None));
        for (op, instr) in [
            ("+", BinaryInstr::AddFloat),
            ("-", BinaryInstr::SubFloat),
            ("*", BinaryInstr::MulFloat),
            ("/", BinaryInstr::DivFloat),
            ("&", BinaryInstr::BitAnd),
            ("|", BinaryInstr::BitOr),
        ] {
            self.register(op, ty.clone(), some.clone(), ResultType::Left, binary(instr));
        }
        self.register_comparisons(ty.clone(), ty.clone());
        self.register(
            "%",
            ty.clone(),
            some.clone(),
            ResultType::Left,
            call_builtin(BUILTIN_MOD),
        );
        self.register(
            "^",
            ty.clone(),
            some.clone(),
            ResultType::Left,
            call_builtin(BUILTIN_XOR),
        );
        for op in [
            BinaryOp::AddAssign,
            BinaryOp::SubtractAssign,
            BinaryOp::MultiplyAssign,
            BinaryOp::DivideAssign,
            BinaryOp::ModuloAssign,
            BinaryOp::BitAndAssign,
            BinaryOp::BitOrAssign,
            BinaryOp::ExclusiveOrAssign,
        ] {
            self.register(
                op.symbol(),
                ty.clone(),
                some.clone(),
                ResultType::Left,
                assign(op.compound_base()),
            );
        }
        self.register(
            "*",
            ty.clone(),
            Some(Type::Vector),
            ResultType::Fixed(Type::Vector),
            binary(BinaryInstr::MulFloatVec),
        );

        self.register("+", ty.clone(), None, ResultType::Left, |g, _, operand, _| {
            g.generate(operand)
        });
        let negate_zero = zero.clone();
        self.register("-", ty.clone(), None, ResultType::Left, move |g, _, operand, _| {
            g.generate(&Expr::binary(
                BinaryOp::Subtract,
                Expr::Constant(negate_zero.clone()),
                operand.clone(),
            ))
        });
        self.register(
            "!",
            ty.clone(),
            None,
            ResultType::Fixed(Type::Bool),
            move |g, _, operand, _| {
                g.generate(&Expr::binary(
                    BinaryOp::Eq,
                    Expr::Constant(zero.clone()),
                    operand.clone(),
                ))
            },
        );
        self.register("~", ty.clone(), None, ResultType::Left, move |g, _, operand, _| {
            g.generate(&Expr::binary(
                BinaryOp::Subtract,
                Expr::Constant(minus_one.clone()),
                operand.clone(),
            ))
        });

        for (op, compound, post) in [
            ("++", BinaryOp::AddAssign, false),
            ("--", BinaryOp::SubtractAssign, false),
            ("post++", BinaryOp::AddAssign, true),
            ("post--", BinaryOp::SubtractAssign, true),
        ] {
            self.register(
                op,
                ty.clone(),
                None,
                ResultType::Left,
                step(compound, one.clone(), post),
            );
        }
    }

    fn register_bool(&mut self) {
        let ty = Type::Bool;
        self.register("=", ty.clone(), Some(ty.clone()), ResultType::Left, assign(None));
        self.register_comparisons(ty.clone(), ty.clone());
        self.register("!", ty.clone(), None, ResultType::Fixed(Type::Bool), |g, _, operand, _| {
            g.generate(&Expr::binary(BinaryOp::Eq, Expr::int(0), operand.clone()))
        });
    }

    fn register_comparisons(&mut self, left: Type, right: Type) {
        let bool_result = ResultType::Fixed(Type::Bool);
        for (op, instr) in [
            ("==", BinaryInstr::Eq(left.clone())),
            ("!=", BinaryInstr::Ne(left.clone())),
            ("<", BinaryInstr::Lt),
            (">", BinaryInstr::Gt),
            ("<=", BinaryInstr::Le),
            (">=", BinaryInstr::Ge),
        ] {
            self.register(
                op,
                left.clone(),
                Some(right.clone()),
                bool_result.clone(),
                binary(instr),
            );
        }
    }

    fn register_vector(&mut self) {
        let v = Type::Vector;
        let vector_result = ResultType::Fixed(Type::Vector);
        self.register("=", v.clone(), Some(v.clone()), ResultType::Left, assign(None));
        self.register("+", v.clone(), Some(v.clone()), ResultType::Left, binary(BinaryInstr::AddVec));
        self.register("-", v.clone(), Some(v.clone()), ResultType::Left, binary(BinaryInstr::SubVec));
        self.register(
            "*",
            v.clone(),
            Some(v.clone()),
            ResultType::Fixed(Type::Float),
            binary(BinaryInstr::MulVec),
        );
        for scalar in [Type::Float, Type::Int] {
            self.register(
                "*",
                v.clone(),
                Some(scalar.clone()),
                vector_result.clone(),
                binary(BinaryInstr::MulVecFloat),
            );
            self.register(
                "/",
                v.clone(),
                Some(scalar.clone()),
                vector_result.clone(),
                |g, _, left, right| {
                    let right = operand(right)?;
                    let reciprocal =
                        Expr::binary(BinaryOp::Divide, Expr::float(1.0), right.clone());
                    g.generate(&Expr::binary(BinaryOp::Multiply, left.clone(), reciprocal))
                },
            );
            self.register(
                "*=",
                v.clone(),
                Some(scalar),
                ResultType::Left,
                assign(Some(BinaryOp::Multiply)),
            );
        }
        self.register("+=", v.clone(), Some(v.clone()), ResultType::Left, assign(Some(BinaryOp::Add)));
        self.register(
            "-=",
            v.clone(),
            Some(v.clone()),
            ResultType::Left,
            assign(Some(BinaryOp::Subtract)),
        );
        self.register(
            "==",
            v.clone(),
            Some(v.clone()),
            ResultType::Fixed(Type::Bool),
            binary(BinaryInstr::Eq(Type::Vector)),
        );
        self.register(
            "!=",
            v.clone(),
            Some(v.clone()),
            ResultType::Fixed(Type::Bool),
            binary(BinaryInstr::Ne(Type::Vector)),
        );
        self.register("!", v.clone(), None, ResultType::Fixed(Type::Bool), not(Type::Vector));
        self.register("-", v.clone(), None, ResultType::Left, |g, _, operand, _| {
            g.generate(&Expr::binary(
                BinaryOp::Subtract,
                Expr::Constant(Value::Vector([0.0; 3])),
                operand.clone(),
            ))
        });
    }

    /// Types that only support assignment, (in)equality and logical not
    fn register_reference_type(&mut self, ty: Type) {
        let some = Some(ty.clone());
        let bool_result = ResultType::Fixed(Type::Bool);
        self.register("=", ty.clone(), some.clone(), ResultType::Left, assign(None));
        self.register(
            "==",
            ty.clone(),
            some.clone(),
            bool_result.clone(),
            binary(BinaryInstr::Eq(ty.clone())),
        );
        self.register(
            "!=",
            ty.clone(),
            some,
            bool_result.clone(),
            binary(BinaryInstr::Ne(ty.clone())),
        );
        self.register("!", ty.clone(), None, bool_result, not(ty));
    }

    fn register_universal(&mut self) {
        let void = Type::Void;
        self.register(",", void.clone(), Some(void.clone()), ResultType::Right, |g, _, left, right| {
            let right = operand(right)?;
            let mut ir = g.generate(left)?;
            ir.extend(g.generate(right)?);
            Ok(ir)
        });
        self.register(
            "&&",
            void.clone(),
            Some(void.clone()),
            ResultType::Fixed(Type::Bool),
            logical(true),
        );
        self.register(
            "||",
            void.clone(),
            Some(void),
            ResultType::Fixed(Type::Bool),
            logical(false),
        );
    }
}

fn coerce(left: &Type, right: &Type) -> Option<(Type, Type)> {
    match (left, right) {
        (Type::Float, Type::Int | Type::Bool) => Some((Type::Float, Type::Float)),
        (Type::Int, Type::Bool) => Some((Type::Int, Type::Int)),
        (Type::Int, Type::Float) => Some((Type::Float, Type::Float)),
        (Type::Bool, Type::Int | Type::Float) => Some((right.clone(), right.clone())),
        _ => None,
    }
}

fn zero_of(ty: &Type) -> Value {
    match ty {
        Type::Float => Value::Float(0.0),
        _ => Value::Int(0),
    }
}

fn one_of(ty: &Type) -> Value {
    match ty {
        Type::Float => Value::Float(1.0),
        _ => Value::Int(1),
    }
}

fn operand(right: Option<&Expr>) -> Result<&Expr, CompilerError> {
    right.ok_or_else(|| CompilerError::UnsupportedConstruct("missing right operand".to_string()))
}

/// Evaluate both operands, then one three-operand instruction into a temporary
pub(crate) fn lower_binary(
    g: &mut Generator<'_>,
    result: &Type,
    instr: &BinaryInstr,
    left: &Expr,
    right: &Expr,
) -> Result<Vec<Ir>, CompilerError> {
    let mut ir = g.generate(left)?;
    let l = result_of(&ir);
    let right_ir = g.generate(right)?;
    let r = result_of(&right_ir);
    ir.extend(right_ir);
    let out = g.allocate_temp(result);
    ir.push(Ir::new(
        Instruction::Binary {
            op: instr.clone(),
            left: l,
            right: r,
            out,
        },
        out,
        format!("{} {} {}", l, instr, r),
    ));
    Ok(ir)
}

fn binary(
    instr: BinaryInstr,
) -> impl Fn(&mut Generator<'_>, &Type, &Expr, Option<&Expr>) -> Result<Vec<Ir>, CompilerError> {
    move |g, result, left, right| lower_binary(g, result, &instr, left, operand(right)?)
}

fn not(ty: Type) -> impl Fn(&mut Generator<'_>, &Type, &Expr, Option<&Expr>) -> Result<Vec<Ir>, CompilerError> {
    move |g, result, operand, _| {
        let mut ir = g.generate(operand)?;
        let value = result_of(&ir);
        let out = g.allocate_temp(result);
        ir.push(Ir::new(
            Instruction::Not {
                ty: ty.clone(),
                operand: value,
                out,
            },
            out,
            format!("!{}", value),
        ));
        Ok(ir)
    }
}

fn assign(
    compound: Option<BinaryOp>,
) -> impl Fn(&mut Generator<'_>, &Type, &Expr, Option<&Expr>) -> Result<Vec<Ir>, CompilerError> {
    move |g, _, left, right| g.generate_assignment(compound, left, operand(right)?)
}

/// `%` and `^` have no VM instruction and become calls to a builtin
fn call_builtin(
    name: &'static str,
) -> impl Fn(&mut Generator<'_>, &Type, &Expr, Option<&Expr>) -> Result<Vec<Ir>, CompilerError> {
    move |g, _, left, right| {
        let right = operand(right)?;
        g.generate(&Expr::call(name, vec![left.clone(), right.clone()]))
    }
}

/// Increment/decrement as a compound store. Postfix forms subtract the step
/// again from the stored value to yield the value before the store.
fn step(
    compound: BinaryOp,
    one: Value,
    post: bool,
) -> impl Fn(&mut Generator<'_>, &Type, &Expr, Option<&Expr>) -> Result<Vec<Ir>, CompilerError> {
    move |g, result, target, _| {
        let mut ir = g.generate_assignment(Some(compound), target, &Expr::Constant(one.clone()))?;
        if post {
            let stored = Expr::Memory {
                reference: result_of(&ir),
                ty: result.clone(),
            };
            let inverse = match compound {
                BinaryOp::AddAssign => BinaryOp::Subtract,
                _ => BinaryOp::Add,
            };
            ir.extend(g.generate(&Expr::binary(
                inverse,
                stored,
                Expr::Constant(one.clone()),
            ))?);
        }
        Ok(ir)
    }
}

/// Short-circuit `&&`/`||` lowered through conditional expressions. Operands
/// without side effects use the VM's AND/OR directly.
fn logical(
    and: bool,
) -> impl Fn(&mut Generator<'_>, &Type, &Expr, Option<&Expr>) -> Result<Vec<Ir>, CompilerError> {
    move |g, result, left, right| {
        let right = operand(right)?;
        if left.is_pure() && right.is_pure() {
            let instr = if and { BinaryInstr::And } else { BinaryInstr::Or };
            return lower_binary(g, result, &instr, left, right);
        }
        let normalized = Expr::ternary(right.clone(), Expr::int(1), Expr::int(0));
        let tree = if and {
            Expr::ternary(left.clone(), normalized, Expr::int(0))
        } else {
            Expr::ternary(left.clone(), Expr::int(1), normalized)
        };
        g.generate(&tree)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
