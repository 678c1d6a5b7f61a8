// Expression tree consumed by the generator
//
// The parser hands over a forest of these. Every node owns its children, and
// `map_children` rebuilds a node from its own shape so tree rewrites (the
// reduce pass) never need a loosely typed child list.

use super::instruction::Ref;
use super::types::Type;
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Comma,
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    ExclusiveOr,
    ShiftLeft,
    ShiftRight,
    And,
    Or,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
    BitAndAssign,
    BitOrAssign,
    ExclusiveOrAssign,
    ShiftLeftAssign,
    ShiftRightAssign,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Comma => ",",
            BinaryOp::Assign => "=",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::ExclusiveOr => "^",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
            BinaryOp::AddAssign => "+=",
            BinaryOp::SubtractAssign => "-=",
            BinaryOp::MultiplyAssign => "*=",
            BinaryOp::DivideAssign => "/=",
            BinaryOp::ModuloAssign => "%=",
            BinaryOp::BitAndAssign => "&=",
            BinaryOp::BitOrAssign => "|=",
            BinaryOp::ExclusiveOrAssign => "^=",
            BinaryOp::ShiftLeftAssign => "<<=",
            BinaryOp::ShiftRightAssign => ">>=",
        }
    }

    /// Operator applied before the store of a compound assignment
    pub fn compound_base(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::AddAssign => Some(BinaryOp::Add),
            BinaryOp::SubtractAssign => Some(BinaryOp::Subtract),
            BinaryOp::MultiplyAssign => Some(BinaryOp::Multiply),
            BinaryOp::DivideAssign => Some(BinaryOp::Divide),
            BinaryOp::ModuloAssign => Some(BinaryOp::Modulo),
            BinaryOp::BitAndAssign => Some(BinaryOp::BitAnd),
            BinaryOp::BitOrAssign => Some(BinaryOp::BitOr),
            BinaryOp::ExclusiveOrAssign => Some(BinaryOp::ExclusiveOr),
            BinaryOp::ShiftLeftAssign => Some(BinaryOp::ShiftLeft),
            BinaryOp::ShiftRightAssign => Some(BinaryOp::ShiftRight),
            _ => None,
        }
    }

    pub fn is_assignment(self) -> bool {
        self == BinaryOp::Assign || self.compound_base().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitNot,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
    Address,
    Dereference,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::PreIncrement => "++",
            UnaryOp::PreDecrement => "--",
            UnaryOp::PostIncrement => "post++",
            UnaryOp::PostDecrement => "post--",
            UnaryOp::Address => "&",
            UnaryOp::Dereference => "*",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    /// Always a `Type::Function`
    pub signature: Type,
    pub params: Vec<Param>,
    pub vararg: Option<Param>,
    /// `None` for prototypes and builtins
    pub body: Option<Vec<Expr>>,
    /// Engine builtin number (`= #n`)
    pub builtin: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopExpr {
    pub predicate: Expr,
    pub body: Expr,
    pub check_before: bool,
    pub initializer: Vec<Expr>,
    pub update: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nop,
    Block(Vec<Expr>),
    Constant(Value),
    Reference(String),
    /// Already-evaluated value living at a known reference
    Memory {
        reference: Ref,
        ty: Type,
    },
    Declaration {
        name: String,
        ty: Type,
        value: Option<Value>,
    },
    Function(Box<FunctionDecl>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Cast {
        ty: Type,
        operand: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        pass: Box<Expr>,
        fail: Option<Box<Expr>>,
        /// Valued (`a ? b : c`) rather than a statement `if`
        expression: bool,
    },
    Loop(Box<LoopExpr>),
    Switch {
        test: Box<Expr>,
        body: Vec<Expr>,
    },
    /// `case v:` or `default:` marker inside a switch body
    Case(Option<Box<Expr>>),
    Break,
    Continue,
    Goto(String),
    Label(String),
    Return(Option<Box<Expr>>),
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        left: Box<Expr>,
        field: String,
    },
    Index {
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

// Builders used by the parser and tests
impl Expr {
    pub fn int(value: i32) -> Expr {
        Expr::Constant(Value::Int(value))
    }

    pub fn float(value: f32) -> Expr {
        Expr::Constant(Value::Float(value))
    }

    pub fn string(text: &str) -> Expr {
        Expr::Constant(Value::String(text.to_string()))
    }

    pub fn reference(name: &str) -> Expr {
        Expr::Reference(name.to_string())
    }

    pub fn declare(name: &str, ty: Type) -> Expr {
        Expr::Declaration {
            name: name.to_string(),
            ty,
            value: None,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn assign(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::Assign, left, right)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(function: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            function: Box::new(Expr::reference(function)),
            args,
        }
    }

    pub fn index(left: Expr, right: Expr) -> Expr {
        Expr::Index {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn member(left: Expr, field: &str) -> Expr {
        Expr::Member {
            left: Box::new(left),
            field: field.to_string(),
        }
    }

    pub fn if_else(test: Expr, pass: Expr, fail: Option<Expr>) -> Expr {
        Expr::Conditional {
            test: Box::new(test),
            pass: Box::new(pass),
            fail: fail.map(Box::new),
            expression: false,
        }
    }

    pub fn ternary(test: Expr, pass: Expr, fail: Expr) -> Expr {
        Expr::Conditional {
            test: Box::new(test),
            pass: Box::new(pass),
            fail: Some(Box::new(fail)),
            expression: true,
        }
    }

    pub fn while_loop(predicate: Expr, body: Expr) -> Expr {
        Expr::Loop(Box::new(LoopExpr {
            predicate,
            body,
            check_before: true,
            initializer: Vec::new(),
            update: Vec::new(),
        }))
    }

    pub fn do_while(body: Expr, predicate: Expr) -> Expr {
        Expr::Loop(Box::new(LoopExpr {
            predicate,
            body,
            check_before: false,
            initializer: Vec::new(),
            update: Vec::new(),
        }))
    }

    pub fn for_loop(initializer: Vec<Expr>, predicate: Expr, update: Vec<Expr>, body: Expr) -> Expr {
        Expr::Loop(Box::new(LoopExpr {
            predicate,
            body,
            check_before: true,
            initializer,
            update,
        }))
    }

    pub fn function(name: &str, ret: Type, params: Vec<Param>, body: Vec<Expr>) -> Expr {
        let signature = Type::function(ret, params.iter().map(|p| p.ty.clone()).collect());
        Expr::Function(Box::new(FunctionDecl {
            name: name.to_string(),
            signature,
            params,
            vararg: None,
            body: Some(body),
            builtin: None,
        }))
    }

    pub fn builtin(name: &str, signature: Type, number: i32) -> Expr {
        Expr::Function(Box::new(FunctionDecl {
            name: name.to_string(),
            signature,
            params: Vec::new(),
            vararg: None,
            body: None,
            builtin: Some(number),
        }))
    }

    pub fn ret(value: Option<Expr>) -> Expr {
        Expr::Return(value.map(Box::new))
    }
}

impl Param {
    pub fn new(name: &str, ty: Type) -> Self {
        Param {
            name: name.to_string(),
            ty,
        }
    }
}

impl Expr {
    /// Short description of the node used in diagnostics
    pub fn shape(&self) -> String {
        let kind = match self {
            Expr::Nop => "Nop",
            Expr::Block(_) => "Block",
            Expr::Constant(_) => "Constant",
            Expr::Reference(_) => "Reference",
            Expr::Memory { .. } => "Memory",
            Expr::Declaration { .. } => "Declaration",
            Expr::Function(_) => "Function",
            Expr::Binary { .. } => "Binary",
            Expr::Unary { .. } => "Unary",
            Expr::Cast { .. } => "Cast",
            Expr::Conditional { .. } => "Conditional",
            Expr::Loop(_) => "Loop",
            Expr::Switch { .. } => "Switch",
            Expr::Case(_) => "Case",
            Expr::Break => "Break",
            Expr::Continue => "Continue",
            Expr::Goto(_) => "Goto",
            Expr::Label(_) => "Label",
            Expr::Return(_) => "Return",
            Expr::Call { .. } => "Call",
            Expr::Member { .. } => "Member",
            Expr::Index { .. } => "Index",
        };
        match self {
            Expr::Binary { op, .. } => format!("{}({})", kind, op.symbol()),
            Expr::Unary { op, .. } => format!("{}({})", kind, op.symbol()),
            Expr::Reference(name) | Expr::Goto(name) | Expr::Label(name) => {
                format!("{}({})", kind, name)
            }
            _ => format!("{}[{} children]", kind, self.children().len()),
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Nop
            | Expr::Constant(_)
            | Expr::Reference(_)
            | Expr::Memory { .. }
            | Expr::Declaration { .. }
            | Expr::Break
            | Expr::Continue
            | Expr::Goto(_)
            | Expr::Label(_) => Vec::new(),
            Expr::Block(children) => children.iter().collect(),
            Expr::Function(function) => function
                .body
                .as_ref()
                .map(|body| body.iter().collect())
                .unwrap_or_default(),
            Expr::Binary { left, right, .. } | Expr::Index { left, right } => {
                vec![left.as_ref(), right.as_ref()]
            }
            Expr::Unary { operand, .. } | Expr::Cast { operand, .. } => vec![operand.as_ref()],
            Expr::Conditional {
                test, pass, fail, ..
            } => {
                let mut children = vec![test.as_ref(), pass.as_ref()];
                if let Some(fail) = fail {
                    children.push(fail.as_ref());
                }
                children
            }
            Expr::Loop(lp) => {
                let mut children: Vec<&Expr> = lp.initializer.iter().collect();
                children.push(&lp.predicate);
                children.push(&lp.body);
                children.extend(lp.update.iter());
                children
            }
            Expr::Switch { test, body } => {
                let mut children = vec![test.as_ref()];
                children.extend(body.iter());
                children
            }
            Expr::Case(value) | Expr::Return(value) => {
                value.iter().map(|v| v.as_ref()).collect()
            }
            Expr::Call { function, args } => {
                let mut children = vec![function.as_ref()];
                children.extend(args.iter());
                children
            }
            Expr::Member { left, .. } => vec![left.as_ref()],
        }
    }

    /// Rebuild this node with every direct child replaced by `f(child)`
    pub fn map_children(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        fn each(items: Vec<Expr>, f: &mut impl FnMut(Expr) -> Expr) -> Vec<Expr> {
            items.into_iter().map(|item| f(item)).collect()
        }
        fn boxed(item: Box<Expr>, f: &mut impl FnMut(Expr) -> Expr) -> Box<Expr> {
            Box::new(f(*item))
        }

        match self {
            Expr::Nop
            | Expr::Constant(_)
            | Expr::Reference(_)
            | Expr::Memory { .. }
            | Expr::Declaration { .. }
            | Expr::Break
            | Expr::Continue
            | Expr::Goto(_)
            | Expr::Label(_) => self,
            Expr::Block(children) => Expr::Block(each(children, f)),
            Expr::Function(mut function) => {
                function.body = function.body.map(|body| each(body, f));
                Expr::Function(function)
            }
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: boxed(left, f),
                right: boxed(right, f),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op,
                operand: boxed(operand, f),
            },
            Expr::Cast { ty, operand } => Expr::Cast {
                ty,
                operand: boxed(operand, f),
            },
            Expr::Conditional {
                test,
                pass,
                fail,
                expression,
            } => Expr::Conditional {
                test: boxed(test, f),
                pass: boxed(pass, f),
                fail: fail.map(|fail| boxed(fail, f)),
                expression,
            },
            Expr::Loop(lp) => {
                let LoopExpr {
                    predicate,
                    body,
                    check_before,
                    initializer,
                    update,
                } = *lp;
                let initializer = each(initializer, f);
                let predicate = f(predicate);
                let body = f(body);
                let update = each(update, f);
                Expr::Loop(Box::new(LoopExpr {
                    predicate,
                    body,
                    check_before,
                    initializer,
                    update,
                }))
            }
            Expr::Switch { test, body } => Expr::Switch {
                test: boxed(test, f),
                body: each(body, f),
            },
            Expr::Case(value) => Expr::Case(value.map(|v| boxed(v, f))),
            Expr::Return(value) => Expr::Return(value.map(|v| boxed(v, f))),
            Expr::Call { function, args } => Expr::Call {
                function: boxed(function, f),
                args: each(args, f),
            },
            Expr::Member { left, field } => Expr::Member {
                left: boxed(left, f),
                field,
            },
            Expr::Index { left, right } => Expr::Index {
                left: boxed(left, f),
                right: boxed(right, f),
            },
        }
    }

    /// True when evaluating the node cannot have side effects
    pub fn is_pure(&self) -> bool {
        match self {
            Expr::Constant(_) | Expr::Reference(_) | Expr::Memory { .. } => true,
            Expr::Cast { operand, .. } => operand.is_pure(),
            Expr::Member { left, .. } => left.is_pure(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "ast_tests.rs"]
mod tests;
