// Abstract instruction set
//
// Machine-independent instructions produced by the generator. Operands are
// logical references; typed variants (store, load, equality) carry the static
// type so the emitter can pick the concrete opcode.

use super::types::Type;
use std::fmt;

/// Storage location before final offset resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ref {
    Null,
    /// Frame-relative slot, only meaningful inside a function body
    Local(i32),
    /// Absolute index into the global data segment
    Global(i32),
}

/// Number of global slots reserved per parameter and for the return value
pub const PARAM_SLOT_SIZE: i32 = 3;
pub const MAX_PARAMS: usize = 8;
const OFS_RETURN: i32 = 1;
const OFS_PARM0: i32 = 4;

impl Ref {
    pub const RETURN: Ref = Ref::Global(OFS_RETURN);

    pub fn param(index: usize) -> Ref {
        Ref::Global(OFS_PARM0 + index as i32 * PARAM_SLOT_SIZE)
    }

    pub fn offset(self, by: i32) -> Ref {
        match self {
            Ref::Null => Ref::Null,
            Ref::Local(i) => Ref::Local(i + by),
            Ref::Global(i) => Ref::Global(i + by),
        }
    }

    pub fn is_local(self) -> bool {
        matches!(self, Ref::Local(_))
    }

    /// Absolute global index once the local region's base is known
    pub fn to_global(self, local_ofs: i32) -> i32 {
        match self {
            Ref::Null => 0,
            Ref::Local(i) => local_ofs + i,
            Ref::Global(i) => i,
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Ref::Null => write!(f, "$null"),
            Ref::Local(i) => write!(f, "$L{}", i),
            Ref::Global(i) => write!(f, "${}", i),
        }
    }
}

/// Jump destination. `Break`/`Continue` are placeholders rewritten by the
/// enclosing loop (or switch) before emission.
#[derive(Debug, Clone, PartialEq)]
pub enum Jump {
    Label(String),
    Relative(i32),
    Break,
    Continue,
}

impl fmt::Display for Jump {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Jump::Label(id) => write!(f, "@{}", id),
            Jump::Relative(offset) => write!(f, "{:+}", offset),
            Jump::Break => write!(f, "<break>"),
            Jump::Continue => write!(f, "<continue>"),
        }
    }
}

/// Three-operand operations writing to an output slot.
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryInstr {
    MulFloat,
    MulVec,
    MulFloatVec,
    MulVecFloat,
    DivFloat,
    AddFloat,
    AddVec,
    SubFloat,
    SubVec,
    Eq(Type),
    Ne(Type),
    Le,
    Ge,
    Lt,
    Gt,
    And,
    Or,
    BitAnd,
    BitOr,
}

impl fmt::Display for BinaryInstr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BinaryInstr::MulFloat => write!(f, "MUL_FLOAT"),
            BinaryInstr::MulVec => write!(f, "MUL_VEC"),
            BinaryInstr::MulFloatVec => write!(f, "MUL_FLOAT_VEC"),
            BinaryInstr::MulVecFloat => write!(f, "MUL_VEC_FLOAT"),
            BinaryInstr::DivFloat => write!(f, "DIV_FLOAT"),
            BinaryInstr::AddFloat => write!(f, "ADD_FLOAT"),
            BinaryInstr::AddVec => write!(f, "ADD_VEC"),
            BinaryInstr::SubFloat => write!(f, "SUB_FLOAT"),
            BinaryInstr::SubVec => write!(f, "SUB_VEC"),
            BinaryInstr::Eq(ty) => write!(f, "EQ<{}>", ty),
            BinaryInstr::Ne(ty) => write!(f, "NE<{}>", ty),
            BinaryInstr::Le => write!(f, "LE"),
            BinaryInstr::Ge => write!(f, "GE"),
            BinaryInstr::Lt => write!(f, "LT"),
            BinaryInstr::Gt => write!(f, "GT"),
            BinaryInstr::And => write!(f, "AND"),
            BinaryInstr::Or => write!(f, "OR"),
            BinaryInstr::BitAnd => write!(f, "BITAND"),
            BinaryInstr::BitOr => write!(f, "BITOR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Binary {
        op: BinaryInstr,
        left: Ref,
        right: Ref,
        out: Ref,
    },
    Not {
        ty: Type,
        operand: Ref,
        out: Ref,
    },
    /// Read `entity.field` into `out`
    Load {
        ty: Type,
        entity: Ref,
        field: Ref,
        out: Ref,
    },
    /// Pointer to `entity.field`
    Address {
        entity: Ref,
        field: Ref,
        out: Ref,
    },
    Store {
        ty: Type,
        value: Ref,
        target: Ref,
    },
    StoreP {
        ty: Type,
        value: Ref,
        pointer: Ref,
    },
    /// Arguments are copied into parameter slots by the emitter
    Call {
        function: Ref,
        args: Vec<(Ref, Type)>,
    },
    Return {
        value: Ref,
    },
    Label(String),
    Goto(Jump),
    If {
        condition: Ref,
        expect: bool,
        target: Jump,
    },
    Done,
}

impl Instruction {
    /// Number of VM statements this instruction becomes
    pub fn statement_count(&self) -> usize {
        match self {
            Instruction::Label(_) => 0,
            Instruction::Call { args, .. } => args.len().min(MAX_PARAMS) + 1,
            _ => 1,
        }
    }

    pub fn jump_target(&self) -> Option<&Jump> {
        match self {
            Instruction::Goto(target) | Instruction::If { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn jump_target_mut(&mut self) -> Option<&mut Jump> {
        match self {
            Instruction::Goto(target) | Instruction::If { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Binary {
                op,
                left,
                right,
                out,
            } => write!(f, "{} {}, {} -> {}", op, left, right, out),
            Instruction::Not { ty, operand, out } => {
                write!(f, "NOT<{}> {} -> {}", ty, operand, out)
            }
            Instruction::Load {
                ty,
                entity,
                field,
                out,
            } => write!(f, "LOAD<{}> {}.{} -> {}", ty, entity, field, out),
            Instruction::Address { entity, field, out } => {
                write!(f, "ADDRESS {}.{} -> {}", entity, field, out)
            }
            Instruction::Store { ty, value, target } => {
                write!(f, "STORE<{}> {} -> {}", ty, value, target)
            }
            Instruction::StoreP { ty, value, pointer } => {
                write!(f, "STOREP<{}> {} -> *{}", ty, value, pointer)
            }
            Instruction::Call { function, args } => {
                write!(f, "CALL{} {}(", args.len().min(MAX_PARAMS), function)?;
                for (i, (arg, _)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Instruction::Return { value } => write!(f, "RETURN {}", value),
            Instruction::Label(id) => write!(f, "{}:", id),
            Instruction::Goto(target) => write!(f, "GOTO {}", target),
            Instruction::If {
                condition,
                expect,
                target,
            } => {
                let name = if *expect { "IF" } else { "IFNOT" };
                write!(f, "{} {}, {}", name, condition, target)
            }
            Instruction::Done => write!(f, "DONE"),
        }
    }
}
