// Constant values
//
// Tagged constants with compile-time arithmetic used by the reduce pass.
// Arithmetic is defined for (float, float), (float, int) and (int, int);
// an int on the left of a float is rejected and left for the registry to
// coerce at generation time.

use super::error::CompilerError;
use super::types::Type;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Float(f32),
    String(String),
    Vector([f32; 3]),
    /// Raw integer index: string offset or function number
    Pointer(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

impl Arith {
    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Subtract => "-",
            Arith::Multiply => "*",
            Arith::Divide => "/",
            Arith::Remainder => "%",
        }
    }
}

impl Value {
    pub fn type_of(&self) -> Type {
        match self {
            Value::Int(_) | Value::Pointer(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::String(_) => Type::String,
            Value::Vector(_) => Type::Vector,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Vector(_) => "vector",
            Value::Pointer(_) => "pointer",
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, CompilerError> {
        self.arithmetic(Arith::Add, other)
    }

    pub fn sub(&self, other: &Value) -> Result<Value, CompilerError> {
        self.arithmetic(Arith::Subtract, other)
    }

    pub fn mul(&self, other: &Value) -> Result<Value, CompilerError> {
        self.arithmetic(Arith::Multiply, other)
    }

    pub fn div(&self, other: &Value) -> Result<Value, CompilerError> {
        self.arithmetic(Arith::Divide, other)
    }

    pub fn rem(&self, other: &Value) -> Result<Value, CompilerError> {
        self.arithmetic(Arith::Remainder, other)
    }

    pub fn neg(&self) -> Result<Value, CompilerError> {
        match self {
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::Float(v) => Ok(Value::Float(-v)),
            Value::Vector([x, y, z]) => Ok(Value::Vector([-x, -y, -z])),
            other => Err(CompilerError::ValueError(format!(
                "cannot negate {} constant",
                other.tag()
            ))),
        }
    }

    /// Fold a cast of a constant. Only identity and widening conversions fold; the
    /// runtime cast relabels its operand, so narrowing is left to it
    pub fn cast(&self, ty: &Type) -> Result<Value, CompilerError> {
        match (self, ty) {
            (Value::Int(i), Type::Float) => Ok(Value::Float(*i as f32)),
            (Value::Int(_), Type::Int | Type::Bool) | (Value::Float(_), Type::Float) => {
                Ok(self.clone())
            }
            _ => Err(CompilerError::ValueError(format!(
                "cannot cast {} constant to {}",
                self.tag(),
                ty
            ))),
        }
    }

    fn arithmetic(&self, op: Arith, other: &Value) -> Result<Value, CompilerError> {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(op, *a, *b))),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(op, *a, *b as f32))),
            (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b).map(Value::Int),
            _ => Err(CompilerError::ValueError(format!(
                "'{}' is not defined for {} and {} constants",
                op.symbol(),
                self.tag(),
                other.tag()
            ))),
        }
    }
}

fn float_op(op: Arith, a: f32, b: f32) -> f32 {
    match op {
        Arith::Add => a + b,
        Arith::Subtract => a - b,
        Arith::Multiply => a * b,
        Arith::Divide => a / b,
        Arith::Remainder => a % b,
    }
}

fn int_op(op: Arith, a: i32, b: i32) -> Result<i32, CompilerError> {
    match op {
        Arith::Add => Ok(a.wrapping_add(b)),
        Arith::Subtract => Ok(a.wrapping_sub(b)),
        Arith::Multiply => Ok(a.wrapping_mul(b)),
        Arith::Divide | Arith::Remainder if b == 0 => Err(CompilerError::ValueError(
            format!("integer division by zero in {} {} {}", a, op.symbol(), b),
        )),
        Arith::Divide => Ok(a.wrapping_div(b)),
        Arith::Remainder => Ok(a.wrapping_rem(b)),
    }
}

// Equality and hashing go through bit patterns so float constants can key
// the constant pool.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => {
                a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(i) | Value::Pointer(i) => i.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Vector(v) => {
                for component in v {
                    component.to_bits().hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Vector([x, y, z]) => write!(f, "'{} {} {}'", x, y, z),
            Value::Pointer(p) => write!(f, "&{}", p),
        }
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
