// Type descriptors for the progs compiler
//
// Types are plain values compared structurally. Composite types own their
// component types, so `field<float>` built twice compares equal.

use indexmap::IndexMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int,
    Float,
    Vector,
    String,
    Entity,
    Field(Box<Type>),
    Function {
        ret: Box<Type>,
        args: Vec<Type>,
        vararg: Option<Box<Type>>,
    },
    Struct(Vec<(String, Type)>),
    Array(Box<Type>, usize),
}

impl Type {
    pub fn field(inner: Type) -> Type {
        Type::Field(Box::new(inner))
    }

    pub fn function(ret: Type, args: Vec<Type>) -> Type {
        Type::Function {
            ret: Box::new(ret),
            args,
            vararg: None,
        }
    }

    pub fn array(element: Type, length: usize) -> Type {
        Type::Array(Box::new(element), length)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Bool | Type::Int | Type::Float)
    }

    /// Number of 32-bit global slots a value of this type occupies.
    pub fn size_of(&self) -> usize {
        match self {
            Type::Vector => 3,
            Type::Struct(fields) => fields.iter().map(|(_, ty)| ty.size_of()).sum(),
            Type::Array(element, length) => element.size_of() * length,
            _ => 1,
        }
    }

    /// Representative of the type family used for registry lookups, so a
    /// single handler covers every `field<T>` or every function signature.
    pub fn family(&self) -> Type {
        match self {
            Type::Field(_) => Type::field(Type::Void),
            Type::Function { .. } => Type::function(Type::Void, Vec::new()),
            Type::Struct(_) => Type::Struct(Vec::new()),
            Type::Array(_, _) => Type::array(Type::Void, 0),
            other => other.clone(),
        }
    }

    /// Slot offset and type of a named member (vector components or struct fields).
    pub fn member(&self, name: &str) -> Option<(usize, Type)> {
        match self {
            Type::Vector => match name {
                "x" => Some((0, Type::Float)),
                "y" => Some((1, Type::Float)),
                "z" => Some((2, Type::Float)),
                _ => None,
            },
            Type::Struct(fields) => {
                let mut offset = 0;
                for (field_name, ty) in fields {
                    if field_name == name {
                        return Some((offset, ty.clone()));
                    }
                    offset += ty.size_of();
                }
                None
            }
            _ => None,
        }
    }

    /// Element type of an array, field or function return
    pub fn inner(&self) -> Option<&Type> {
        match self {
            Type::Field(inner) | Type::Array(inner, _) => Some(inner),
            Type::Function { ret, .. } => Some(ret),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Vector => write!(f, "vector"),
            Type::String => write!(f, "string"),
            Type::Entity => write!(f, "entity"),
            Type::Field(inner) => write!(f, "field<{}>", inner),
            Type::Function { ret, args, vararg } => {
                write!(f, "function({}", ret)?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                if let Some(vararg) = vararg {
                    write!(f, ", {}...", vararg)?;
                }
                write!(f, ")")
            }
            Type::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            Type::Array(element, length) => write!(f, "array<{}, {}>", element, length),
        }
    }
}

/// Type-name lookup handed to the parser, pre-populated with the builtin types.
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: IndexMap<String, Type>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut types = IndexMap::new();
        for (name, ty) in [
            ("void", Type::Void),
            ("float", Type::Float),
            ("vector", Type::Vector),
            ("string", Type::String),
            ("entity", Type::Entity),
            ("int", Type::Int),
            ("bool", Type::Bool),
        ] {
            types.insert(name.to_string(), ty);
        }
        TypeTable { types }
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    /// Register a named type (typedef or struct). Returns the previous binding.
    pub fn define(&mut self, name: &str, ty: Type) -> Option<Type> {
        let previous = self.types.insert(name.to_string(), ty);
        if previous.is_some() {
            log::warn!("redefining type '{}'", name);
        }
        previous
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
