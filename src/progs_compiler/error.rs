// Compiler Error Handling

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CompilerError {
    // Operator resolution errors
    UnsupportedOperation {
        op: String,
        left: String,
        right: Option<String>,
    },

    // Symbol errors
    UndefinedSymbol(String),

    // Generation errors
    UnsupportedConstruct(String),
    ValueError(String),

    // Emission errors
    MalformedJump { label: String, statement: usize },
    ImageFormat(String),

    // Configuration and IO errors
    ConfigError(String),
    IOError(String),
}

impl CompilerError {
    pub(crate) fn unsupported_operation(
        op: &str,
        left: &dyn fmt::Display,
        right: Option<&dyn fmt::Display>,
    ) -> Self {
        CompilerError::UnsupportedOperation {
            op: op.to_string(),
            left: left.to_string(),
            right: right.map(|r| r.to_string()),
        }
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::UnsupportedOperation { op, left, right } => match right {
                Some(right) => write!(
                    f,
                    "Unsupported operation '{}' between {} and {}",
                    op, left, right
                ),
                None => write!(f, "Unsupported operation '{}' on {}", op, left),
            },
            CompilerError::UndefinedSymbol(symbol) => {
                write!(f, "Undefined symbol '{}'", symbol)
            }
            CompilerError::UnsupportedConstruct(shape) => {
                write!(f, "Unsupported construct: {}", shape)
            }
            CompilerError::ValueError(msg) => {
                write!(f, "Constant evaluation error: {}", msg)
            }
            CompilerError::MalformedJump { label, statement } => {
                write!(
                    f,
                    "Malformed jump to '{}' from statement {} (internal emitter error)",
                    label, statement
                )
            }
            CompilerError::ImageFormat(msg) => {
                write!(f, "Invalid progs image: {}", msg)
            }
            CompilerError::ConfigError(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            CompilerError::IOError(msg) => {
                write!(f, "IO error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CompilerError {}
