//! Runtime errors of the reference interpreter

use crate::value::ScriptValue;
use hostlink_parser::ParseError;
use std::fmt;

#[derive(Debug, Clone)]
pub enum ScriptError {
    /// Source text did not parse
    Syntax(ParseError),

    /// Value raised by a `throw` statement and not caught
    Thrown(ScriptValue),

    /// Operation applied to a value of the wrong type
    TypeError {
        operation: String,
        expected: String,
        got: String,
    },

    /// Reference to a name that was never declared
    UndefinedVariable(String),

    /// Assignment to a `let` binding
    ImmutableBinding(String),

    /// Nested calls exceeded the configured maximum depth
    CallDepthExceeded(usize),

    /// A native hook reported a failure
    Native { hook: String, message: String },

    /// Runtime error with message
    Runtime(String),
}

impl ScriptError {
    pub fn type_error(operation: &str, expected: &str, got: &ScriptValue) -> Self {
        ScriptError::TypeError {
            operation: operation.to_string(),
            expected: expected.to_string(),
            got: got.type_name().to_string(),
        }
    }

    /// Value bound by a `catch` clause: the thrown value, or the message
    /// of an internal error.
    pub fn into_caught_value(self) -> ScriptValue {
        match self {
            ScriptError::Thrown(value) => value,
            other => ScriptValue::String(other.to_string()),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Syntax(err) => write!(f, "Syntax error: {}", err),
            ScriptError::Thrown(value) => write!(f, "Uncaught exception: {}", value),
            ScriptError::TypeError {
                operation,
                expected,
                got,
            } => write!(
                f,
                "Type error in {}: expected {}, got {}",
                operation, expected, got
            ),
            ScriptError::UndefinedVariable(name) => write!(f, "Undefined variable '{}'", name),
            ScriptError::ImmutableBinding(name) => {
                write!(f, "Cannot assign to immutable binding '{}'", name)
            }
            ScriptError::CallDepthExceeded(depth) => {
                write!(f, "Maximum call depth of {} exceeded", depth)
            }
            ScriptError::Native { hook, message } => write!(f, "{} failed: {}", hook, message),
            ScriptError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<ParseError> for ScriptError {
    fn from(err: ParseError) -> Self {
        ScriptError::Syntax(err)
    }
}
