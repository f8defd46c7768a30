use crate::environment::Environment;
use crate::error::ScriptError;
use crate::evaluator::Evaluator;
use hostlink_parser::ast::AstNode;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Signature of functions implemented in Rust and callable from scripts.
pub type BuiltinFn = Rc<dyn Fn(&mut Evaluator, &[ScriptValue]) -> Result<ScriptValue, ScriptError>>;

/// User-defined lambda together with the scope it closes over.
pub struct Closure {
    pub params: Vec<String>,
    pub body: Rc<AstNode>,
    pub env: Rc<Environment>,
}

pub struct Builtin {
    pub name: String,
    pub func: BuiltinFn,
}

/// Runtime value of the reference interpreter.
///
/// Arrays and records have shared mutable ownership: `let b = a` aliases
/// the same storage, as in the scripts this engine runs.
#[derive(Clone, Default)]
pub enum ScriptValue {
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<ScriptValue>>>),
    Record(Rc<RefCell<BTreeMap<String, ScriptValue>>>),
    Function(Rc<Closure>),
    Builtin(Rc<Builtin>),
}

impl ScriptValue {
    pub fn array(items: Vec<ScriptValue>) -> Self {
        ScriptValue::Array(Rc::new(RefCell::new(items)))
    }

    pub fn record(fields: BTreeMap<String, ScriptValue>) -> Self {
        ScriptValue::Record(Rc::new(RefCell::new(fields)))
    }

    pub fn builtin(
        name: impl Into<String>,
        func: impl Fn(&mut Evaluator, &[ScriptValue]) -> Result<ScriptValue, ScriptError> + 'static,
    ) -> Self {
        ScriptValue::Builtin(Rc::new(Builtin {
            name: name.into(),
            func: Rc::new(func),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Null => "null",
            ScriptValue::Boolean(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Array(_) => "array",
            ScriptValue::Record(_) => "record",
            ScriptValue::Function(_) | ScriptValue::Builtin(_) => "function",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, ScriptValue::Function(_) | ScriptValue::Builtin(_))
    }

    /// `null`, `false`, `0`, `NaN` and `""` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            ScriptValue::Null => false,
            ScriptValue::Boolean(b) => *b,
            ScriptValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ScriptValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Structural equality; functions compare by identity.
    pub fn loosely_equals(&self, other: &ScriptValue) -> bool {
        match (self, other) {
            (ScriptValue::Null, ScriptValue::Null) => true,
            (ScriptValue::Boolean(a), ScriptValue::Boolean(b)) => a == b,
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            (ScriptValue::String(a), ScriptValue::String(b)) => a == b,
            (ScriptValue::Array(a), ScriptValue::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loosely_equals(y))
            }
            (ScriptValue::Record(a), ScriptValue::Record(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loosely_equals(vb))
            }
            (ScriptValue::Function(a), ScriptValue::Function(b)) => Rc::ptr_eq(a, b),
            (ScriptValue::Builtin(a), ScriptValue::Builtin(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Null => write!(f, "null"),
            ScriptValue::Boolean(b) => write!(f, "{}", b),
            ScriptValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            ScriptValue::String(s) => write!(f, "{}", s),
            ScriptValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ScriptValue::Record(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            ScriptValue::Function(closure) => write!(f, "<lambda({})>", closure.params.join(", ")),
            ScriptValue::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
        }
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Boolean(b)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s)
    }
}
