//! Method Descriptor
//!
//! Immutable description of one callable native method and the marshalling
//! helpers its implementation uses to read script arguments.

use crate::callback::{Callback, CallbackSink};
use crate::error::{BridgeError, ModuleError};
use crate::module::NativeModule;
use hostlink_types::{Constants, Value};
use std::fmt;
use std::sync::Arc;

/// Upper bound for any arity a method may declare
pub const MAX_ARGUMENTS: usize = 64;

/// Shape hint for the number of arguments a method takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// Inclusive bounds
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, argc: usize) -> bool {
        match *self {
            Arity::Exact(n) => argc == n,
            Arity::Range(min, max) => argc >= min && argc <= max,
            Arity::AtLeast(min) => argc >= min,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            Arity::Exact(n) | Arity::AtLeast(n) if n > MAX_ARGUMENTS => Err(format!(
                "arity {} exceeds the maximum of {} arguments",
                n, MAX_ARGUMENTS
            )),
            Arity::Range(min, max) if min > max => {
                Err(format!("arity range {}..={} is empty", min, max))
            }
            Arity::Range(_, max) if max > MAX_ARGUMENTS => Err(format!(
                "arity {} exceeds the maximum of {} arguments",
                max, MAX_ARGUMENTS
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Range(min, max) => write!(f, "{} to {}", min, max),
            Arity::AtLeast(min) => write!(f, "at least {}", min),
        }
    }
}

/// How the script side calls a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodKind {
    /// Queued into a batch; the result reaches the script only via callbacks
    #[default]
    Async,
    /// Called through `nativeCallSyncHook`; the result is returned directly
    Sync,
}

/// Bound native implementation of a method.
pub type MethodFn =
    Arc<dyn Fn(&dyn NativeModule, &mut Invocation) -> Result<Value, ModuleError> + Send + Sync>;

#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    arity: Arity,
    kind: MethodKind,
    callable: MethodFn,
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        arity: Arity,
        kind: MethodKind,
        callable: MethodFn,
    ) -> Result<Self, BridgeError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(BridgeError::InvalidSignature {
                method: name,
                reason: "name is not an identifier".to_string(),
            });
        }
        arity
            .validate()
            .map_err(|reason| BridgeError::InvalidSignature {
                method: name.clone(),
                reason,
            })?;

        Ok(Self {
            name,
            arity,
            kind,
            callable,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn is_sync(&self) -> bool {
        self.kind == MethodKind::Sync
    }

    pub fn accepts(&self, argc: usize) -> bool {
        self.arity.accepts(argc)
    }

    pub(crate) fn invoke(
        &self,
        module: &dyn NativeModule,
        invocation: &mut Invocation,
    ) -> Result<Value, ModuleError> {
        (self.callable)(module, invocation)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

// ============================================================================
// Argument marshalling
// ============================================================================

/// Conversion from a script value into a native argument type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;

    /// Name of the expected script type, used in argument errors
    fn expected() -> &'static str;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }

    fn expected() -> &'static str {
        "any"
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }

    fn expected() -> &'static str {
        "string"
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_number()
    }

    fn expected() -> &'static str {
        "number"
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value.as_number() {
            Some(n) if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 => {
                Some(n as i64)
            }
            _ => None,
        }
    }

    fn expected() -> &'static str {
        "integer"
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }

    fn expected() -> &'static str {
        "boolean"
    }
}

impl FromValue for Constants {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_record().cloned()
    }

    fn expected() -> &'static str {
        "record"
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_array()?.iter().map(T::from_value).collect()
    }

    fn expected() -> &'static str {
        "array"
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn expected() -> &'static str {
        T::expected()
    }
}

static MISSING: Value = Value::Null;

/// Arguments of one method call.
pub struct Invocation {
    args: Vec<Value>,
    sink: Option<Arc<dyn CallbackSink>>,
}

impl Invocation {
    /// Invocation without a script context; `callback` fails on it.
    pub fn new(args: Vec<Value>) -> Self {
        Self { args, sink: None }
    }

    pub(crate) fn with_sink(args: Vec<Value>, sink: Arc<dyn CallbackSink>) -> Self {
        Self {
            args,
            sink: Some(sink),
        }
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Convert argument `index`. A missing argument reads as `null`.
    pub fn arg<T: FromValue>(&self, index: usize) -> Result<T, ModuleError> {
        let value = self.args.get(index).unwrap_or(&MISSING);
        T::from_value(value).ok_or(ModuleError::InvalidArgument {
            index,
            expected: T::expected(),
            got: value.type_name(),
        })
    }

    /// Take the callback passed as argument `index`.
    pub fn callback(&mut self, index: usize) -> Result<Callback, ModuleError> {
        let id = match self.args.get(index) {
            Some(Value::Callback(id)) => *id,
            other => {
                return Err(ModuleError::InvalidArgument {
                    index,
                    expected: "callback",
                    got: other.unwrap_or(&MISSING).type_name(),
                })
            }
        };
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| ModuleError::failed("callbacks need a script context"))?;
        self.args[index] = Value::Null;
        Ok(Callback::new(id, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> MethodFn {
        Arc::new(|_: &dyn NativeModule, _: &mut Invocation| Ok(Value::Null))
    }

    #[test]
    fn test_rejects_malformed_names() {
        for name in ["", "1st", "with space", "dash-name"] {
            let result = MethodDescriptor::new(name, Arity::Exact(0), MethodKind::Async, noop());
            assert!(
                matches!(result, Err(BridgeError::InvalidSignature { .. })),
                "{:?} should be rejected",
                name
            );
        }
        assert!(MethodDescriptor::new("_getItem2", Arity::Exact(0), MethodKind::Async, noop()).is_ok());
    }

    #[test]
    fn test_rejects_bad_arity() {
        let inverted = MethodDescriptor::new("f", Arity::Range(3, 1), MethodKind::Async, noop());
        assert!(matches!(inverted, Err(BridgeError::InvalidSignature { .. })));

        let huge = MethodDescriptor::new("f", Arity::AtLeast(MAX_ARGUMENTS + 1), MethodKind::Sync, noop());
        assert!(matches!(huge, Err(BridgeError::InvalidSignature { .. })));
    }

    #[test]
    fn test_arity_accepts() {
        assert!(Arity::Exact(2).accepts(2));
        assert!(!Arity::Exact(2).accepts(1));
        assert!(Arity::Range(1, 3).accepts(3));
        assert!(!Arity::Range(1, 3).accepts(0));
        assert!(Arity::AtLeast(1).accepts(10));
    }

    #[test]
    fn test_argument_conversion() {
        let call = Invocation::new(vec![
            Value::from("key"),
            Value::Number(3.0),
            Value::Array(vec![Value::from("a"), Value::from("b")]),
        ]);
        assert_eq!(call.arg::<String>(0).unwrap(), "key");
        assert_eq!(call.arg::<i64>(1).unwrap(), 3);
        assert_eq!(call.arg::<Vec<String>>(2).unwrap(), vec!["a", "b"]);
        assert_eq!(call.arg::<Option<f64>>(5).unwrap(), None);

        assert_eq!(
            call.arg::<bool>(0),
            Err(ModuleError::InvalidArgument {
                index: 0,
                expected: "boolean",
                got: "string"
            })
        );
    }

    #[test]
    fn test_callback_requires_context() {
        let mut call = Invocation::new(vec![Value::Callback(hostlink_types::CallbackId(1))]);
        assert!(matches!(call.callback(0), Err(ModuleError::Failed(_))));
        assert!(matches!(
            call.callback(1),
            Err(ModuleError::InvalidArgument { got: "null", .. })
        ));
    }
}
