//! Script Engine Trait
//!
//! Defines the capability the bridge needs from a script engine. The bridge
//! never depends on a concrete engine: it receives an [`EngineFactory`] and
//! drives whatever engine it produces through this trait, always from one
//! dedicated thread.

use crate::value::{CallbackId, Value};
use crate::wire::CallBatch;
use std::fmt;
use std::sync::Arc;

/// Names of the globals and hooks shared by the bridge and script engines.
pub mod hooks {
    /// Global holding the module table the script side is initialized with
    pub const CONFIG_GLOBAL: &str = "__bridgeConfig";
    /// `nativeFlushQueueImmediate(batch)`: hand queued calls over early
    pub const FLUSH_QUEUE_IMMEDIATE: &str = "nativeFlushQueueImmediate";
    /// `nativeCallSyncHook(moduleIndex, methodIndex, args)`: run a sync method
    pub const CALL_SYNC: &str = "nativeCallSyncHook";
    /// `nativeLoggingHook(message, level)`: level 0 = trace .. 4 = error
    pub const LOGGING: &str = "nativeLoggingHook";
}

/// Position inside a script source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub origin: String,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.origin, self.line, self.column)
    }
}

/// Structured report of a script failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptDiagnostic {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl ScriptDiagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for ScriptDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} (at {})", self.message, location),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ScriptDiagnostic {}

/// Native function installed into a script context.
pub type NativeHook = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Builds an engine on the thread that will own it.
pub type EngineFactory = Box<dyn FnOnce() -> Box<dyn ScriptEngine> + Send>;

/// Capability interface of a script engine.
///
/// Implementations are single-threaded; the bridge constructs them on the
/// script thread and never moves them.
pub trait ScriptEngine {
    /// Install a global value before or between evaluations
    fn define_global(&mut self, name: &str, value: Value);

    /// Install a native function callable from scripts under `name`
    fn define_hook(&mut self, name: &str, hook: NativeHook);

    /// Parse and execute a script source
    fn evaluate(&mut self, source: &str, origin: &str) -> Result<Value, ScriptDiagnostic>;

    /// Call `method` on a callable module registered by the script side
    fn call_function(
        &mut self,
        module: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ScriptDiagnostic>;

    /// Run a callback previously handed to the native side
    fn invoke_callback(&mut self, id: CallbackId, args: &[Value]) -> Result<(), ScriptDiagnostic>;

    /// Drain the calls the script side queued for native modules
    fn take_queued_calls(&mut self) -> CallBatch;

    /// Number of calls currently queued for native modules
    fn queued_call_count(&self) -> usize;
}
