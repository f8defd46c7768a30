pub mod engine;
pub mod sync;
pub mod value;
pub mod wire;

// Re-exports
pub use engine::{
    hooks, EngineFactory, NativeHook, ScriptDiagnostic, ScriptEngine, SourceLocation,
};
pub use value::{CallbackId, Constants, Value};
pub use wire::{CallBatch, CallRecord, WireError};
