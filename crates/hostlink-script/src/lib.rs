//! Reference script engine for the hostlink bridge.
//!
//! A small tree-walking interpreter over the `hostlink-parser` AST. Besides
//! the language itself it carries the script half of the bridge: the
//! `NativeModules` proxies built from the bridge config, the queue of calls
//! waiting for the native side, callable modules and pending callbacks.

/// Evaluate `node` to a value, handing an early `return` back to the caller.
macro_rules! value_of {
    ($evaluator:expr, $node:expr) => {
        match $evaluator.evaluate($node)? {
            $crate::evaluator::Completion::Normal(value) => value,
            completion @ $crate::evaluator::Completion::Return(_) => return Ok(completion),
        }
    };
}

pub mod bridge;
pub mod builtins;
pub mod engine;
pub mod environment;
pub mod error;
pub mod evaluator;
mod handlers;
pub mod options;
pub mod value;

pub use engine::engine_factory;
pub use error::ScriptError;
pub use evaluator::{Completion, Evaluator};
pub use options::InterpreterOptions;
pub use value::ScriptValue;
