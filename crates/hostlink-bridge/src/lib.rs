//! Module bridge between native modules and a script context.
//!
//! * [`ModuleRegistry`] owns the registered modules and builds the table the
//!   script side is initialized with.
//! * [`ScriptAdapter`] runs a [`ScriptEngine`](hostlink_types::ScriptEngine)
//!   on its own queue.
//! * [`BatchDispatcher`] moves call batches between the two and notifies
//!   modules when batches complete.

pub mod adapter;
pub mod callback;
pub mod config;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod foreign;
pub mod method;
pub mod module;
pub mod queue;
pub mod registry;


// Re-exports
pub use adapter::{ScriptAdapter, ScriptContext, ScriptRuntime};
pub use callback::{Callback, CallbackSink};
pub use config::{BridgeConfig, DEFAULT_SCRIPT_STACK_SIZE};
pub use descriptor::{ModuleConfig, ModuleDescriptor};
pub use dispatcher::{BatchDispatcher, BatchReport, CycleReport, DispatchState};
pub use error::{BridgeError, ModuleError};
pub use foreign::ForeignObject;
pub use method::{Arity, FromValue, Invocation, MethodDescriptor, MethodKind, MAX_ARGUMENTS};
pub use module::{ModuleClass, ModuleClassBuilder, NativeModule, QueuePolicy};
pub use queue::{ExecutionQueue, QueueThread, RegistryQueues};
pub use registry::{ModuleRegistry, ScriptConfig};
