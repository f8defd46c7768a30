//! Error types of the bridge

use hostlink_types::ScriptDiagnostic;
use thiserror::Error;

/// Failures surfaced by the registry, the adapter and the dispatcher.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// A method descriptor was built from a malformed signature
    #[error("invalid signature for method '{method}': {reason}")]
    InvalidSignature { method: String, reason: String },

    /// Methods or constants of a module could not be determined
    #[error("introspection of module '{module}' failed: {reason}")]
    ModuleIntrospection { module: String, reason: String },

    /// The module factory failed or panicked
    #[error("module '{module}' failed to initialize: {reason}")]
    ModuleInitialization { module: String, reason: String },

    /// Work was sent to an execution context that cannot take it
    #[error("invalid execution context: {0}")]
    InvalidExecutionContext(String),

    #[error("a module named '{0}' is already registered")]
    DuplicateModuleName(String),

    #[error("unknown module '{0}'")]
    UnknownModule(String),

    /// Parse or initial-execution failure of a script source
    #[error("script failed to load: {0}")]
    ScriptLoad(ScriptDiagnostic),

    #[error("no script has been loaded")]
    ScriptNotLoaded,

    /// A targeted script call raised an error
    #[error("script call failed: {0}")]
    ScriptInvocation(ScriptDiagnostic),

    /// One call record of a batch failed; its siblings still ran
    #[error("record {index} ({module}.{method}) failed: {reason}")]
    RecordExecution {
        index: usize,
        module: String,
        method: String,
        reason: String,
    },

    /// The batch as a whole could not be delivered and is lost
    #[error("batch could not be delivered: {0}")]
    BatchDelivery(String),

    #[error("could not spawn queue '{name}': {reason}")]
    QueueSpawn { name: String, reason: String },
}

/// Error returned by module methods and factories.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    #[error("argument {index}: expected {expected}, got {got}")]
    InvalidArgument {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("{0}")]
    Failed(String),
}

impl ModuleError {
    pub fn failed(message: impl Into<String>) -> Self {
        ModuleError::Failed(message.into())
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
