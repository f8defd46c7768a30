use serde::Deserialize;

/// Tuning knobs of the reference interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct InterpreterOptions {
    /// Queue length at which queued native calls are handed to
    /// `nativeFlushQueueImmediate` before the cycle ends (0 disables)
    pub flush_threshold: usize,
    /// Maximum nesting of script function calls
    pub max_call_depth: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            flush_threshold: 0,
            max_call_depth: 256,
        }
    }
}
