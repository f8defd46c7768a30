//! Script half of the bridge: the queue of calls bound for native modules,
//! pending callbacks, callable modules and installed native hooks.

mod marshal;
pub mod native_modules;

pub use marshal::snapshot;

use crate::environment::Environment;
use crate::error::ScriptError;
use crate::evaluator::Evaluator;
use crate::value::ScriptValue;
use hostlink_types::{hooks, CallBatch, CallRecord, CallbackId, NativeHook, Value};
use std::collections::{BTreeMap, HashMap};

struct PendingCallback {
    function: ScriptValue,
    /// Callbacks handed over in the same call; invoking one retires all
    siblings: Vec<u64>,
}

#[derive(Default)]
pub struct MessageQueue {
    calls: CallBatch,
    callbacks: HashMap<u64, PendingCallback>,
    next_callback_id: u64,
    callable_modules: HashMap<String, ScriptValue>,
    hooks: HashMap<String, NativeHook>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, record: CallRecord) {
        self.calls.push(record);
    }

    pub fn queued_len(&self) -> usize {
        self.calls.len()
    }

    pub fn take_calls(&mut self) -> CallBatch {
        std::mem::take(&mut self.calls)
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Remove a callback so it can run; its siblings are retired with it.
    pub fn take_callback(&mut self, id: CallbackId) -> Option<ScriptValue> {
        let pending = self.callbacks.remove(&id.0)?;
        for sibling in &pending.siblings {
            self.callbacks.remove(sibling);
        }
        Some(pending.function)
    }

    pub fn register_callable_module(&mut self, name: &str, module: ScriptValue) {
        if self.callable_modules.insert(name.to_string(), module).is_some() {
            log::debug!("callable module '{}' replaced", name);
        }
    }

    pub fn callable_module(&self, name: &str) -> Option<ScriptValue> {
        self.callable_modules.get(name).cloned()
    }

    pub fn set_hook(&mut self, name: &str, hook: NativeHook) {
        self.hooks.insert(name.to_string(), hook);
    }

    pub fn hook(&self, name: &str) -> Option<NativeHook> {
        self.hooks.get(name).cloned()
    }

    fn issue_callback(&mut self, function: ScriptValue) -> CallbackId {
        let id = self.next_callback_id;
        self.next_callback_id += 1;
        self.callbacks.insert(
            id,
            PendingCallback {
                function,
                siblings: Vec::new(),
            },
        );
        CallbackId(id)
    }

    fn link_siblings(&mut self, issued: &[CallbackId]) {
        if issued.len() < 2 {
            return;
        }
        for id in issued {
            if let Some(pending) = self.callbacks.get_mut(&id.0) {
                pending.siblings = issued
                    .iter()
                    .filter(|other| *other != id)
                    .map(|other| other.0)
                    .collect();
            }
        }
    }

    fn discard_callbacks(&mut self, issued: &[CallbackId]) {
        for id in issued {
            self.callbacks.remove(&id.0);
        }
    }
}

impl Evaluator {
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Hand the queued calls to `nativeFlushQueueImmediate` once the queue
    /// reaches the configured threshold.
    pub(crate) fn flush_if_over_threshold(&mut self) -> Result<(), ScriptError> {
        let threshold = self.options.flush_threshold;
        if threshold == 0 || self.queue.queued_len() < threshold {
            return Ok(());
        }
        let Some(hook) = self.queue.hook(hooks::FLUSH_QUEUE_IMMEDIATE) else {
            return Ok(());
        };

        let batch = self.queue.take_calls();
        log::trace!("partial flush of {} queued calls", batch.len());
        hook(&[batch.to_value()]).map_err(|message| ScriptError::Native {
            hook: hooks::FLUSH_QUEUE_IMMEDIATE.to_string(),
            message,
        })?;
        Ok(())
    }

    /// Call a native hook with script arguments.
    pub(crate) fn call_hook(
        &mut self,
        name: &str,
        hook: &NativeHook,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        let args = self.queue.export_args(args)?;
        let result = hook(&args).map_err(|message| ScriptError::Native {
            hook: name.to_string(),
            message,
        })?;
        Ok(self.queue.import_value(&result))
    }
}

/// Install the bridge globals that exist before any config arrives:
/// `registerCallableModule` and `console`.
pub fn install(globals: &Environment) {
    globals.declare(
        "registerCallableModule",
        ScriptValue::builtin("registerCallableModule", |evaluator, args| {
            match args {
                [ScriptValue::String(name), module @ ScriptValue::Record(_)] => {
                    evaluator.queue.register_callable_module(name, module.clone());
                    Ok(ScriptValue::Null)
                }
                [ScriptValue::String(_), other] => Err(ScriptError::type_error(
                    "registerCallableModule",
                    "record",
                    other,
                )),
                _ => Err(ScriptError::Runtime(
                    "registerCallableModule expects (name, record)".to_string(),
                )),
            }
        }),
        false,
    );

    let mut console = BTreeMap::new();
    for (method, level) in [("log", 2u8), ("warn", 3), ("error", 4)] {
        console.insert(
            method.to_string(),
            ScriptValue::builtin(format!("console.{}", method), move |evaluator, args| {
                let message = args
                    .iter()
                    .map(|arg| arg.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                script_log(evaluator, message, level)?;
                Ok(ScriptValue::Null)
            }),
        );
    }
    globals.declare("console", ScriptValue::record(console), false);
}

/// Route a script log line through `nativeLoggingHook` when one is
/// installed, straight to the `log` facade otherwise.
fn script_log(evaluator: &mut Evaluator, message: String, level: u8) -> Result<(), ScriptError> {
    match evaluator.queue.hook(hooks::LOGGING) {
        Some(hook) => {
            hook(&[Value::String(message), Value::Number(level as f64)]).map_err(|message| {
                ScriptError::Native {
                    hook: hooks::LOGGING.to_string(),
                    message,
                }
            })?;
        }
        None => log::log!(target: "hostlink::script", script_log_level(level), "{}", message),
    }
    Ok(())
}

/// Map a script log level (0 = trace .. 4 = error) onto `log::Level`.
pub fn script_log_level(level: u8) -> log::Level {
    match level {
        0 => log::Level::Trace,
        1 => log::Level::Debug,
        2 => log::Level::Info,
        3 => log::Level::Warn,
        _ => log::Level::Error,
    }
}
