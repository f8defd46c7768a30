//! `NativeModules`: the script-side view of the native module registry,
//! built from the bridge config payload.

use crate::error::ScriptError;
use crate::evaluator::Evaluator;
use crate::value::ScriptValue;
use hostlink_types::{hooks, CallRecord, Value};
use std::collections::BTreeMap;

/// Name of the global holding one record per native module
pub const NATIVE_MODULES_GLOBAL: &str = "NativeModules";

/// One entry of the config payload
struct ModuleEntry {
    index: usize,
    name: String,
    constants: Option<BTreeMap<String, Value>>,
    methods: Vec<String>,
    sync_methods: Vec<usize>,
}

impl ModuleEntry {
    fn from_value(value: &Value, position: usize) -> Result<Self, ScriptError> {
        let invalid = |what: &str| {
            ScriptError::Runtime(format!(
                "Invalid bridge config entry {}: {}",
                position, what
            ))
        };

        let fields = value.as_record().ok_or_else(|| invalid("not a record"))?;
        let index = fields
            .get("moduleIndex")
            .and_then(Value::as_index)
            .ok_or_else(|| invalid("missing moduleIndex"))?;
        let name = fields
            .get("moduleName")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing moduleName"))?
            .to_string();
        let constants = match fields.get("constants") {
            None | Some(Value::Null) => None,
            Some(Value::Record(constants)) => Some(constants.clone()),
            Some(_) => return Err(invalid("constants must be a record or null")),
        };
        let methods = fields
            .get("methods")
            .and_then(Value::as_array)
            .unwrap_or_default()
            .iter()
            .map(|method| {
                method
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("method names must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sync_methods = fields
            .get("syncMethods")
            .and_then(Value::as_array)
            .unwrap_or_default()
            .iter()
            .map(|index| index.as_index().ok_or_else(|| invalid("bad syncMethods index")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            index,
            name,
            constants,
            methods,
            sync_methods,
        })
    }
}

/// Rebuild `NativeModules` from a config payload
/// (`[{moduleIndex, moduleName, constants, methods, syncMethods}, ...]`).
pub fn install(evaluator: &mut Evaluator, config: &Value) -> Result<(), ScriptError> {
    let entries = config.as_array().ok_or_else(|| {
        ScriptError::Runtime(format!(
            "Bridge config must be an array, got {}",
            config.type_name()
        ))
    })?;

    let mut modules = BTreeMap::new();
    for (position, entry) in entries.iter().enumerate() {
        let entry = ModuleEntry::from_value(entry, position)?;
        let mut record = BTreeMap::new();

        if let Some(constants) = &entry.constants {
            for (key, value) in constants {
                record.insert(key.clone(), evaluator.queue.import_value(value));
            }
        }
        for (method_index, method) in entry.methods.iter().enumerate() {
            let label = format!("{}.{}", entry.name, method);
            let proxy = if entry.sync_methods.contains(&method_index) {
                sync_proxy(entry.index, method_index, label)
            } else {
                async_proxy(entry.index, method_index, label)
            };
            // Methods win over constants with the same key
            record.insert(method.clone(), proxy);
        }

        log::trace!(
            "script module {} '{}' with {} methods",
            entry.index,
            entry.name,
            entry.methods.len()
        );
        modules.insert(entry.name, ScriptValue::record(record));
    }

    evaluator.set_global(NATIVE_MODULES_GLOBAL, ScriptValue::record(modules));
    Ok(())
}

/// Proxy that queues the call for the next flush and returns `null`.
fn async_proxy(module_index: usize, method_index: usize, label: String) -> ScriptValue {
    ScriptValue::builtin(label, move |evaluator, args| {
        let args = evaluator.queue.export_args(args)?;
        evaluator
            .queue
            .enqueue(CallRecord::new(module_index, method_index, args));
        evaluator.flush_if_over_threshold()?;
        Ok(ScriptValue::Null)
    })
}

/// Proxy that runs the method right away through `nativeCallSyncHook`.
fn sync_proxy(module_index: usize, method_index: usize, label: String) -> ScriptValue {
    ScriptValue::builtin(label.clone(), move |evaluator, args| {
        let hook = evaluator.queue.hook(hooks::CALL_SYNC).ok_or_else(|| {
            ScriptError::Runtime(format!(
                "{} is synchronous but {} is not installed",
                label,
                hooks::CALL_SYNC
            ))
        })?;
        let args = evaluator.queue.export_args(args)?;
        let result = hook(&[
            Value::from(module_index),
            Value::from(method_index),
            Value::Array(args),
        ])
        .map_err(|message| ScriptError::Native {
            hook: hooks::CALL_SYNC.to_string(),
            message,
        })?;
        Ok(evaluator.queue.import_value(&result))
    })
}
