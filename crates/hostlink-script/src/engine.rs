//! [`ScriptEngine`] implementation for the reference interpreter.

use crate::bridge::{native_modules, snapshot};
use crate::error::ScriptError;
use crate::evaluator::Evaluator;
use crate::options::InterpreterOptions;
use crate::value::ScriptValue;
use hostlink_types::{
    hooks, CallBatch, CallbackId, EngineFactory, NativeHook, ScriptDiagnostic, ScriptEngine,
    SourceLocation, Value,
};

/// Factory handing the bridge a fresh interpreter built on its script thread.
pub fn engine_factory(options: InterpreterOptions) -> EngineFactory {
    Box::new(move || Box::new(Evaluator::with_options(options)) as Box<dyn ScriptEngine>)
}

fn diagnose(err: ScriptError, origin: &str) -> ScriptDiagnostic {
    match err {
        ScriptError::Syntax(parse) => {
            ScriptDiagnostic::new(parse.message.clone()).with_location(SourceLocation {
                origin: origin.to_string(),
                line: parse.line,
                column: parse.column,
            })
        }
        other => ScriptDiagnostic::new(other.to_string()),
    }
}

impl ScriptEngine for Evaluator {
    fn define_global(&mut self, name: &str, value: Value) {
        if name == hooks::CONFIG_GLOBAL {
            if let Err(err) = native_modules::install(self, &value) {
                log::error!("could not build NativeModules: {}", err);
            }
        }
        let value = self.queue.import_value(&value);
        self.set_global(name, value);
    }

    fn define_hook(&mut self, name: &str, hook: NativeHook) {
        self.queue.set_hook(name, hook.clone());

        let hook_name = name.to_string();
        self.set_global(
            name,
            ScriptValue::builtin(name, move |evaluator, args| {
                evaluator.call_hook(&hook_name, &hook, args)
            }),
        );
    }

    fn evaluate(&mut self, source: &str, origin: &str) -> Result<Value, ScriptDiagnostic> {
        self.eval_str(source)
            .map(|value| snapshot(&value))
            .map_err(|err| diagnose(err, origin))
    }

    fn call_function(
        &mut self,
        module: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ScriptDiagnostic> {
        let target = self.queue.callable_module(module).ok_or_else(|| {
            ScriptDiagnostic::new(format!("Callable module '{}' is not registered", module))
        })?;
        let function = match &target {
            ScriptValue::Record(fields) => fields.borrow().get(method).cloned(),
            _ => None,
        }
        .filter(ScriptValue::is_callable)
        .ok_or_else(|| {
            ScriptDiagnostic::new(format!("'{}.{}' is not a function", module, method))
        })?;

        let args = args.iter().map(|arg| self.queue.import_value(arg)).collect();
        self.call_value(&function, args)
            .map(|value| snapshot(&value))
            .map_err(|err| diagnose(err, module))
    }

    fn invoke_callback(&mut self, id: CallbackId, args: &[Value]) -> Result<(), ScriptDiagnostic> {
        let function = self.queue.take_callback(id).ok_or_else(|| {
            ScriptDiagnostic::new(format!("Unknown or already invoked callback {}", id))
        })?;

        let args = args.iter().map(|arg| self.queue.import_value(arg)).collect();
        self.call_value(&function, args)
            .map(|_| ())
            .map_err(|err| diagnose(err, "callback"))
    }

    fn take_queued_calls(&mut self) -> CallBatch {
        self.queue.take_calls()
    }

    fn queued_call_count(&self) -> usize {
        self.queue.queued_len()
    }
}
