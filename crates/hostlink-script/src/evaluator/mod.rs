mod dispatcher;

use crate::bridge::{self, MessageQueue};
use crate::builtins;
use crate::environment::Environment;
use crate::error::ScriptError;
use crate::options::InterpreterOptions;
use crate::value::ScriptValue;
use std::rc::Rc;

/// Outcome of evaluating a node: a plain value, or a `return` that is
/// still unwinding towards the enclosing function.
#[derive(Debug, Clone)]
pub enum Completion {
    Normal(ScriptValue),
    Return(ScriptValue),
}

impl Completion {
    pub fn into_value(self) -> ScriptValue {
        match self {
            Completion::Normal(value) | Completion::Return(value) => value,
        }
    }
}

/// Tree-walking interpreter state
pub struct Evaluator {
    pub(crate) globals: Rc<Environment>,
    pub(crate) env: Rc<Environment>,
    pub(crate) options: InterpreterOptions,
    pub(crate) call_depth: usize,
    pub(crate) queue: MessageQueue,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_options(InterpreterOptions::default())
    }

    pub fn with_options(options: InterpreterOptions) -> Self {
        let globals = Environment::new();
        builtins::install(&globals);
        bridge::install(&globals);

        Self {
            env: Rc::clone(&globals),
            globals,
            options,
            call_depth: 0,
            queue: MessageQueue::new(),
        }
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    /// Parse and run `source` in the global scope, returning the value of
    /// the last statement (or of a top-level `return`).
    pub fn eval_str(&mut self, source: &str) -> Result<ScriptValue, ScriptError> {
        let statements = hostlink_parser::parse(source)?;

        // A failed run must not leave the evaluator inside a nested scope
        self.env = Rc::clone(&self.globals);
        self.call_depth = 0;

        let mut result = ScriptValue::Null;
        for stmt in &statements {
            match self.evaluate(stmt)? {
                Completion::Normal(value) => result = value,
                Completion::Return(value) => return Ok(value),
            }
        }
        Ok(result)
    }

    pub fn global(&self, name: &str) -> Option<ScriptValue> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: ScriptValue) {
        self.globals.declare(name, value, false);
    }

    /// Run `f` with `scope` as the current scope, restoring the previous one
    /// afterwards whatever `f` returns.
    pub(crate) fn with_scope<T>(
        &mut self,
        scope: Rc<Environment>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = std::mem::replace(&mut self.env, scope);
        let result = f(self);
        self.env = saved;
        result
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}
