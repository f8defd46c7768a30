use crate::environment::Environment;
use crate::error::ScriptError;
use crate::evaluator::{Completion, Evaluator};
use crate::value::{Closure, ScriptValue};
use hostlink_parser::ast::AstNode;
use std::rc::Rc;

/// Create a closure capturing the current scope
pub fn evaluate_lambda(evaluator: &mut Evaluator, params: &[String], body: &Rc<AstNode>) -> Completion {
    Completion::Normal(ScriptValue::Function(Rc::new(Closure {
        params: params.to_vec(),
        body: Rc::clone(body),
        env: Rc::clone(&evaluator.env),
    })))
}

pub fn evaluate_call(
    evaluator: &mut Evaluator,
    callee: &AstNode,
    args: &[AstNode],
) -> Result<Completion, ScriptError> {
    let function = value_of!(evaluator, callee);

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(value_of!(evaluator, arg));
    }

    evaluator.call_value(&function, values).map(Completion::Normal)
}

impl Evaluator {
    /// Call a script function or builtin.
    ///
    /// Missing arguments are bound as `null` and extra ones are ignored, so
    /// native code can invoke callbacks with fewer values than declared.
    pub fn call_value(
        &mut self,
        function: &ScriptValue,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue, ScriptError> {
        if self.call_depth >= self.options.max_call_depth {
            return Err(ScriptError::CallDepthExceeded(self.options.max_call_depth));
        }

        self.call_depth += 1;
        let result = self.call_unchecked(function, args);
        self.call_depth -= 1;
        result
    }

    fn call_unchecked(
        &mut self,
        function: &ScriptValue,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue, ScriptError> {
        match function {
            ScriptValue::Function(closure) => {
                let scope = Environment::child(&closure.env);
                let mut args = args.into_iter();
                for param in &closure.params {
                    scope.declare(param, args.next().unwrap_or_default(), false);
                }

                let body = Rc::clone(&closure.body);
                self.with_scope(scope, |evaluator| evaluator.evaluate(&body))
                    .map(Completion::into_value)
            }
            ScriptValue::Builtin(builtin) => {
                let func = Rc::clone(&builtin.func);
                func(self, &args)
            }
            other => Err(ScriptError::type_error("call", "function", other)),
        }
    }
}
