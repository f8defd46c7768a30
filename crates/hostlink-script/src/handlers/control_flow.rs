use crate::environment::Environment;
use crate::error::ScriptError;
use crate::evaluator::{Completion, Evaluator};
use crate::value::ScriptValue;
use hostlink_parser::ast::AstNode;

/// Evaluate an if expression; a missing else branch yields `null`
pub fn evaluate_if(
    evaluator: &mut Evaluator,
    condition: &AstNode,
    then_branch: &AstNode,
    else_branch: Option<&AstNode>,
) -> Result<Completion, ScriptError> {
    let condition = value_of!(evaluator, condition);

    if condition.is_truthy() {
        evaluator.evaluate(then_branch)
    } else {
        match else_branch {
            Some(branch) => evaluator.evaluate(branch),
            None => Ok(Completion::Normal(ScriptValue::Null)),
        }
    }
}

/// Evaluate a while loop; the loop itself evaluates to `null`
pub fn evaluate_while(
    evaluator: &mut Evaluator,
    condition: &AstNode,
    body: &AstNode,
) -> Result<Completion, ScriptError> {
    loop {
        let keep_going = value_of!(evaluator, condition);
        if !keep_going.is_truthy() {
            return Ok(Completion::Normal(ScriptValue::Null));
        }

        // Early return: propagate it immediately
        if let ret @ Completion::Return(_) = evaluator.evaluate(body)? {
            return Ok(ret);
        }
    }
}

/// Evaluate statements in a fresh child scope; the block's value is the
/// value of its last statement
pub fn evaluate_block(
    evaluator: &mut Evaluator,
    statements: &[AstNode],
) -> Result<Completion, ScriptError> {
    let scope = Environment::child(&evaluator.env);
    evaluator.with_scope(scope, |evaluator| {
        let mut last = ScriptValue::Null;
        for stmt in statements {
            last = value_of!(evaluator, stmt);
        }
        Ok(Completion::Normal(last))
    })
}

/// `try { body } catch (binding) { handler }`
///
/// Any error raised by the body is caught: thrown values are bound as-is,
/// runtime errors as their message.
pub fn evaluate_try(
    evaluator: &mut Evaluator,
    body: &AstNode,
    binding: &str,
    handler: &AstNode,
) -> Result<Completion, ScriptError> {
    match evaluator.evaluate(body) {
        Ok(completion) => Ok(completion),
        Err(err) => {
            let scope = Environment::child(&evaluator.env);
            scope.declare(binding, err.into_caught_value(), false);
            evaluator.with_scope(scope, |evaluator| evaluator.evaluate(handler))
        }
    }
}
