use crate::error::ScriptError;
use crate::evaluator::{Completion, Evaluator};
use crate::value::ScriptValue;
use hostlink_parser::ast::AstNode;

pub fn evaluate_reference(evaluator: &mut Evaluator, name: &str) -> Result<Completion, ScriptError> {
    evaluator
        .env
        .get(name)
        .map(Completion::Normal)
        .ok_or_else(|| ScriptError::UndefinedVariable(name.to_string()))
}

/// `let` / `mut` declaration in the current scope; evaluates to `null`
pub fn evaluate_declaration(
    evaluator: &mut Evaluator,
    name: &str,
    mutable: bool,
    initializer: &AstNode,
) -> Result<Completion, ScriptError> {
    let value = value_of!(evaluator, initializer);
    evaluator.env.declare(name, value, mutable);
    Ok(Completion::Normal(ScriptValue::Null))
}
