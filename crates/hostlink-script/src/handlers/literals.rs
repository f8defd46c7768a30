use crate::error::ScriptError;
use crate::evaluator::{Completion, Evaluator};
use crate::value::ScriptValue;
use hostlink_parser::ast::AstNode;
use std::collections::BTreeMap;

/// Evaluate an array literal, left to right
pub fn evaluate_array(
    evaluator: &mut Evaluator,
    elements: &[AstNode],
) -> Result<Completion, ScriptError> {
    let mut items = Vec::with_capacity(elements.len());
    for element in elements {
        items.push(value_of!(evaluator, element));
    }
    Ok(Completion::Normal(ScriptValue::array(items)))
}

/// Evaluate a record literal in field order
pub fn evaluate_record(
    evaluator: &mut Evaluator,
    fields: &[(String, AstNode)],
) -> Result<Completion, ScriptError> {
    let mut record = BTreeMap::new();
    for (key, expr) in fields {
        let value = value_of!(evaluator, expr);
        record.insert(key.clone(), value);
    }
    Ok(Completion::Normal(ScriptValue::record(record)))
}
