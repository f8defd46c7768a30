use crate::error::ScriptError;
use crate::evaluator::{Completion, Evaluator};
use crate::handlers::access::write_index;
use crate::value::ScriptValue;
use hostlink_parser::ast::AstNode;

/// Assign to a `mut` name, a record field or an indexed slot.
///
/// The assigned value is also the value of the expression.
pub fn evaluate_assignment(
    evaluator: &mut Evaluator,
    target: &AstNode,
    value: &AstNode,
) -> Result<Completion, ScriptError> {
    match target {
        AstNode::VariableRef(name) => {
            let value = value_of!(evaluator, value);
            evaluator.env.assign(name, value.clone())?;
            Ok(Completion::Normal(value))
        }
        AstNode::FieldAccess { record, field } => {
            let container = value_of!(evaluator, record);
            let value = value_of!(evaluator, value);
            match &container {
                ScriptValue::Record(fields) => {
                    fields.borrow_mut().insert(field.clone(), value.clone());
                    Ok(Completion::Normal(value))
                }
                other => Err(ScriptError::type_error(
                    &format!("field assignment '.{}'", field),
                    "record",
                    other,
                )),
            }
        }
        AstNode::IndexAccess { object, index } => {
            let container = value_of!(evaluator, object);
            let index = value_of!(evaluator, index);
            let value = value_of!(evaluator, value);
            write_index(&container, &index, value.clone())?;
            Ok(Completion::Normal(value))
        }
        _ => Err(ScriptError::Runtime("Invalid assignment target".to_string())),
    }
}
