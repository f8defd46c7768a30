use crate::error::ScriptError;
use crate::evaluator::{Completion, Evaluator};
use crate::value::ScriptValue;
use hostlink_parser::ast::AstNode;

/// `record.field`; a missing field reads as `null`
pub fn evaluate_field_access(
    evaluator: &mut Evaluator,
    record: &AstNode,
    field: &str,
) -> Result<Completion, ScriptError> {
    let target = value_of!(evaluator, record);
    read_field(&target, field).map(Completion::Normal)
}

pub fn evaluate_index_access(
    evaluator: &mut Evaluator,
    object: &AstNode,
    index: &AstNode,
) -> Result<Completion, ScriptError> {
    let target = value_of!(evaluator, object);
    let index = value_of!(evaluator, index);
    read_index(&target, &index).map(Completion::Normal)
}

pub fn read_field(target: &ScriptValue, field: &str) -> Result<ScriptValue, ScriptError> {
    match target {
        ScriptValue::Record(fields) => Ok(fields.borrow().get(field).cloned().unwrap_or_default()),
        other => Err(ScriptError::type_error(
            &format!("field access '.{}'", field),
            "record",
            other,
        )),
    }
}

/// Arrays and strings take numeric indices, records take string keys.
/// Reads past the end produce `null`.
pub fn read_index(target: &ScriptValue, index: &ScriptValue) -> Result<ScriptValue, ScriptError> {
    match (target, index) {
        (ScriptValue::Array(items), ScriptValue::Number(n)) => {
            Ok(as_position(*n).and_then(|i| items.borrow().get(i).cloned()).unwrap_or_default())
        }
        (ScriptValue::String(s), ScriptValue::Number(n)) => Ok(as_position(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|c| ScriptValue::String(c.to_string()))
            .unwrap_or_default()),
        (ScriptValue::Record(fields), ScriptValue::String(key)) => {
            Ok(fields.borrow().get(key).cloned().unwrap_or_default())
        }
        (ScriptValue::Array(_) | ScriptValue::String(_), other) => {
            Err(ScriptError::type_error("index access", "number", other))
        }
        (ScriptValue::Record(_), other) => Err(ScriptError::type_error("index access", "string", other)),
        (other, _) => Err(ScriptError::type_error(
            "index access",
            "array, string or record",
            other,
        )),
    }
}

/// Store into an array slot or record key. An array index equal to the
/// length appends; anything further out is an error.
pub fn write_index(
    target: &ScriptValue,
    index: &ScriptValue,
    value: ScriptValue,
) -> Result<(), ScriptError> {
    match (target, index) {
        (ScriptValue::Array(items), ScriptValue::Number(n)) => {
            let mut items = items.borrow_mut();
            let len = items.len();
            match as_position(*n) {
                Some(i) if i < len => items[i] = value,
                Some(i) if i == len => items.push(value),
                _ => {
                    return Err(ScriptError::Runtime(format!(
                        "Index {} out of bounds for array of length {}",
                        n, len
                    )))
                }
            }
            Ok(())
        }
        (ScriptValue::Record(fields), ScriptValue::String(key)) => {
            fields.borrow_mut().insert(key.clone(), value);
            Ok(())
        }
        (ScriptValue::Array(_), other) => Err(ScriptError::type_error("index assignment", "number", other)),
        (ScriptValue::Record(_), other) => Err(ScriptError::type_error("index assignment", "string", other)),
        (other, _) => Err(ScriptError::type_error("index assignment", "array or record", other)),
    }
}

fn as_position(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 {
        Some(n as usize)
    } else {
        None
    }
}
