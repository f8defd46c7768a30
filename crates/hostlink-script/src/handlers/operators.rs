use crate::error::ScriptError;
use crate::evaluator::{Completion, Evaluator};
use crate::value::ScriptValue;
use hostlink_parser::ast::{AstNode, BinaryOp, UnaryOp};
use std::cmp::Ordering;

/// Evaluate a binary operation
///
/// `&&` and `||` short-circuit and yield the deciding operand, not a
/// coerced boolean.
pub fn evaluate_binary(
    evaluator: &mut Evaluator,
    op: BinaryOp,
    left: &AstNode,
    right: &AstNode,
) -> Result<Completion, ScriptError> {
    let left = value_of!(evaluator, left);

    match op {
        BinaryOp::And if !left.is_truthy() => return Ok(Completion::Normal(left)),
        BinaryOp::Or if left.is_truthy() => return Ok(Completion::Normal(left)),
        BinaryOp::And | BinaryOp::Or => return evaluator.evaluate(right),
        _ => {}
    }

    let right = value_of!(evaluator, right);
    apply_binary(op, &left, &right).map(Completion::Normal)
}

pub fn evaluate_unary(
    evaluator: &mut Evaluator,
    op: UnaryOp,
    operand: &AstNode,
) -> Result<Completion, ScriptError> {
    let value = value_of!(evaluator, operand);
    let result = match op {
        UnaryOp::Not => ScriptValue::Boolean(!value.is_truthy()),
        UnaryOp::Negate => match value {
            ScriptValue::Number(n) => ScriptValue::Number(-n),
            other => return Err(ScriptError::type_error("negation", "number", &other)),
        },
    };
    Ok(Completion::Normal(result))
}

/// Apply a non-short-circuit binary operator to two evaluated operands.
pub fn apply_binary(
    op: BinaryOp,
    left: &ScriptValue,
    right: &ScriptValue,
) -> Result<ScriptValue, ScriptError> {
    use ScriptValue::{Number, String};

    let result = match (op, left, right) {
        (BinaryOp::Add, Number(a), Number(b)) => Number(a + b),
        // String concatenation when either side is a string
        (BinaryOp::Add, String(_), _) | (BinaryOp::Add, _, String(_)) => {
            String(format!("{}{}", left, right))
        }
        (BinaryOp::Subtract, Number(a), Number(b)) => Number(a - b),
        (BinaryOp::Multiply, Number(a), Number(b)) => Number(a * b),
        (BinaryOp::Divide, Number(a), Number(b)) => Number(a / b),
        (BinaryOp::Modulo, Number(a), Number(b)) => Number(a % b),

        (BinaryOp::Equal, _, _) => ScriptValue::Boolean(left.loosely_equals(right)),
        (BinaryOp::NotEqual, _, _) => ScriptValue::Boolean(!left.loosely_equals(right)),

        (
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual,
            _,
            _,
        ) => {
            let ordering = compare(op, left, right)?;
            let holds = match op {
                BinaryOp::Less => ordering == Some(Ordering::Less),
                BinaryOp::LessEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                BinaryOp::Greater => ordering == Some(Ordering::Greater),
                _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            };
            ScriptValue::Boolean(holds)
        }

        (op, Number(_), other) | (op, other, _) => {
            return Err(ScriptError::type_error(
                &format!("'{}'", op.symbol()),
                "number",
                other,
            ))
        }
    };
    Ok(result)
}

/// Numbers compare numerically, strings lexicographically. `NaN` orders
/// with nothing.
fn compare(
    op: BinaryOp,
    left: &ScriptValue,
    right: &ScriptValue,
) -> Result<Option<Ordering>, ScriptError> {
    match (left, right) {
        (ScriptValue::Number(a), ScriptValue::Number(b)) => Ok(a.partial_cmp(b)),
        (ScriptValue::String(a), ScriptValue::String(b)) => Ok(Some(a.cmp(b))),
        (ScriptValue::Number(_), other) | (other, _) => Err(ScriptError::type_error(
            &format!("'{}'", op.symbol()),
            "two numbers or two strings",
            other,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_concatenates_strings() {
        let result = apply_binary(BinaryOp::Add, &"n=".into(), &ScriptValue::Number(3.0)).unwrap();
        assert_eq!(result.as_str(), Some("n=3"));
    }

    #[test]
    fn test_arithmetic_type_error_names_operand() {
        let err = apply_binary(BinaryOp::Subtract, &ScriptValue::Number(1.0), &"x".into()).unwrap_err();
        assert_eq!(err.to_string(), "Type error in '-': expected number, got string");
    }

    #[test]
    fn test_string_comparison() {
        let result = apply_binary(BinaryOp::Less, &"apple".into(), &"banana".into()).unwrap();
        assert!(result.is_truthy());
    }
}
