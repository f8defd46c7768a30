//! Core builtins available to every script: `len`, `push`, `str`, `keys`.

use crate::environment::Environment;
use crate::error::ScriptError;
use crate::evaluator::Evaluator;
use crate::value::ScriptValue;

type CoreFn = fn(&mut Evaluator, &[ScriptValue]) -> Result<ScriptValue, ScriptError>;

/// (name, function, expected argument count)
const CORE_BUILTINS: &[(&str, CoreFn, usize)] = &[
    ("len", builtin_len, 1),
    ("push", builtin_push, 2),
    ("str", builtin_str, 1),
    ("keys", builtin_keys, 1),
];

pub fn install(globals: &Environment) {
    for &(name, func, arity) in CORE_BUILTINS {
        globals.declare(
            name,
            ScriptValue::builtin(name, move |evaluator, args| {
                if args.len() != arity {
                    return Err(ScriptError::Runtime(format!(
                        "{}() expects {} argument{}, got {}",
                        name,
                        arity,
                        if arity == 1 { "" } else { "s" },
                        args.len()
                    )));
                }
                func(evaluator, args)
            }),
            false,
        );
    }
}

/// Length of an array, string (in characters) or record (field count)
fn builtin_len(_: &mut Evaluator, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    let len = match &args[0] {
        ScriptValue::Array(items) => items.borrow().len(),
        ScriptValue::String(s) => s.chars().count(),
        ScriptValue::Record(fields) => fields.borrow().len(),
        other => return Err(ScriptError::type_error("len", "array, string or record", other)),
    };
    Ok(ScriptValue::Number(len as f64))
}

/// Append in place; returns the new length
fn builtin_push(_: &mut Evaluator, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    match &args[0] {
        ScriptValue::Array(items) => {
            let mut items = items.borrow_mut();
            items.push(args[1].clone());
            Ok(ScriptValue::Number(items.len() as f64))
        }
        other => Err(ScriptError::type_error("push", "array", other)),
    }
}

fn builtin_str(_: &mut Evaluator, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    Ok(ScriptValue::String(args[0].to_string()))
}

/// Field names of a record, in sorted order
fn builtin_keys(_: &mut Evaluator, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    match &args[0] {
        ScriptValue::Record(fields) => Ok(ScriptValue::array(
            fields
                .borrow()
                .keys()
                .map(|key| ScriptValue::String(key.clone()))
                .collect(),
        )),
        other => Err(ScriptError::type_error("keys", "record", other)),
    }
}
