//! Conversion between interpreter values and bridge [`Value`]s.

use super::MessageQueue;
use crate::error::ScriptError;
use crate::value::ScriptValue;
use hostlink_types::{CallbackId, Value};
use std::collections::BTreeMap;

/// Deepest nesting accepted when exporting; deeper values are almost
/// certainly self-referential.
const MAX_EXPORT_DEPTH: usize = 64;

impl MessageQueue {
    /// Export call arguments for the native side. Functions anywhere in the
    /// arguments are registered as callbacks and become `Value::Callback`.
    pub fn export_args(&mut self, args: &[ScriptValue]) -> Result<Vec<Value>, ScriptError> {
        let mut issued = Vec::new();
        let exported = args
            .iter()
            .map(|arg| self.export_value(arg, &mut issued, 0))
            .collect::<Result<Vec<_>, _>>();

        match exported {
            Ok(values) => {
                self.link_siblings(&issued);
                Ok(values)
            }
            Err(err) => {
                self.discard_callbacks(&issued);
                Err(err)
            }
        }
    }

    fn export_value(
        &mut self,
        value: &ScriptValue,
        issued: &mut Vec<CallbackId>,
        depth: usize,
    ) -> Result<Value, ScriptError> {
        if depth > MAX_EXPORT_DEPTH {
            return Err(ScriptError::Runtime(format!(
                "Value nesting exceeds {} levels",
                MAX_EXPORT_DEPTH
            )));
        }

        let exported = match value {
            ScriptValue::Null => Value::Null,
            ScriptValue::Boolean(b) => Value::Boolean(*b),
            ScriptValue::Number(n) => Value::Number(*n),
            ScriptValue::String(s) => Value::String(s.clone()),
            ScriptValue::Array(items) => {
                let items = items.borrow().clone();
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.push(self.export_value(item, issued, depth + 1)?);
                }
                Value::Array(out)
            }
            ScriptValue::Record(fields) => {
                let fields = fields.borrow().clone();
                let mut out = BTreeMap::new();
                for (key, field) in &fields {
                    out.insert(key.clone(), self.export_value(field, issued, depth + 1)?);
                }
                Value::Record(out)
            }
            ScriptValue::Function(_) | ScriptValue::Builtin(_) => {
                let id = self.issue_callback(value.clone());
                issued.push(id);
                Value::Callback(id)
            }
        };
        Ok(exported)
    }

    /// Import a value from the native side. A callback id still pending
    /// resolves back to its function; a retired one reads as `null`.
    pub fn import_value(&self, value: &Value) -> ScriptValue {
        match value {
            Value::Null => ScriptValue::Null,
            Value::Boolean(b) => ScriptValue::Boolean(*b),
            Value::Number(n) => ScriptValue::Number(*n),
            Value::String(s) => ScriptValue::String(s.clone()),
            Value::Array(items) => {
                ScriptValue::array(items.iter().map(|item| self.import_value(item)).collect())
            }
            Value::Record(fields) => ScriptValue::record(
                fields
                    .iter()
                    .map(|(key, field)| (key.clone(), self.import_value(field)))
                    .collect(),
            ),
            Value::Callback(id) => self
                .callbacks
                .get(&id.0)
                .map(|pending| pending.function.clone())
                .unwrap_or_default(),
        }
    }
}

/// Copy a script value out for the native side without registering
/// callbacks; functions read as `null`.
pub fn snapshot(value: &ScriptValue) -> Value {
    snapshot_at(value, 0)
}

fn snapshot_at(value: &ScriptValue, depth: usize) -> Value {
    if depth > MAX_EXPORT_DEPTH {
        log::warn!("value truncated at nesting depth {}", MAX_EXPORT_DEPTH);
        return Value::Null;
    }
    match value {
        ScriptValue::Null | ScriptValue::Function(_) | ScriptValue::Builtin(_) => Value::Null,
        ScriptValue::Boolean(b) => Value::Boolean(*b),
        ScriptValue::Number(n) => Value::Number(*n),
        ScriptValue::String(s) => Value::String(s.clone()),
        ScriptValue::Array(items) => Value::Array(
            items
                .borrow()
                .iter()
                .map(|item| snapshot_at(item, depth + 1))
                .collect(),
        ),
        ScriptValue::Record(fields) => Value::Record(
            fields
                .borrow()
                .iter()
                .map(|(key, field)| (key.clone(), snapshot_at(field, depth + 1)))
                .collect(),
        ),
    }
}
