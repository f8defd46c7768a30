//! Call records exchanged between the script context and native modules.
//!
//! On the wire a batch is an array of `[moduleIndex, methodIndex, [args...]]`
//! triples. Indices refer to the script config the script side was
//! initialized with.

use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum WireError {
    /// The batch container is not an array
    NotABatch(&'static str),
    /// A record does not have the `[module, method, args]` shape
    MalformedRecord { position: usize, reason: String },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::NotABatch(got) => write!(f, "Expected a call batch array, got {}", got),
            WireError::MalformedRecord { position, reason } => {
                write!(f, "Malformed call record at position {}: {}", position, reason)
            }
        }
    }
}

impl std::error::Error for WireError {}

/// One cross-boundary call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub module_index: usize,
    pub method_index: usize,
    pub args: Vec<Value>,
}

impl CallRecord {
    pub fn new(module_index: usize, method_index: usize, args: Vec<Value>) -> Self {
        Self {
            module_index,
            method_index,
            args,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::from(self.module_index),
            Value::from(self.method_index),
            Value::Array(self.args.clone()),
        ])
    }

    pub fn from_value(value: &Value, position: usize) -> Result<Self, WireError> {
        let malformed = |reason: &str| WireError::MalformedRecord {
            position,
            reason: reason.to_string(),
        };

        let parts = value
            .as_array()
            .ok_or_else(|| malformed("record is not an array"))?;
        if parts.len() != 3 {
            return Err(malformed("record must have exactly three elements"));
        }

        let module_index = parts[0]
            .as_index()
            .ok_or_else(|| malformed("module index is not a non-negative integer"))?;
        let method_index = parts[1]
            .as_index()
            .ok_or_else(|| malformed("method index is not a non-negative integer"))?;
        let args = parts[2]
            .as_array()
            .ok_or_else(|| malformed("arguments are not an array"))?
            .to_vec();

        Ok(Self {
            module_index,
            method_index,
            args,
        })
    }
}

/// Ordered sequence of call records delivered as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallBatch {
    records: Vec<CallRecord>,
}

impl CallBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: CallRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.records.iter().map(CallRecord::to_value).collect())
    }

    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let items = value
            .as_array()
            .ok_or_else(|| WireError::NotABatch(value.type_name()))?;
        let records = items
            .iter()
            .enumerate()
            .map(|(position, item)| CallRecord::from_value(item, position))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }
}

impl From<Vec<CallRecord>> for CallBatch {
    fn from(records: Vec<CallRecord>) -> Self {
        Self { records }
    }
}

impl IntoIterator for CallBatch {
    type Item = CallRecord;
    type IntoIter = std::vec::IntoIter<CallRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
