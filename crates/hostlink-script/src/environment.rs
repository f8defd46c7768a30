use crate::error::ScriptError;
use crate::value::ScriptValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

struct Binding {
    value: ScriptValue,
    mutable: bool,
}

/// Lexical scope; lookups walk the parent chain.
#[derive(Default)]
pub struct Environment {
    bindings: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Environment>>,
}

impl Environment {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn child(parent: &Rc<Environment>) -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Declare in this scope, shadowing any outer binding of the same name.
    pub fn declare(&self, name: &str, value: ScriptValue, mutable: bool) {
        self.bindings
            .borrow_mut()
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub fn get(&self, name: &str) -> Option<ScriptValue> {
        if let Some(binding) = self.bindings.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Update the nearest binding of `name`; only `mut` bindings can change.
    pub fn assign(&self, name: &str, value: ScriptValue) -> Result<(), ScriptError> {
        if let Some(binding) = self.bindings.borrow_mut().get_mut(name) {
            if !binding.mutable {
                return Err(ScriptError::ImmutableBinding(name.to_string()));
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(ScriptError::UndefinedVariable(name.to_string())),
        }
    }
}
