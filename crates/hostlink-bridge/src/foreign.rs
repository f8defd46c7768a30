//! Foreign modules
//!
//! Adapts an object whose implementation lives behind another object model
//! into an ordinary module. Its method table is read from the live object,
//! so the registry instantiates it when the table is first needed.

use crate::error::{BridgeError, ModuleError};
use crate::method::{Arity, Invocation, MethodDescriptor, MethodKind};
use crate::module::{MethodSource, ModuleClass, NativeModule, QueuePolicy};
use hostlink_types::{Constants, Value};
use std::sync::Arc;

/// Capability surface of a foreign object.
pub trait ForeignObject: Send + Sync {
    fn constants(&self) -> Constants {
        Constants::new()
    }

    /// Callable methods, in the order the script side will index them
    fn method_names(&self) -> Vec<String>;

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, ModuleError>;
}

struct ForeignModule {
    object: Box<dyn ForeignObject>,
}

impl NativeModule for ForeignModule {
    fn constants_to_export(&self) -> Result<Constants, ModuleError> {
        Ok(self.object.constants())
    }
}

impl ModuleClass {
    /// Module class for a foreign object built by `factory`.
    pub fn foreign<F>(name: impl Into<String>, factory: F) -> ModuleClass
    where
        F: Fn() -> Result<Box<dyn ForeignObject>, ModuleError> + Send + Sync + 'static,
    {
        let name = name.into();
        let module_name = name.clone();
        ModuleClass {
            type_name: std::any::type_name::<ForeignModule>(),
            name,
            factory: Arc::new(move || {
                factory().map(|object| Arc::new(ForeignModule { object }) as Arc<dyn NativeModule>)
            }),
            methods: MethodSource::FromInstance(Arc::new(move |module: &dyn NativeModule| {
                introspect(&module_name, module)
            })),
            requires_main_queue_setup: false,
            has_constants_to_export: true,
            implements_batch_did_complete: false,
            implements_partial_batch_did_flush: false,
            queue_policy: QueuePolicy::Shared,
        }
    }
}

fn as_foreign(module: &dyn NativeModule) -> Option<&ForeignModule> {
    module.as_any().downcast_ref::<ForeignModule>()
}

fn introspect(
    module_name: &str,
    module: &dyn NativeModule,
) -> Result<Vec<MethodDescriptor>, BridgeError> {
    let introspection_error = |reason: String| BridgeError::ModuleIntrospection {
        module: module_name.to_string(),
        reason,
    };
    let foreign = as_foreign(module)
        .ok_or_else(|| introspection_error("instance is not a foreign object".to_string()))?;

    foreign
        .object
        .method_names()
        .into_iter()
        .map(|name| {
            let method = name.clone();
            MethodDescriptor::new(
                name,
                Arity::AtLeast(0),
                MethodKind::Async,
                Arc::new(move |module: &dyn NativeModule, call: &mut Invocation| {
                    let foreign = as_foreign(module)
                        .ok_or_else(|| ModuleError::failed("instance is not a foreign object"))?;
                    foreign.object.call(&method, call.args())
                }),
            )
            .map_err(|err| introspection_error(err.to_string()))
        })
        .collect()
}
