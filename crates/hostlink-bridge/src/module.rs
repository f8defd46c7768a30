//! Module authoring surface
//!
//! A native module is any `NativeModule` type. Its callable surface is
//! declared once through a [`ModuleClass`], which the registry turns into a
//! module descriptor.

use crate::error::{BridgeError, ModuleError};
use crate::method::{Arity, Invocation, MethodDescriptor, MethodFn, MethodKind};
use crate::queue::ExecutionQueue;
use hostlink_types::{Constants, Value};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Upcast to `Any`, implemented for every sized `'static` type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Behavior shared by all native modules. Every hook has a default; a module
/// only overrides the ones its class declares.
pub trait NativeModule: AsAny + Send + Sync {
    /// Constants handed to the script side; called at most once
    fn constants_to_export(&self) -> Result<Constants, ModuleError> {
        Ok(Constants::new())
    }

    /// Queue the module's methods must run on, overriding the class policy
    fn method_queue(&self) -> Option<ExecutionQueue> {
        None
    }

    fn batch_did_complete(&self) {}

    fn partial_batch_did_flush(&self) {}

    /// Teardown; runs on the method queue
    fn invalidate(&self) {}
}

/// Where a module's methods run when the instance does not pick a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// The registry's shared background queue
    #[default]
    Shared,
    /// A serial queue of its own, named `hostlink.<Name>Queue`
    Dedicated,
    /// The privileged main queue
    Main,
}

pub(crate) type ModuleFactory =
    Arc<dyn Fn() -> Result<Arc<dyn NativeModule>, ModuleError> + Send + Sync>;

pub(crate) type MethodIntrospector =
    Arc<dyn Fn(&dyn NativeModule) -> Result<Vec<MethodDescriptor>, BridgeError> + Send + Sync>;

pub(crate) enum MethodSource {
    /// Table declared when the class was built
    Declared(Vec<MethodDescriptor>),
    /// Table read from a live instance
    FromInstance(MethodIntrospector),
}

/// Registration-time description of a module type.
pub struct ModuleClass {
    pub(crate) type_name: &'static str,
    pub(crate) name: String,
    pub(crate) factory: ModuleFactory,
    pub(crate) methods: MethodSource,
    pub(crate) requires_main_queue_setup: bool,
    pub(crate) has_constants_to_export: bool,
    pub(crate) implements_batch_did_complete: bool,
    pub(crate) implements_partial_batch_did_flush: bool,
    pub(crate) queue_policy: QueuePolicy,
}

impl ModuleClass {
    /// Start describing module type `M`, built by `factory` on first use.
    pub fn builder<M, F>(factory: F) -> ModuleClassBuilder<M>
    where
        M: NativeModule + 'static,
        F: Fn() -> Result<M, ModuleError> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<M>();
        ModuleClassBuilder {
            class: ModuleClass {
                type_name,
                name: default_module_name(type_name),
                factory: Arc::new(move || {
                    factory().map(|module| Arc::new(module) as Arc<dyn NativeModule>)
                }),
                methods: MethodSource::Declared(Vec::new()),
                requires_main_queue_setup: false,
                has_constants_to_export: false,
                implements_batch_did_complete: false,
                implements_partial_batch_did_flush: false,
                queue_policy: QueuePolicy::Shared,
            },
            methods: Vec::new(),
            _module: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for ModuleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleClass")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("queue_policy", &self.queue_policy)
            .finish_non_exhaustive()
    }
}

pub struct ModuleClassBuilder<M> {
    class: ModuleClass,
    methods: Vec<Result<MethodDescriptor, BridgeError>>,
    _module: PhantomData<fn() -> M>,
}

impl<M: NativeModule + 'static> ModuleClassBuilder<M> {
    /// Override the name derived from the type
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.class.name = name.into();
        self
    }

    pub fn method<F>(self, name: &str, arity: Arity, f: F) -> Self
    where
        F: Fn(&M, &mut Invocation) -> Result<Value, ModuleError> + Send + Sync + 'static,
    {
        self.add_method(name, arity, MethodKind::Async, f)
    }

    pub fn sync_method<F>(self, name: &str, arity: Arity, f: F) -> Self
    where
        F: Fn(&M, &mut Invocation) -> Result<Value, ModuleError> + Send + Sync + 'static,
    {
        self.add_method(name, arity, MethodKind::Sync, f)
    }

    fn add_method<F>(mut self, name: &str, arity: Arity, kind: MethodKind, f: F) -> Self
    where
        F: Fn(&M, &mut Invocation) -> Result<Value, ModuleError> + Send + Sync + 'static,
    {
        let callable: MethodFn = Arc::new(move |module: &dyn NativeModule, call: &mut Invocation| {
            let module = module.as_any().downcast_ref::<M>().ok_or_else(|| {
                ModuleError::failed(format!(
                    "instance is not a {}",
                    std::any::type_name::<M>()
                ))
            })?;
            f(module, call)
        });
        self.methods
            .push(MethodDescriptor::new(name, arity, kind, callable));
        self
    }

    /// Instance creation, constant export and teardown hooks run on the
    /// privileged main queue.
    pub fn requires_main_queue_setup(mut self) -> Self {
        self.class.requires_main_queue_setup = true;
        self
    }

    pub fn exports_constants(mut self) -> Self {
        self.class.has_constants_to_export = true;
        self
    }

    pub fn batch_did_complete(mut self) -> Self {
        self.class.implements_batch_did_complete = true;
        self
    }

    pub fn partial_batch_did_flush(mut self) -> Self {
        self.class.implements_partial_batch_did_flush = true;
        self
    }

    pub fn queue(mut self, policy: QueuePolicy) -> Self {
        self.class.queue_policy = policy;
        self
    }

    /// Fails with the first `InvalidSignature` among the declared methods.
    pub fn build(self) -> Result<ModuleClass, BridgeError> {
        let methods = self.methods.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(ModuleClass {
            methods: MethodSource::Declared(methods),
            ..self.class
        })
    }
}

/// Module name for a type path: last segment, generics dropped, a trailing
/// `Module` removed.
pub fn default_module_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let last = base.rsplit("::").next().unwrap_or(base);
    match last.strip_suffix("Module") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => last.to_string(),
    }
}
