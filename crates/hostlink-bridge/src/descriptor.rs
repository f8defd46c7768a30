//! Module Descriptor
//!
//! Bookkeeping for one registered module: lazy single instantiation,
//! memoized method table, constants and method queue, and the config entry
//! handed to the script side.

use crate::error::{panic_message, BridgeError};
use crate::method::MethodDescriptor;
use crate::module::{MethodSource, ModuleClass, ModuleFactory, NativeModule, QueuePolicy};
use crate::queue::{ExecutionQueue, RegistryQueues};
use hostlink_types::sync::{Arc, Condvar, Mutex};
use hostlink_types::{Constants, Value};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};

// ============================================================================
// Instance cell
// ============================================================================

enum InstanceState {
    Uninitialized,
    /// Factory running on the given thread
    Initializing(ThreadId),
    Ready(Arc<dyn NativeModule>),
    Failed(BridgeError),
}

/// Single-construction cell. Concurrent first callers wait on the condvar
/// for the one thread that runs the factory.
struct InstanceCell {
    state: Mutex<InstanceState>,
    settled: Condvar,
}

impl InstanceCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(InstanceState::Uninitialized),
            settled: Condvar::new(),
        }
    }

    fn ready(&self) -> Option<Arc<dyn NativeModule>> {
        match &*self.state.lock() {
            InstanceState::Ready(instance) => Some(instance.clone()),
            _ => None,
        }
    }

    fn get_or_create(
        &self,
        module: &str,
        factory: &ModuleFactory,
    ) -> Result<Arc<dyn NativeModule>, BridgeError> {
        let current = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match &*state {
                InstanceState::Ready(instance) => return Ok(instance.clone()),
                InstanceState::Failed(err) => return Err(err.clone()),
                InstanceState::Initializing(owner) if *owner == current => {
                    return Err(BridgeError::ModuleInitialization {
                        module: module.to_string(),
                        reason: "instance requested while its factory is running".to_string(),
                    })
                }
                InstanceState::Initializing(_) => {}
                InstanceState::Uninitialized => break,
            }
            self.settled.wait(&mut state);
        }
        *state = InstanceState::Initializing(current);
        drop(state);

        log::debug!("Instantiating module '{}'", module);
        let result = match panic::catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(err)) => Err(BridgeError::ModuleInitialization {
                module: module.to_string(),
                reason: err.to_string(),
            }),
            Err(payload) => Err(BridgeError::ModuleInitialization {
                module: module.to_string(),
                reason: format!("factory panicked: {}", panic_message(&*payload)),
            }),
        };
        if let Err(err) = &result {
            log::error!("{}", err);
        }

        *self.state.lock() = match &result {
            Ok(instance) => InstanceState::Ready(instance.clone()),
            Err(err) => InstanceState::Failed(err.clone()),
        };
        self.settled.notify_all();
        result
    }
}

// ============================================================================
// Config entry
// ============================================================================

/// One entry of the script config table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleConfig {
    #[serde(rename = "moduleIndex")]
    pub index: usize,
    #[serde(rename = "moduleName")]
    pub name: String,
    pub constants: Option<Constants>,
    pub methods: Vec<String>,
    /// Positions in `methods` of the synchronous methods
    #[serde(rename = "syncMethods")]
    pub sync_methods: Vec<usize>,
}

impl ModuleConfig {
    /// Entry of a module whose surface could not be determined. It keeps its
    /// index so the indices of later modules stay valid.
    pub fn placeholder(index: usize, name: &str) -> Self {
        Self {
            index,
            name: name.to_string(),
            constants: None,
            methods: Vec::new(),
            sync_methods: Vec::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut fields = BTreeMap::new();
        fields.insert("moduleIndex".to_string(), Value::from(self.index));
        fields.insert("moduleName".to_string(), Value::from(self.name.as_str()));
        fields.insert(
            "constants".to_string(),
            self.constants.clone().map(Value::Record).unwrap_or(Value::Null),
        );
        fields.insert(
            "methods".to_string(),
            Value::Array(self.methods.iter().map(|m| Value::from(m.as_str())).collect()),
        );
        fields.insert(
            "syncMethods".to_string(),
            Value::Array(self.sync_methods.iter().map(|&i| Value::from(i)).collect()),
        );
        Value::Record(fields)
    }
}

// ============================================================================
// Descriptor
// ============================================================================

pub struct ModuleDescriptor {
    index: usize,
    class: ModuleClass,
    queues: RegistryQueues,
    instance: Arc<InstanceCell>,
    methods: OnceCell<Result<Arc<[MethodDescriptor]>, BridgeError>>,
    constants: Arc<OnceCell<Result<Constants, BridgeError>>>,
    method_queue: OnceCell<Result<ExecutionQueue, BridgeError>>,
}

impl ModuleDescriptor {
    pub(crate) fn new(index: usize, class: ModuleClass, queues: RegistryQueues) -> Self {
        Self {
            index,
            class,
            queues,
            instance: Arc::new(InstanceCell::new()),
            methods: OnceCell::new(),
            constants: Arc::new(OnceCell::new()),
            method_queue: OnceCell::new(),
        }
    }

    /// Stable registry index
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.class.name
    }

    pub fn type_name(&self) -> &'static str {
        self.class.type_name
    }

    pub fn requires_main_queue_setup(&self) -> bool {
        self.class.requires_main_queue_setup
    }

    pub fn has_constants_to_export(&self) -> bool {
        self.class.has_constants_to_export
    }

    pub fn implements_batch_did_complete(&self) -> bool {
        self.class.implements_batch_did_complete
    }

    pub fn implements_partial_batch_did_flush(&self) -> bool {
        self.class.implements_partial_batch_did_flush
    }

    pub fn has_instance(&self) -> bool {
        self.instance.ready().is_some()
    }

    /// The module instance, created on first access.
    ///
    /// Modules that require main-queue setup are created on the main queue;
    /// a caller on another thread blocks until creation finishes.
    pub fn instance(&self) -> Result<Arc<dyn NativeModule>, BridgeError> {
        if let Some(instance) = self.instance.ready() {
            return Ok(instance);
        }
        match self.setup_queue()? {
            Some(main) if !main.is_on_queue() => {
                let cell = self.instance.clone();
                let factory = self.class.factory.clone();
                let name = self.class.name.clone();
                main.call_sync(move || cell.get_or_create(&name, &factory))?
            }
            _ => self.instance.get_or_create(&self.class.name, &self.class.factory),
        }
    }

    /// Ordered method table, computed once.
    pub fn methods(&self) -> Result<Arc<[MethodDescriptor]>, BridgeError> {
        self.methods
            .get_or_init(|| self.introspect_methods())
            .clone()
    }

    fn introspect_methods(&self) -> Result<Arc<[MethodDescriptor]>, BridgeError> {
        let methods = match &self.class.methods {
            MethodSource::Declared(methods) => methods.clone(),
            MethodSource::FromInstance(introspect) => {
                let instance = self.instance()?;
                introspect(&*instance)?
            }
        };

        let mut seen = HashSet::new();
        for method in &methods {
            if !seen.insert(method.name()) {
                let err = BridgeError::ModuleIntrospection {
                    module: self.class.name.clone(),
                    reason: format!("method '{}' is declared twice", method.name()),
                };
                log::error!("{}", err);
                return Err(err);
            }
        }
        Ok(methods.into())
    }

    /// Export the module's constants, at most once.
    ///
    /// Returns `None` for modules that export nothing; those are never
    /// instantiated here.
    pub fn gather_constants(&self) -> Result<Option<Constants>, BridgeError> {
        if !self.class.has_constants_to_export {
            return Ok(None);
        }
        if let Some(result) = self.constants.get() {
            return result.clone().map(Some);
        }

        let instance = self.instance()?;
        let cell = self.constants.clone();
        let module = self.class.name.clone();
        let export = move || {
            cell.get_or_init(|| export_constants(&module, &*instance))
                .clone()
        };
        let result = match self.setup_queue()? {
            Some(main) if !main.is_on_queue() => main.call_sync(export)?,
            _ => export(),
        };
        result.map(Some)
    }

    /// Constants already gathered, if any. Never forces instantiation.
    pub fn constants(&self) -> Option<Constants> {
        match self.constants.get() {
            Some(Ok(constants)) => Some(constants.clone()),
            _ => None,
        }
    }

    /// Queue the module's methods run on, chosen once. Forces instantiation.
    pub fn method_queue(&self) -> Result<ExecutionQueue, BridgeError> {
        self.method_queue
            .get_or_init(|| self.select_queue())
            .clone()
    }

    fn select_queue(&self) -> Result<ExecutionQueue, BridgeError> {
        let instance = self.instance()?;
        if let Some(queue) = instance.method_queue() {
            return Ok(queue);
        }
        match self.class.queue_policy {
            QueuePolicy::Shared => Ok(self.queues.shared.clone()),
            QueuePolicy::Dedicated => {
                ExecutionQueue::new(format!("hostlink.{}Queue", self.class.name))
            }
            QueuePolicy::Main => self.main_queue().cloned(),
        }
    }

    /// Script config entry. Constants appear only once gathered.
    pub fn config(&self) -> Result<ModuleConfig, BridgeError> {
        let methods = self.methods()?;
        Ok(ModuleConfig {
            index: self.index,
            name: self.class.name.clone(),
            constants: self.constants(),
            methods: methods.iter().map(|m| m.name().to_string()).collect(),
            sync_methods: methods
                .iter()
                .enumerate()
                .filter(|(_, m)| m.is_sync())
                .map(|(i, _)| i)
                .collect(),
        })
    }

    pub fn notify_batch_did_complete(&self) -> Result<(), BridgeError> {
        if !self.class.implements_batch_did_complete {
            return Ok(());
        }
        self.run_hook(|module| module.batch_did_complete())
    }

    pub fn notify_partial_batch_did_flush(&self) -> Result<(), BridgeError> {
        if !self.class.implements_partial_batch_did_flush {
            return Ok(());
        }
        self.run_hook(|module| module.partial_batch_did_flush())
    }

    /// Tear down an existing instance on its method queue.
    pub fn invalidate(&self) -> Result<(), BridgeError> {
        let Some(instance) = self.instance.ready() else {
            return Ok(());
        };
        let queue = self.method_queue()?;
        queue.call_sync(move || instance.invalidate())?;

        let owns_queue = self.class.queue_policy == QueuePolicy::Dedicated
            && self.instance.ready().and_then(|i| i.method_queue()).is_none();
        if owns_queue {
            queue.quit_synchronous();
        }
        log::debug!("Invalidated module '{}'", self.class.name);
        Ok(())
    }

    fn run_hook<F>(&self, hook: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&dyn NativeModule) + Send + 'static,
    {
        let Some(instance) = self.instance.ready() else {
            return Ok(());
        };
        self.method_queue()?.call_sync(move || hook(&*instance))
    }

    fn main_queue(&self) -> Result<&ExecutionQueue, BridgeError> {
        self.queues.main.as_ref().ok_or_else(|| {
            BridgeError::InvalidExecutionContext(format!(
                "module '{}' needs the main queue but none is available",
                self.class.name
            ))
        })
    }

    /// Main queue for modules that require main-queue setup.
    fn setup_queue(&self) -> Result<Option<&ExecutionQueue>, BridgeError> {
        if !self.class.requires_main_queue_setup {
            return Ok(None);
        }
        self.main_queue().map(Some)
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("index", &self.index)
            .field("name", &self.class.name)
            .field("has_instance", &self.has_instance())
            .finish_non_exhaustive()
    }
}

fn export_constants(module: &str, instance: &dyn NativeModule) -> Result<Constants, BridgeError> {
    let introspection_error = |reason: String| BridgeError::ModuleIntrospection {
        module: module.to_string(),
        reason,
    };
    let result = match panic::catch_unwind(AssertUnwindSafe(|| instance.constants_to_export())) {
        Ok(Ok(constants)) => Ok(constants),
        Ok(Err(err)) => Err(introspection_error(err.to_string())),
        Err(payload) => Err(introspection_error(format!(
            "constant export panicked: {}",
            panic_message(&*payload)
        ))),
    };
    match &result {
        Ok(constants) => log::debug!("Module '{}' exported {} constants", module, constants.len()),
        Err(err) => log::error!("{}", err),
    }
    result
}
