//! Batch Dispatcher
//!
//! Drives call batches in both directions. Every batch runs on the script
//! queue: flushes requested by native callers, partial flushes requested by
//! the script and callback deliveries are all serialized there. Records are
//! executed on their module's method queue.

use crate::adapter::{ScriptAdapter, ScriptRuntime};
use crate::callback::CallbackSink;
use crate::descriptor::ModuleDescriptor;
use crate::error::{panic_message, BridgeError};
use crate::method::Invocation;
use crate::module::ModuleClass;
use crate::registry::ModuleRegistry;
use hostlink_types::sync::{Arc, Mutex, RwLock, Weak};
use hostlink_types::{hooks, CallBatch, CallRecord, CallbackId, NativeHook, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Log target of messages coming from script code
pub const SCRIPT_LOG_TARGET: &str = "hostlink::script";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    /// Calls in either direction are waiting for a flush
    Collecting,
    Flushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushKind {
    /// Sub-batch handed over by the script before its cycle ended
    Partial,
    Full,
}

/// Per-record outcomes of a full flush toward native modules, including the
/// records of the partial flushes that preceded it in the same cycle.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<Result<Value, BridgeError>>,
    pub partial_flushes: usize,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(Result::is_ok)
    }

    pub fn errors(&self) -> impl Iterator<Item = &BridgeError> {
        self.outcomes.iter().filter_map(|outcome| outcome.as_ref().err())
    }
}

/// Result of one native-to-script cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// One result per delivered script call, in order
    pub script: Vec<Result<Value, BridgeError>>,
    /// The script-to-native batch those calls produced
    pub native: BatchReport,
}

struct PendingCall {
    module: String,
    method: String,
    args: Vec<Value>,
}

#[derive(Default)]
struct Observers {
    batch_complete: Vec<Arc<ModuleDescriptor>>,
    partial_flush: Vec<Arc<ModuleDescriptor>>,
}

impl Observers {
    fn add(&mut self, descriptor: &Arc<ModuleDescriptor>) {
        if descriptor.implements_batch_did_complete() {
            self.batch_complete.push(descriptor.clone());
        }
        if descriptor.implements_partial_batch_did_flush() {
            self.partial_flush.push(descriptor.clone());
        }
    }
}

struct DispatcherInner {
    registry: Arc<ModuleRegistry>,
    adapter: ScriptAdapter,
    observers: RwLock<Observers>,
    pending: Mutex<Vec<PendingCall>>,
    /// Outcomes of partial flushes not yet folded into a full report
    partial: Mutex<BatchReport>,
    flush_depth: AtomicUsize,
    /// Callback deliveries posted but not yet finished
    in_flight: AtomicUsize,
    /// Finished callback deliveries
    deliveries: AtomicU64,
}

pub struct BatchDispatcher {
    inner: Arc<DispatcherInner>,
}

impl BatchDispatcher {
    /// Build the observer lists from the modules registered so far and
    /// install the bridge hooks into the script context.
    pub fn new(registry: Arc<ModuleRegistry>, adapter: ScriptAdapter) -> Result<Self, BridgeError> {
        let mut observers = Observers::default();
        for descriptor in registry.descriptors() {
            observers.add(&descriptor);
        }

        let inner = Arc::new(DispatcherInner {
            registry,
            adapter,
            observers: RwLock::new(observers),
            pending: Mutex::new(Vec::new()),
            partial: Mutex::new(BatchReport::default()),
            flush_depth: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            deliveries: AtomicU64::new(0),
        });
        install_hooks(&inner)?;
        Ok(Self { inner })
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.inner.registry
    }

    pub fn adapter(&self) -> &ScriptAdapter {
        &self.inner.adapter
    }

    /// Register a module and subscribe it to the notifications it declares.
    pub fn register_module(&self, class: ModuleClass) -> Result<usize, BridgeError> {
        let index = self.inner.registry.register(class)?;
        let descriptor = self.inner.registry.resolve_index(index)?;
        self.inner.observers.write().add(&descriptor);
        Ok(index)
    }

    /// Hand the script config to the script context, load `source` and flush
    /// the calls its initial execution queued.
    pub fn start(&self, source: &[u8], origin: &str) -> Result<BatchReport, BridgeError> {
        let config = self.inner.registry.build_script_config();
        self.inner
            .adapter
            .current_context()
            .define_global(hooks::CONFIG_GLOBAL, config.to_value())?;

        // Loading and the flush after it form one cycle
        self.reset_cycle();
        if let Err(err) = self.inner.adapter.load_source(source, origin) {
            self.reset_cycle();
            return Err(err);
        }
        let inner = self.inner.clone();
        self.on_loaded_script(move |runtime| {
            let batch = runtime.engine().take_queued_calls();
            inner.flush_full(batch)
        })
    }

    pub fn state(&self) -> DispatchState {
        if self.inner.flush_depth.load(Ordering::SeqCst) > 0 {
            DispatchState::Flushing
        } else if !self.inner.pending.lock().is_empty()
            || self.inner.adapter.queued_native_calls() > 0
        {
            DispatchState::Collecting
        } else {
            DispatchState::Idle
        }
    }

    /// Queue a native-to-script call for the next cycle.
    pub fn enqueue_script_call(&self, module: &str, method: &str, args: Vec<Value>) {
        self.inner.pending.lock().push(PendingCall {
            module: module.to_string(),
            method: method.to_string(),
            args,
        });
    }

    /// Deliver the queued native-to-script calls in order, then flush the
    /// script-to-native calls they produced.
    pub fn flush_script_calls(&self) -> Result<CycleReport, BridgeError> {
        let calls = std::mem::take(&mut *self.inner.pending.lock());
        let inner = self.inner.clone();
        self.on_loaded_script(move |runtime| {
            inner.begin_cycle();
            let script = {
                let _flushing = FlushGuard::enter(&inner.flush_depth);
                calls
                    .into_iter()
                    .map(|call| runtime.call_function(&call.module, &call.method, &call.args))
                    .collect()
            };
            let batch = runtime.engine().take_queued_calls();
            let native = inner.flush_full(batch);
            CycleReport { script, native }
        })
    }

    /// Single call through a full cycle.
    pub fn call_function(
        &self,
        module: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<CycleReport, BridgeError> {
        self.enqueue_script_call(module, method, args);
        self.flush_script_calls()
    }

    /// Flush whatever the script side has queued for native modules.
    pub fn flush_queued_native(&self) -> Result<BatchReport, BridgeError> {
        let inner = self.inner.clone();
        self.on_loaded_script(move |runtime| {
            inner.begin_cycle();
            let batch = runtime.engine().take_queued_calls();
            inner.flush_full(batch)
        })
    }

    /// Execute an explicit script-to-native batch as a full flush.
    pub fn flush_native_batch(&self, batch: CallBatch) -> Result<BatchReport, BridgeError> {
        let inner = self.inner.clone();
        self.on_loaded_script(move |_| {
            inner.begin_cycle();
            inner.flush_full(batch)
        })
    }

    /// Block until posted callback deliveries, and the batches they caused,
    /// have drained. Work a module runs on threads of its own is not tracked.
    pub fn wait_for_idle(&self) -> Result<(), BridgeError> {
        loop {
            let finished = self.inner.deliveries.load(Ordering::SeqCst);
            self.inner.adapter.run_blocking(|_| ())?;
            for descriptor in self.inner.registry.descriptors() {
                if descriptor.has_instance() {
                    if let Ok(queue) = descriptor.method_queue() {
                        queue.call_sync(|| ())?;
                    }
                }
            }
            self.inner.adapter.run_blocking(|_| ())?;

            let settled = self.inner.in_flight.load(Ordering::SeqCst) == 0
                && self.inner.deliveries.load(Ordering::SeqCst) == finished;
            if settled {
                return Ok(());
            }
        }
    }

    /// Invalidate the modules and stop the script queue.
    pub fn shutdown(&self) {
        log::debug!("Shutting down bridge");
        self.inner.registry.invalidate();
        self.inner.adapter.shutdown();
    }

    /// Drop partial-flush outcomes not claimed by a cycle, in queue order.
    fn reset_cycle(&self) {
        let inner = self.inner.clone();
        if let Err(err) = self.inner.adapter.run_blocking(move |_| inner.begin_cycle()) {
            log::debug!("Could not reset the flush cycle: {}", err);
        }
    }

    /// Run `f` on the script queue if a script is loaded. An unloaded or
    /// unreachable script context loses the batch.
    fn on_loaded_script<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&mut ScriptRuntime) -> R + Send + 'static,
        R: Send + 'static,
    {
        let outcome = self
            .inner
            .adapter
            .run_blocking(move |runtime| {
                if runtime.is_loaded() {
                    Ok(f(runtime))
                } else {
                    Err(BridgeError::BatchDelivery("no script is loaded".to_string()))
                }
            })
            .map_err(|err| BridgeError::BatchDelivery(err.to_string()))?;
        if let Err(err) = &outcome {
            log::error!("{}", err);
        }
        outcome
    }
}

impl std::fmt::Debug for BatchDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDispatcher")
            .field("state", &self.state())
            .field("modules", &self.inner.registry.len())
            .finish()
    }
}

// ============================================================================
// Batch execution (script queue only)
// ============================================================================

struct FlushGuard<'a>(&'a AtomicUsize);

impl<'a> FlushGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self(depth)
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Names used in a record error; `#n` until the index resolves.
struct CallTarget {
    module: String,
    method: String,
}

impl DispatcherInner {
    /// Start a cycle. Partial flushes from work that never reached a full
    /// flush, such as a failed load or a bare `invoke`, are discarded.
    fn begin_cycle(&self) {
        let stale = std::mem::take(&mut *self.partial.lock());
        if stale.partial_flushes > 0 {
            log::debug!(
                "Discarding {} outcomes of {} partial flushes outside a cycle",
                stale.len(),
                stale.partial_flushes
            );
        }
    }

    fn flush_full(self: &Arc<Self>, batch: CallBatch) -> BatchReport {
        let mut report = std::mem::take(&mut *self.partial.lock());
        let outcomes = self.run_records(batch, report.len());
        report.outcomes.extend(outcomes);

        if !report.is_empty() {
            self.notify_observers(FlushKind::Full);
        }
        report
    }

    fn flush_partial(self: &Arc<Self>, batch: CallBatch) {
        let offset = self.partial.lock().len();
        let outcomes = self.run_records(batch, offset);
        {
            let mut partial = self.partial.lock();
            partial.outcomes.extend(outcomes);
            partial.partial_flushes += 1;
        }
        self.notify_observers(FlushKind::Partial);
    }

    /// Execute `batch`; record positions start at `offset` within the cycle.
    fn run_records(
        self: &Arc<Self>,
        batch: CallBatch,
        offset: usize,
    ) -> Vec<Result<Value, BridgeError>> {
        let _flushing = FlushGuard::enter(&self.flush_depth);
        let sink: Arc<dyn CallbackSink> = Arc::new(DispatcherSink(Arc::downgrade(self)));

        batch
            .into_iter()
            .enumerate()
            .map(|(position, record)| {
                let outcome = self.execute_record(offset + position, record, &sink);
                if let Err(err) = &outcome {
                    log::warn!("{}", err);
                }
                outcome
            })
            .collect()
    }

    fn execute_record(
        &self,
        position: usize,
        record: CallRecord,
        sink: &Arc<dyn CallbackSink>,
    ) -> Result<Value, BridgeError> {
        let mut target = CallTarget {
            module: format!("#{}", record.module_index),
            method: format!("#{}", record.method_index),
        };
        self.run_record(record, sink, &mut target)
            .map_err(|reason| BridgeError::RecordExecution {
                index: position,
                module: target.module,
                method: target.method,
                reason,
            })
    }

    fn run_record(
        &self,
        record: CallRecord,
        sink: &Arc<dyn CallbackSink>,
        target: &mut CallTarget,
    ) -> Result<Value, String> {
        let descriptor = self
            .registry
            .resolve_index(record.module_index)
            .map_err(|e| e.to_string())?;
        target.module = descriptor.name().to_string();

        let methods = descriptor.methods().map_err(|e| e.to_string())?;
        let method = methods
            .get(record.method_index)
            .cloned()
            .ok_or_else(|| format!("module has no method at index {}", record.method_index))?;
        target.method = method.name().to_string();
        if !method.accepts(record.args.len()) {
            return Err(format!(
                "expected {} arguments, got {}",
                method.arity(),
                record.args.len()
            ));
        }

        let instance = descriptor.instance().map_err(|e| e.to_string())?;
        let queue = descriptor.method_queue().map_err(|e| e.to_string())?;
        let mut invocation = Invocation::with_sink(record.args, sink.clone());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            queue.call_sync(move || method.invoke(&*instance, &mut invocation))
        }));
        match outcome {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(err.to_string()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => Err(format!("method panicked: {}", panic_message(&*payload))),
        }
    }

    /// `nativeCallSyncHook`: runs inline on the script queue.
    fn call_sync_method(
        self: &Arc<Self>,
        module_index: usize,
        method_index: usize,
        args: Vec<Value>,
    ) -> Result<Value, String> {
        let descriptor = self
            .registry
            .resolve_index(module_index)
            .map_err(|e| e.to_string())?;
        let methods = descriptor.methods().map_err(|e| e.to_string())?;
        let method = methods.get(method_index).ok_or_else(|| {
            format!(
                "module '{}' has no method at index {}",
                descriptor.name(),
                method_index
            )
        })?;
        if !method.is_sync() {
            return Err(format!(
                "{}.{} is not a synchronous method",
                descriptor.name(),
                method.name()
            ));
        }
        if !method.accepts(args.len()) {
            return Err(format!(
                "{}.{} expected {} arguments, got {}",
                descriptor.name(),
                method.name(),
                method.arity(),
                args.len()
            ));
        }

        let instance = descriptor.instance().map_err(|e| e.to_string())?;
        let sink: Arc<dyn CallbackSink> = Arc::new(DispatcherSink(Arc::downgrade(self)));
        let mut invocation = Invocation::with_sink(args, sink);
        match panic::catch_unwind(AssertUnwindSafe(|| method.invoke(&*instance, &mut invocation))) {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(payload) => Err(format!(
                "{}.{} panicked: {}",
                descriptor.name(),
                method.name(),
                panic_message(&*payload)
            )),
        }
    }

    fn notify_observers(&self, kind: FlushKind) {
        let observers = {
            let observers = self.observers.read();
            match kind {
                FlushKind::Full => observers.batch_complete.clone(),
                FlushKind::Partial => observers.partial_flush.clone(),
            }
        };

        for descriptor in observers.iter().filter(|d| d.has_instance()) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match kind {
                FlushKind::Full => descriptor.notify_batch_did_complete(),
                FlushKind::Partial => descriptor.notify_partial_batch_did_flush(),
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::warn!(
                    "Notifying module '{}' of {:?} flush failed: {}",
                    descriptor.name(),
                    kind,
                    err
                ),
                Err(payload) => log::error!(
                    "Module '{}' panicked in its {:?} flush hook: {}",
                    descriptor.name(),
                    kind,
                    panic_message(&*payload)
                ),
            }
        }
    }

    /// Runs a delivered callback, then flushes what it queued.
    fn deliver_callback(self: &Arc<Self>, runtime: &mut ScriptRuntime, id: CallbackId, args: Vec<Value>) {
        if !runtime.is_loaded() {
            log::warn!("Dropped callback {}: no script is loaded", id);
            return;
        }
        self.begin_cycle();
        if let Err(diagnostic) = runtime.engine().invoke_callback(id, &args) {
            log::error!("Callback {} failed: {}", id, diagnostic);
        }
        let batch = runtime.engine().take_queued_calls();
        self.flush_full(batch);
    }
}

// ============================================================================
// Callback delivery
// ============================================================================

struct DispatcherSink(Weak<DispatcherInner>);

/// Counts a posted delivery until it has run or was dropped unrun.
struct InFlight(Arc<DispatcherInner>);

impl InFlight {
    fn new(inner: Arc<DispatcherInner>) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CallbackSink for DispatcherSink {
    fn deliver(&self, id: CallbackId, args: Vec<Value>) -> Result<(), BridgeError> {
        let inner = self
            .0
            .upgrade()
            .ok_or_else(|| BridgeError::BatchDelivery("bridge has shut down".to_string()))?;
        let in_flight = InFlight::new(inner.clone());

        inner.adapter.post(move |runtime| {
            let inner = in_flight.0.clone();
            inner.deliver_callback(runtime, id, args);
            inner.deliveries.fetch_add(1, Ordering::SeqCst);
            drop(in_flight);
        })
    }
}

// ============================================================================
// Hooks
// ============================================================================

fn install_hooks(inner: &Arc<DispatcherInner>) -> Result<(), BridgeError> {
    let context = inner.adapter.current_context();

    let weak = Arc::downgrade(inner);
    let flush_immediate: NativeHook = Arc::new(move |args: &[Value]| -> Result<Value, String> {
        let inner = weak.upgrade().ok_or("bridge has shut down")?;
        let batch = CallBatch::from_value(args.first().unwrap_or(&Value::Null))
            .map_err(|e| e.to_string())?;
        inner.flush_partial(batch);
        Ok(Value::Null)
    });
    context.define_hook(hooks::FLUSH_QUEUE_IMMEDIATE, flush_immediate)?;

    let weak = Arc::downgrade(inner);
    let call_sync: NativeHook = Arc::new(move |args: &[Value]| -> Result<Value, String> {
        let inner = weak.upgrade().ok_or("bridge has shut down")?;
        let module_index = args
            .first()
            .and_then(Value::as_index)
            .ok_or("module index must be a non-negative integer")?;
        let method_index = args
            .get(1)
            .and_then(Value::as_index)
            .ok_or("method index must be a non-negative integer")?;
        let call_args = args
            .get(2)
            .and_then(Value::as_array)
            .map(<[Value]>::to_vec)
            .unwrap_or_default();
        inner.call_sync_method(module_index, method_index, call_args)
    });
    context.define_hook(hooks::CALL_SYNC, call_sync)?;

    let logging: NativeHook = Arc::new(|args: &[Value]| -> Result<Value, String> {
        let message = args.first().map(Value::to_string).unwrap_or_default();
        let level = args.get(1).and_then(Value::as_index).unwrap_or(2);
        log::log!(target: SCRIPT_LOG_TARGET, script_log_level(level), "{}", message);
        Ok(Value::Null)
    });
    context.define_hook(hooks::LOGGING, logging)
}

/// `nativeLoggingHook` level: 0 = trace .. 4 = error.
pub fn script_log_level(level: usize) -> log::Level {
    match level {
        0 => log::Level::Trace,
        1 => log::Level::Debug,
        2 => log::Level::Info,
        3 => log::Level::Warn,
        _ => log::Level::Error,
    }
}
