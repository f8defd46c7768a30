//! Script Adapter
//!
//! Owns the script context. The engine is built on the script queue and
//! never leaves it; every operation below is funnelled onto that queue in
//! call order.

use crate::config::{BridgeConfig, DEFAULT_SCRIPT_STACK_SIZE};
use crate::error::BridgeError;
use crate::queue::QueueThread;
use hostlink_types::sync::{Arc, Mutex};
use hostlink_types::{
    EngineFactory, NativeHook, ScriptDiagnostic, ScriptEngine, SourceLocation, Value,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// State of the script queue.
pub struct ScriptRuntime {
    engine: Box<dyn ScriptEngine>,
    loaded: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
}

impl ScriptRuntime {
    pub fn engine(&mut self) -> &mut dyn ScriptEngine {
        self.engine.as_mut()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Make the engine's queue length visible off the script queue.
    fn publish_queued(&self) {
        self.queued
            .store(self.engine.queued_call_count(), Ordering::SeqCst);
    }

    /// Targeted call into a callable module of the script side.
    pub fn call_function(
        &mut self,
        module: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, BridgeError> {
        if !self.is_loaded() {
            return Err(BridgeError::ScriptNotLoaded);
        }
        self.engine
            .call_function(module, method, args)
            .map_err(BridgeError::ScriptInvocation)
    }
}

#[derive(Clone)]
pub struct ScriptAdapter {
    queue: QueueThread<ScriptRuntime>,
    loaded: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
}

impl ScriptAdapter {
    /// Spawn the script queue with the default stack and build the engine
    /// on it.
    pub fn spawn(name: impl Into<String>, factory: EngineFactory) -> Result<Self, BridgeError> {
        Self::spawn_with_stack_size(name, DEFAULT_SCRIPT_STACK_SIZE, factory)
    }

    /// Script queue named and sized as `config` says.
    pub fn from_config(config: &BridgeConfig, factory: EngineFactory) -> Result<Self, BridgeError> {
        Self::spawn_with_stack_size(
            config.script_queue_name.clone(),
            config.script_stack_size,
            factory,
        )
    }

    pub fn spawn_with_stack_size(
        name: impl Into<String>,
        stack_size: usize,
        factory: EngineFactory,
    ) -> Result<Self, BridgeError> {
        let loaded = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicUsize::new(0));
        let runtime_loaded = loaded.clone();
        let runtime_queued = queued.clone();
        let queue = QueueThread::spawn_with_stack_size(name, Some(stack_size), move || {
            ScriptRuntime {
                engine: factory(),
                loaded: runtime_loaded,
                queued: runtime_queued,
            }
        })?;
        Ok(Self {
            queue,
            loaded,
            queued,
        })
    }

    /// Evaluate `source` and block until its initial execution finished.
    ///
    /// On failure the adapter stays unloaded until a later load succeeds,
    /// and whatever the failed source queued for native modules is dropped.
    pub fn load_source(&self, source: &[u8], origin: &str) -> Result<(), BridgeError> {
        let text = match std::str::from_utf8(source) {
            Ok(text) => text.to_string(),
            Err(err) => {
                self.loaded.store(false, Ordering::SeqCst);
                let location = location_at(source, err.valid_up_to(), origin);
                return Err(BridgeError::ScriptLoad(
                    ScriptDiagnostic::new(format!("source is not valid UTF-8: {}", err))
                        .with_location(location),
                ));
            }
        };

        let origin = origin.to_string();
        self.queue.call_blocking(move |runtime| {
            runtime.loaded.store(false, Ordering::SeqCst);
            let outcome = runtime.engine.evaluate(&text, &origin);
            let result = match outcome {
                Ok(_) => {
                    runtime.loaded.store(true, Ordering::SeqCst);
                    log::debug!("Loaded script '{}'", origin);
                    Ok(())
                }
                Err(diagnostic) => {
                    let dropped = runtime.engine.take_queued_calls();
                    if !dropped.is_empty() {
                        log::debug!(
                            "Dropped {} calls queued by failed script '{}'",
                            dropped.len(),
                            origin
                        );
                    }
                    Err(BridgeError::ScriptLoad(diagnostic))
                }
            };
            runtime.publish_queued();
            result
        })?
    }

    /// Call `module.method(args)` on the script side outside the batch path.
    /// `on_result` runs on the script queue, or on the caller when the call
    /// could not be posted. Queued script calls are not flushed.
    pub fn invoke<F>(&self, module: &str, method: &str, args: Vec<Value>, on_result: F)
    where
        F: FnOnce(Result<Value, BridgeError>) + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(on_result)));
        let job_slot = slot.clone();
        let module = module.to_string();
        let method = method.to_string();

        let posted = self.queue.run_on_queue(move |runtime| {
            let result = runtime.call_function(&module, &method, &args);
            runtime.publish_queued();
            if let Some(on_result) = job_slot.lock().take() {
                on_result(result);
            }
        });
        if let Err(err) = posted {
            if let Some(on_result) = slot.lock().take() {
                on_result(Err(err));
            }
        }
    }

    /// [`invoke`](Self::invoke) as a future.
    pub fn invoke_async(
        &self,
        module: &str,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value, BridgeError>> {
        let (tx, rx) = oneshot::channel();
        self.invoke(module, method, args, move |result| {
            let _ = tx.send(result);
        });
        async move {
            rx.await.unwrap_or_else(|_| {
                Err(BridgeError::InvalidExecutionContext(
                    "script queue dropped the call".to_string(),
                ))
            })
        }
    }

    /// Handle for installing capabilities into the script context.
    pub fn current_context(&self) -> ScriptContext {
        ScriptContext {
            queue: self.queue.clone(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Calls the script side has queued for native modules, as of the last
    /// finished job on the script queue.
    pub fn queued_native_calls(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn is_on_script_queue(&self) -> bool {
        self.queue.is_on_queue()
    }

    pub(crate) fn run_blocking<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&mut ScriptRuntime) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.queue.call_blocking(move |runtime| {
            let result = f(runtime);
            runtime.publish_queued();
            result
        })
    }

    pub(crate) fn post<F>(&self, f: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut ScriptRuntime) + Send + 'static,
    {
        self.queue.run_on_queue(move |runtime| {
            f(runtime);
            runtime.publish_queued();
        })
    }

    /// Stop the script queue after the work already posted.
    pub fn shutdown(&self) {
        self.loaded.store(false, Ordering::SeqCst);
        self.queue.quit_synchronous();
    }
}

/// Live handle to the script context. Every call is posted in order onto
/// the script queue.
#[derive(Clone)]
pub struct ScriptContext {
    queue: QueueThread<ScriptRuntime>,
}

impl ScriptContext {
    pub fn define_global(&self, name: &str, value: Value) -> Result<(), BridgeError> {
        let name = name.to_string();
        self.queue
            .run_on_queue(move |runtime| runtime.engine.define_global(&name, value))
    }

    pub fn define_hook(&self, name: &str, hook: NativeHook) -> Result<(), BridgeError> {
        let name = name.to_string();
        self.queue
            .run_on_queue(move |runtime| runtime.engine.define_hook(&name, hook))
    }

    pub fn with_engine<F>(&self, f: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut dyn ScriptEngine) + Send + 'static,
    {
        self.queue
            .run_on_queue(move |runtime| {
                f(runtime.engine.as_mut());
                runtime.publish_queued();
            })
    }
}

/// 1-based line and column of byte `offset`.
fn location_at(source: &[u8], offset: usize, origin: &str) -> SourceLocation {
    let before = &source[..offset.min(source.len())];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    let column = String::from_utf8_lossy(&before[line_start..]).chars().count() + 1;
    SourceLocation {
        origin: origin.to_string(),
        line,
        column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_at() {
        let source = b"let a = 1;\nlet b = \xff;";
        let location = location_at(source, 19, "bad.js");
        assert_eq!(location.line, 2);
        assert_eq!(location.column, 9);
        assert_eq!(location.origin, "bad.js");
    }
}
