//! Serial execution queues
//!
//! A queue is one named OS thread draining an unbounded tokio channel. Jobs
//! run strictly in the order they were posted. A queue may own state that is
//! built on its own thread and never leaves it; the script context is such a
//! queue, module queues carry no state.

use crate::config::BridgeConfig;
use crate::error::{panic_message, BridgeError};
use hostlink_types::sync::{Arc, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Message<S> {
    Run(Job<S>),
    Quit,
}

struct QueueShared<S> {
    name: String,
    sender: mpsc::UnboundedSender<Message<S>>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a serial worker thread owning state `S`.
pub struct QueueThread<S> {
    shared: Arc<QueueShared<S>>,
}

/// Stateless serial queue used for module methods.
pub type ExecutionQueue = QueueThread<()>;

impl<S> Clone for QueueThread<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: 'static> std::fmt::Debug for QueueThread<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueThread")
            .field("name", &self.shared.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<S: 'static> QueueThread<S> {
    /// Spawn the worker thread. `init` runs first on that thread and builds
    /// the state every job receives.
    pub fn spawn<F>(name: impl Into<String>, init: F) -> Result<Self, BridgeError>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        Self::spawn_with_stack_size(name, None, init)
    }

    /// Like [`spawn`](Self::spawn), with an explicit worker stack size in
    /// bytes. `None` keeps the platform default.
    pub fn spawn_with_stack_size<F>(
        name: impl Into<String>,
        stack_size: Option<usize>,
        init: F,
    ) -> Result<Self, BridgeError>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message<S>>();
        let worker_name = name.clone();

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        let handle = builder
            .spawn(move || {
                let mut state = init();
                while let Some(message) = receiver.blocking_recv() {
                    match message {
                        Message::Run(job) => {
                            if let Err(payload) =
                                panic::catch_unwind(AssertUnwindSafe(|| job(&mut state)))
                            {
                                log::error!(
                                    "Job on queue '{}' panicked: {}",
                                    worker_name,
                                    panic_message(&*payload)
                                );
                            }
                        }
                        Message::Quit => {
                            receiver.close();
                            break;
                        }
                    }
                }
                log::debug!("Queue '{}' finished", worker_name);
            })
            .map_err(|e| BridgeError::QueueSpawn {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        log::debug!("Spawned queue '{}'", name);
        Ok(Self {
            shared: Arc::new(QueueShared {
                name,
                sender,
                thread_id: handle.thread().id(),
                handle: Mutex::new(Some(handle)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_on_queue(&self) -> bool {
        thread::current().id() == self.shared.thread_id
    }

    pub fn is_finished(&self) -> bool {
        self.shared.sender.is_closed()
    }

    /// Post a job behind everything already queued. Never runs inline, even
    /// when called from the queue itself.
    pub fn run_on_queue<F>(&self, job: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.shared
            .sender
            .send(Message::Run(Box::new(job)))
            .map_err(|_| {
                log::warn!("Dropped job posted to finished queue '{}'", self.name());
                BridgeError::InvalidExecutionContext(format!(
                    "queue '{}' has finished",
                    self.name()
                ))
            })
    }

    /// Post a job and block until it has run, returning its result.
    ///
    /// A panic inside the job is resumed on the caller. Must not be called
    /// from inside a tokio runtime.
    pub fn call_blocking<R, F>(&self, job: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_on_queue() {
            return Err(BridgeError::InvalidExecutionContext(format!(
                "blocking call on queue '{}' from its own thread",
                self.name()
            )));
        }

        let (tx, rx) = oneshot::channel();
        self.run_on_queue(move |state| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(state)));
            let _ = tx.send(outcome);
        })?;

        match rx.blocking_recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(BridgeError::InvalidExecutionContext(format!(
                "queue '{}' stopped before running the job",
                self.name()
            ))),
        }
    }

    /// Stop the worker after the jobs already queued and wait for it to exit.
    /// Called from the queue itself it only requests the stop.
    pub fn quit_synchronous(&self) {
        let _ = self.shared.sender.send(Message::Quit);
        if self.is_on_queue() {
            return;
        }
        let handle = self.shared.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Queue '{}' terminated abnormally", self.name());
            }
        }
    }
}

impl ExecutionQueue {
    pub fn new(name: impl Into<String>) -> Result<Self, BridgeError> {
        Self::spawn(name, || ())
    }

    /// Run `f` on this queue and wait for its result. Runs inline when the
    /// caller already is on the queue.
    pub fn call_sync<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_on_queue() {
            return Ok(f());
        }
        self.call_blocking(move |_| f())
    }
}

/// Queues shared by every module of one registry.
#[derive(Debug, Clone)]
pub struct RegistryQueues {
    /// Privileged queue for modules that require main-queue setup
    pub main: Option<ExecutionQueue>,
    /// Default background queue for module methods
    pub shared: ExecutionQueue,
}

impl RegistryQueues {
    pub fn new(main: Option<ExecutionQueue>, shared: ExecutionQueue) -> Self {
        Self { main, shared }
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let main = if config.spawn_main_queue {
            Some(ExecutionQueue::new(config.main_queue_name.clone())?)
        } else {
            None
        };
        let shared = ExecutionQueue::new(config.shared_queue_name.clone())?;
        Ok(Self { main, shared })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_jobs_run_in_post_order() {
        let queue = ExecutionQueue::new("test.order").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let seen = seen.clone();
            queue.run_on_queue(move |_| seen.lock().push(i)).unwrap();
        }
        queue.call_sync(|| ()).unwrap();
        assert_eq!(*seen.lock(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_state_lives_on_queue_thread() {
        let queue = QueueThread::spawn("test.state", || 10usize).unwrap();
        queue.run_on_queue(|count| *count += 5).unwrap();
        assert_eq!(queue.call_blocking(|count| *count).unwrap(), 15);
    }

    #[test]
    fn test_call_sync_is_inline_on_queue() {
        let queue = ExecutionQueue::new("test.inline").unwrap();
        let inner = queue.clone();
        let nested = queue
            .call_sync(move || inner.call_sync(|| 7).unwrap())
            .unwrap();
        assert_eq!(nested, 7);
    }

    #[test]
    fn test_call_blocking_from_own_queue_fails() {
        let queue = ExecutionQueue::new("test.reentrant").unwrap();
        let inner = queue.clone();
        let result = queue
            .call_sync(move || inner.call_blocking(|_| ()).is_err())
            .unwrap();
        assert!(result);
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let queue = ExecutionQueue::new("test.panic").unwrap();
        queue.run_on_queue(|_| panic!("job failure")).unwrap();
        assert_eq!(queue.call_sync(|| 3).unwrap(), 3);
    }

    #[test]
    fn test_panic_resumes_on_caller() {
        let queue = ExecutionQueue::new("test.resume").unwrap();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            queue.call_sync(|| -> () { panic!("inside") })
        }));
        assert!(outcome.is_err());
        assert!(!queue.is_finished());
    }

    #[test]
    fn test_post_after_quit_fails() {
        let queue = ExecutionQueue::new("test.quit").unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        queue
            .run_on_queue(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        queue.quit_synchronous();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(queue.is_finished());
        assert!(matches!(
            queue.run_on_queue(|_| ()),
            Err(BridgeError::InvalidExecutionContext(_))
        ));
        assert!(queue.call_sync(|| ()).is_err());
    }

    #[test]
    fn test_thread_is_named() {
        let queue = ExecutionQueue::new("test.named").unwrap();
        let name = queue
            .call_sync(|| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("test.named"));
    }

    #[test]
    fn test_sized_queue_runs_deep_work() {
        fn depth(n: u64) -> u64 {
            let frame = [n; 512];
            if n == 0 {
                0
            } else {
                1 + depth(frame[n as usize % 512] - 1)
            }
        }

        let queue =
            QueueThread::spawn_with_stack_size("test.sized", Some(64 * 1024 * 1024), || ()).unwrap();
        assert_eq!(queue.call_blocking(|_| depth(4096)).unwrap(), 4096);
        assert!(format!("{:?}", queue).contains("test.sized"));
    }
}
