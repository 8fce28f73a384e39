// per-kernel in-order dispatch queue
use super::state::{QueueEvent, QueueState};
use crate::config::Config;
use crate::configuration::Configuration;
use crate::device::DeviceBackend;
use crate::error::{Error, Result};
use crate::task::Task;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Invoked on the queue's worker thread for every completed task.
pub type CompletionCallback<B> = Arc<dyn Fn(Task<B>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    // run out the backlog first
    Drain,
    // drop the backlog without callbacks
    Discard,
}

struct Inner<B: DeviceBackend> {
    pending: VecDeque<Task<B>>,
    state: QueueState,
    shutdown: Option<Shutdown>,
    program: Arc<Configuration<B>>,
    completed: u64,
    dropped: u64,
    fault: Option<String>,
}

struct Shared<B: DeviceBackend> {
    kernel_name: String,
    inner: Mutex<Inner<B>>,
    cond: Condvar,
}

/// In-order, single-worker FIFO for one kernel name.
///
/// At most one task per queue is ever dispatched and unfinished. Tasks
/// still pending when the queue is dropped are discarded without a
/// completion callback.
pub struct ExecutionQueue<B: DeviceBackend> {
    shared: Arc<Shared<B>>,
    worker: Option<JoinHandle<()>>,
}

impl<B: DeviceBackend> ExecutionQueue<B> {
    pub fn new<S: Into<String>>(
        kernel_name: S,
        backend: Arc<B>,
        program: Arc<Configuration<B>>,
        callback: CompletionCallback<B>,
        config: &Config,
    ) -> Result<Self> {
        let kernel_name = kernel_name.into();
        let device_queue = backend.create_queue()?;

        let shared = Arc::new(Shared {
            kernel_name: kernel_name.clone(),
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                state: QueueState::Idle,
                shutdown: None,
                program,
                completed: 0,
                dropped: 0,
                fault: None,
            }),
            cond: Condvar::new(),
        });

        let worker = Worker {
            shared: Arc::clone(&shared),
            backend,
            device_queue,
            callback,
        };

        let mut builder =
            thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, kernel_name));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder
            .spawn(move || worker.run())
            .map_err(|e| Error::Other(format!("spawn failed: {}", e)))?;

        tracing::debug!(kernel = %kernel_name, "execution queue started");

        Ok(Self {
            shared,
            worker: Some(handle),
        })
    }

    pub fn kernel_name(&self) -> &str {
        &self.shared.kernel_name
    }

    /// Append to the tail. Fails once the queue is closing or closed.
    pub fn enqueue(&self, task: Task<B>) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.shutdown.is_some() || inner.state == QueueState::Closed {
            return Err(Error::queue_closed(self.shared.kernel_name.clone()));
        }
        inner.pending.push_back(task);
        self.shared.cond.notify_all();
        Ok(())
    }

    /// Block until nothing is pending and nothing is in flight.
    pub fn wait(&self) {
        let mut inner = self.shared.inner.lock();
        while !inner.pending.is_empty() || inner.state.is_busy() {
            self.shared.cond.wait(&mut inner);
        }
    }

    /// Close the queue, let the backlog run out, and join the worker.
    pub fn finish(&mut self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.shutdown.get_or_insert(Shutdown::Drain);
            self.shared.cond.notify_all();
        }
        self.join();
    }

    /// Close the queue, discard whatever has not been dispatched, and join
    /// the worker. Returns the number of tasks dropped over the queue's life.
    pub fn cancel(&mut self) -> u64 {
        {
            let mut inner = self.shared.inner.lock();
            inner.shutdown = Some(Shutdown::Discard);
            self.shared.cond.notify_all();
        }
        self.join();
        self.dropped()
    }

    /// Rebind the program used for kernels materialized from now on.
    pub fn set_program(&self, program: Arc<Configuration<B>>) {
        self.shared.inner.lock().program = program;
    }

    pub fn program_name(&self) -> String {
        self.shared.inner.lock().program.name().to_string()
    }

    pub fn state(&self) -> QueueState {
        self.shared.inner.lock().state
    }

    /// Pending tasks plus the one being worked on, if any.
    pub fn len(&self) -> usize {
        let inner = self.shared.inner.lock();
        inner.pending.len() + usize::from(inner.state.is_busy())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_idle(&self) -> bool {
        let inner = self.shared.inner.lock();
        inner.pending.is_empty() && !inner.state.is_busy()
    }

    pub fn completed(&self) -> u64 {
        self.shared.inner.lock().completed
    }

    pub fn dropped(&self) -> u64 {
        self.shared.inner.lock().dropped
    }

    /// The error that stopped the worker, if one did.
    pub fn fault(&self) -> Option<String> {
        self.shared.inner.lock().fault.clone()
    }

    /// Sum `cost` over the not-yet-dispatched tasks.
    pub fn pending_cost<F>(&self, mut cost: F) -> f32
    where
        F: FnMut(&Task<B>) -> f32,
    {
        let inner = self.shared.inner.lock();
        inner.pending.iter().map(|task| cost(task)).sum()
    }

    fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            // a completion callback may end up dropping its own queue
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!(kernel = %self.shared.kernel_name, "execution queue worker panicked");
            }
        }
    }
}

impl<B: DeviceBackend> Drop for ExecutionQueue<B> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<B: DeviceBackend> fmt::Debug for ExecutionQueue<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ExecutionQueue")
            .field("kernel_name", &self.shared.kernel_name)
            .field("state", &inner.state)
            .field("pending", &inner.pending.len())
            .field("program", &inner.program.name())
            .field("completed", &inner.completed)
            .finish()
    }
}

struct Worker<B: DeviceBackend> {
    shared: Arc<Shared<B>>,
    backend: Arc<B>,
    device_queue: B::Queue,
    callback: CompletionCallback<B>,
}

impl<B: DeviceBackend> Worker<B> {
    fn run(self) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.run_loop()));
        match result {
            Ok(Ok(())) => {
                tracing::debug!(kernel = %self.shared.kernel_name, "execution queue closed");
            }
            Ok(Err(err)) => self.fail(err),
            Err(payload) => self.fail(Error::Other(format!(
                "worker panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    fn run_loop(&self) -> Result<()> {
        while let Some((task, program)) = self.next_task()? {
            self.dispatch(task, &program)?;
        }
        Ok(())
    }

    /// Block until there is a task to dispatch, or return `None` once the
    /// queue has been closed.
    fn next_task(&self) -> Result<Option<(Task<B>, Arc<Configuration<B>>)>> {
        let mut inner = self.shared.inner.lock();
        loop {
            let shutdown = inner.shutdown;
            match shutdown {
                Some(Shutdown::Discard) => {
                    let dropped = inner.pending.len();
                    if dropped > 0 {
                        inner.pending.clear();
                        inner.dropped += dropped as u64;
                        tracing::warn!(
                            kernel = %self.shared.kernel_name,
                            dropped,
                            "queue closed with pending tasks"
                        );
                    }
                    inner.state = inner.state.on(QueueEvent::Close)?;
                    self.shared.cond.notify_all();
                    return Ok(None);
                }
                Some(Shutdown::Drain) if inner.pending.is_empty() => {
                    inner.state = inner.state.on(QueueEvent::Close)?;
                    self.shared.cond.notify_all();
                    return Ok(None);
                }
                _ => {}
            }

            if let Some(task) = inner.pending.pop_front() {
                inner.state = inner.state.on(QueueEvent::TaskAvailable)?;
                return Ok(Some((task, Arc::clone(&inner.program))));
            }

            self.shared.cond.wait(&mut inner);
        }
    }

    // the queue lock is not held here, so neither the generator nor the
    // callback can deadlock against enqueue
    fn dispatch(&self, mut task: Task<B>, program: &Configuration<B>) -> Result<()> {
        let kernel = task.materialize(program)?;
        task.mark_enqueued();
        let completion = self
            .backend
            .submit(&self.device_queue, kernel, task.dims())?;
        self.transition(QueueEvent::Submitted)?;

        completion.wait()?;
        task.mark_finished();
        self.transition(QueueEvent::DeviceCompleted)?;

        tracing::trace!(
            kernel = %self.shared.kernel_name,
            task = ?task.id(),
            configuration = program.name(),
            "task completed on device"
        );

        let callback = Arc::clone(&self.callback);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            callback(task);
        }));
        if result.is_err() {
            tracing::error!(kernel = %self.shared.kernel_name, "completion callback panicked");
        }

        let mut inner = self.shared.inner.lock();
        inner.state = inner.state.on(QueueEvent::CallbackReturned)?;
        inner.completed += 1;
        self.shared.cond.notify_all();
        Ok(())
    }

    fn transition(&self, event: QueueEvent) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.state = inner.state.on(event)?;
        Ok(())
    }

    fn fail(&self, err: Error) {
        tracing::error!(
            kernel = %self.shared.kernel_name,
            error = %err,
            "execution queue worker stopped"
        );

        let mut inner = self.shared.inner.lock();
        inner.dropped += inner.pending.len() as u64;
        inner.pending.clear();
        inner.state = inner.state.on(QueueEvent::Fault).unwrap_or(QueueState::Closed);
        inner.fault = Some(err.to_string());
        self.shared.cond.notify_all();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
