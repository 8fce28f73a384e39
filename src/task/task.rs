//! Task representation and materialization.

use super::dims::TaskDims;
use crate::configuration::Configuration;
use crate::device::DeviceBackend;
use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Unique identifier for a task within one scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Builds an executable kernel from the program currently bound to a queue.
pub type KernelGenerator<B> = Arc<
    dyn Fn(&Configuration<B>, &str) -> Result<<B as DeviceBackend>::Kernel> + Send + Sync,
>;

/// One unit of work: a kernel name, a deferred kernel constructor and a
/// launch geometry.
pub struct Task<B: DeviceBackend> {
    id: Option<TaskId>,
    kernel_name: String,
    generator: KernelGenerator<B>,
    dims: TaskDims,
    configuration: Option<String>,
    created_at: Instant,
    enqueued_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl<B: DeviceBackend> Task<B> {
    /// Task that runs the configuration's cached kernel for `kernel_name`.
    pub fn new<S: Into<String>>(kernel_name: S) -> Self {
        Self::with_generator(kernel_name, |config: &Configuration<B>, name: &str| {
            config.kernel(name)
        })
    }

    /// Task with a custom kernel constructor, e.g. one that binds buffers.
    pub fn with_generator<S, F>(kernel_name: S, generator: F) -> Self
    where
        S: Into<String>,
        F: Fn(&Configuration<B>, &str) -> Result<B::Kernel> + Send + Sync + 'static,
    {
        Task {
            id: None,
            kernel_name: kernel_name.into(),
            generator: Arc::new(generator),
            dims: TaskDims::default(),
            configuration: None,
            created_at: Instant::now(),
            enqueued_at: None,
            finished_at: None,
        }
    }

    pub fn with_dims(mut self, dims: TaskDims) -> Self {
        self.dims = dims;
        self
    }

    pub fn set_dims(&mut self, dims: TaskDims) {
        self.dims = dims;
    }

    pub fn id(&self) -> Option<TaskId> {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: TaskId) {
        self.id = Some(id);
    }

    pub fn kernel_name(&self) -> &str {
        &self.kernel_name
    }

    pub fn dims(&self) -> &TaskDims {
        &self.dims
    }

    /// Configuration the kernel was materialized against, once dispatched.
    pub fn configuration(&self) -> Option<&str> {
        self.configuration.as_deref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn enqueued_at(&self) -> Option<Instant> {
        self.enqueued_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// `finished_at - enqueued_at`, once both are known.
    pub fn duration(&self) -> Option<Duration> {
        match (self.enqueued_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// Run the generator against `config`. Called once, by the owning
    /// queue's worker, right before submission.
    pub(crate) fn materialize(&mut self, config: &Configuration<B>) -> Result<B::Kernel> {
        let kernel = (self.generator)(config, &self.kernel_name)?;
        self.configuration = Some(config.name().to_string());
        Ok(kernel)
    }

    pub(crate) fn mark_enqueued(&mut self) {
        self.enqueued_at = Some(Instant::now());
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished_at = Some(Instant::now());
    }
}

impl<B: DeviceBackend> Clone for Task<B> {
    fn clone(&self) -> Self {
        Task {
            id: self.id,
            kernel_name: self.kernel_name.clone(),
            generator: Arc::clone(&self.generator),
            dims: self.dims,
            configuration: self.configuration.clone(),
            created_at: self.created_at,
            enqueued_at: self.enqueued_at,
            finished_at: self.finished_at,
        }
    }
}

impl<B: DeviceBackend> fmt::Debug for Task<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kernel_name", &self.kernel_name)
            .field("dims", &self.dims)
            .field("configuration", &self.configuration)
            .field("enqueued_at", &self.enqueued_at)
            .field("finished_at", &self.finished_at)
            .finish()
    }
}

impl<B: DeviceBackend> fmt::Display for Task<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} {} {}", id, self.kernel_name, self.dims.global),
            None => write!(f, "#? {} {}", self.kernel_name, self.dims.global),
        }
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::device::SimDevice;

    #[test]
    fn test_new_task_defaults() {
        let task: Task<SimDevice> = Task::new("vector_triad");
        assert_eq!(task.kernel_name(), "vector_triad");
        assert_eq!(task.id(), None);
        assert_eq!(task.dims().work_items(), 1);
        assert!(task.duration().is_none());
        assert!(task.configuration().is_none());
    }

    #[test]
    fn test_duration_after_marks() {
        let mut task: Task<SimDevice> = Task::new("k");
        task.mark_enqueued();
        std::thread::sleep(Duration::from_millis(2));
        task.mark_finished();
        assert!(task.duration().unwrap() >= Duration::from_millis(2));
    }

    #[test]
    fn test_display() {
        let mut task: Task<SimDevice> =
            Task::new("matrixMult").with_dims(TaskDims::new_2d([32, 32], [4, 4]));
        assert_eq!(task.to_string(), "#? matrixMult [32, 32]");
        task.assign_id(TaskId(7));
        assert_eq!(task.to_string(), "#7 matrixMult [32, 32]");
    }

    #[test]
    fn test_materialize_records_configuration() {
        let device = Arc::new(SimDevice::new());
        let config = Configuration::from_binary(
            Arc::clone(&device),
            "mmult_f_d",
            &SimDevice::binary(&["matrixMult"]),
        )
        .unwrap();

        let mut task: Task<SimDevice> = Task::new("matrixMult");
        let kernel = task.materialize(&config).unwrap();
        assert_eq!(kernel.entry_point(), "matrixMult");
        assert_eq!(task.configuration(), Some("mmult_f_d"));

        let mut missing: Task<SimDevice> = Task::new("fft");
        assert!(missing.materialize(&config).is_err());
        assert!(missing.configuration().is_none());
    }
}
