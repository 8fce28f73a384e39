use super::builder::SchedulerBuilder;
use crate::config::Config;
use crate::configuration::Configuration;
use crate::device::DeviceBackend;
use crate::error::{Error, Result};
use crate::model::{CostModel, KernelTable, Measurement, Parameters, Prediction};
use crate::queue::{CompletionCallback, ExecutionQueue};
use crate::task::{Task, TaskId};
use crate::telemetry::{CompletionObserver, CompletionRecord, Metrics};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// Lock order: queues, configurations, current, models, then a queue's own
// lock. Queue workers only ever take current or models, one at a time.

/// State reachable from the completion callback.
struct Shared<B: DeviceBackend> {
    backend: Arc<B>,
    config: Config,
    kernels: Arc<KernelTable>,
    configurations: RwLock<HashMap<String, Arc<Configuration<B>>>>,
    current: RwLock<Option<Arc<Configuration<B>>>>,
    models: Mutex<HashMap<String, CostModel>>,
    observers: Vec<Arc<dyn CompletionObserver>>,
    metrics: Metrics,
}

struct Queues<B: DeviceBackend> {
    by_kernel: HashMap<String, ExecutionQueue<B>>,
    next_id: u64,
}

pub struct Scheduler<B: DeviceBackend> {
    shared: Arc<Shared<B>>,
    queues: Mutex<Queues<B>>,
}

impl<B: DeviceBackend> Scheduler<B> {
    pub fn new(backend: Arc<B>, config: Config) -> Result<Self> {
        SchedulerBuilder::new(backend).config(config).build()
    }

    pub fn builder(backend: Arc<B>) -> SchedulerBuilder<B> {
        SchedulerBuilder::new(backend)
    }

    pub(crate) fn from_parts(
        backend: Arc<B>,
        config: Config,
        kernels: Arc<KernelTable>,
        observers: Vec<Arc<dyn CompletionObserver>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                kernels,
                configurations: RwLock::new(HashMap::new()),
                current: RwLock::new(None),
                models: Mutex::new(HashMap::new()),
                observers,
                metrics: Metrics::new(),
            }),
            queues: Mutex::new(Queues {
                by_kernel: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.shared.backend
    }

    /// Load `<kernels_dir>/<name>.<ext>` unless it is already loaded. The
    /// first configuration becomes the current one.
    pub fn add_configuration(&self, name: &str) -> Result<()> {
        let mut configurations = self.shared.configurations.write();
        if configurations.contains_key(name) {
            tracing::debug!(configuration = name, "configuration already loaded");
            return Ok(());
        }

        let configuration = Configuration::load(
            Arc::clone(&self.shared.backend),
            &self.shared.config,
            name,
        )?;
        self.register(&mut configurations, Arc::new(configuration));
        Ok(())
    }

    /// Register an already built configuration. A configuration with the
    /// same name that is already loaded wins.
    pub fn insert_configuration(&self, configuration: Configuration<B>) -> Arc<Configuration<B>> {
        let mut configurations = self.shared.configurations.write();
        if let Some(existing) = configurations.get(configuration.name()) {
            return Arc::clone(existing);
        }
        let configuration = Arc::new(configuration);
        self.register(&mut configurations, Arc::clone(&configuration));
        configuration
    }

    fn register(
        &self,
        configurations: &mut HashMap<String, Arc<Configuration<B>>>,
        configuration: Arc<Configuration<B>>,
    ) {
        let name = configuration.name().to_string();
        {
            let mut current = self.shared.current.write();
            if current.is_none() {
                tracing::info!(configuration = %name, "current configuration");
                *current = Some(Arc::clone(&configuration));
            }
        }
        self.shared
            .models
            .lock()
            .entry(name.clone())
            .or_insert_with(|| self.shared.new_model(&name));
        configurations.insert(name, configuration);
    }

    /// Make a loaded configuration current and rebind every queue to its
    /// program. Tasks already dispatched keep the kernel they were built with.
    pub fn set_configuration(&self, name: &str) -> Result<()> {
        let configuration = self
            .shared
            .configurations
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownConfiguration(name.to_string()))?;

        let queues = self.queues.lock();
        *self.shared.current.write() = Some(Arc::clone(&configuration));
        for queue in queues.by_kernel.values() {
            queue.set_program(Arc::clone(&configuration));
        }

        tracing::info!(
            configuration = name,
            queues = queues.by_kernel.len(),
            "switched configuration"
        );
        Ok(())
    }

    pub fn current_configuration(&self) -> Option<String> {
        self.shared
            .current
            .read()
            .as_ref()
            .map(|c| c.name().to_string())
    }

    pub fn configuration(&self, name: &str) -> Option<Arc<Configuration<B>>> {
        self.shared.configurations.read().get(name).cloned()
    }

    /// Names of every loaded configuration, sorted.
    pub fn configurations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .configurations
            .read()
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Assign the next ID and enqueue on the task's kernel queue, creating
    /// the queue against the current configuration if needed.
    pub fn add_task(&self, mut task: Task<B>) -> Result<TaskId> {
        let mut queues = self.queues.lock();
        let program = self
            .shared
            .current
            .read()
            .clone()
            .ok_or(Error::NoConfiguration)?;

        let id = TaskId(queues.next_id);
        queues.next_id += 1;
        task.assign_id(id);

        let queue = match queues.by_kernel.entry(task.kernel_name().to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let queue = ExecutionQueue::new(
                    entry.key().clone(),
                    Arc::clone(&self.shared.backend),
                    Arc::clone(&program),
                    self.completion_callback(),
                    &self.shared.config,
                )?;
                entry.insert(queue)
            }
        };
        queue.enqueue(task)?;
        self.shared.metrics.record_submitted();

        if self.shared.config.log_costs {
            let cost = self.shared.queued_cost(&queues.by_kernel, program.name());
            tracing::info!(
                task = id.as_u64(),
                configuration = program.name(),
                cost,
                "queued cost"
            );
        }

        Ok(id)
    }

    fn completion_callback(&self) -> CompletionCallback<B> {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |task| shared.task_done(task))
    }

    /// Block until every queue is idle.
    ///
    /// A queue whose worker stopped on an error is removed and the first
    /// such error is returned; the next task for that kernel gets a new
    /// queue.
    pub fn wait(&self) -> Result<()> {
        let mut queues = self.queues.lock();
        for queue in queues.by_kernel.values() {
            queue.wait();
        }

        let faulted: Vec<String> = queues
            .by_kernel
            .iter()
            .filter(|(_, queue)| queue.fault().is_some())
            .map(|(kernel, _)| kernel.clone())
            .collect();

        let mut first = None;
        for kernel in faulted {
            if let Some(mut queue) = queues.by_kernel.remove(&kernel) {
                let fault = queue.fault().unwrap_or_default();
                let dropped = queue.cancel();
                self.shared.metrics.record_device_fault();
                self.shared.metrics.record_dropped(dropped);
                tracing::warn!(kernel = %kernel, dropped, "removed faulted queue");
                first.get_or_insert_with(|| {
                    Error::device(format!("queue {} stopped: {}", kernel, fault))
                });
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// `wait`, then `reset`. The reset happens even when waiting reports a
    /// faulted queue.
    pub fn finish(&self) -> Result<()> {
        let result = self.wait();
        self.reset();
        result
    }

    /// Drop every queue and cost model and restart task IDs at zero.
    /// Loaded configurations and the current selection are kept. Tasks not
    /// yet dispatched are discarded.
    pub fn reset(&self) {
        let mut queues = self.queues.lock();
        let mut dropped = 0;
        for (_, mut queue) in queues.by_kernel.drain() {
            dropped += queue.cancel();
        }
        queues.next_id = 0;

        let names: Vec<String> = self.shared.configurations.read().keys().cloned().collect();
        let mut models = self.shared.models.lock();
        models.clear();
        for name in names {
            let model = self.shared.new_model(&name);
            models.insert(name, model);
        }
        drop(models);

        self.shared.metrics.record_dropped(dropped);
        if dropped > 0 {
            tracing::warn!(dropped, "reset discarded pending tasks");
        }
        tracing::debug!("scheduler reset");
    }

    pub fn queue_count(&self) -> usize {
        self.queues.lock().by_kernel.len()
    }

    /// Kernel names that currently have a queue, sorted.
    pub fn kernels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().by_kernel.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tasks queued or in flight across all queues.
    pub fn pending(&self) -> usize {
        self.queues
            .lock()
            .by_kernel
            .values()
            .map(ExecutionQueue::len)
            .sum()
    }

    /// Predicted cost of everything not yet dispatched, under the current
    /// configuration's model.
    pub fn queued_cost(&self) -> f32 {
        let queues = self.queues.lock();
        match self.current_configuration() {
            Some(name) => self.shared.queued_cost(&queues.by_kernel, &name),
            None => 0.0,
        }
    }

    /// Guarded cost of `task` under the current configuration.
    pub fn cost(&self, task: &Task<B>) -> Result<f32> {
        self.with_current_model(|model| model.cost(task))
    }

    pub fn predict(&self, task: &Task<B>) -> Result<Prediction> {
        self.with_current_model(|model| model.predict(task))
    }

    /// Online fit for `kernel` under the current configuration.
    pub fn parameters(&self, kernel: &str) -> Result<Parameters> {
        self.with_current_model(|model| model.kernel_linreg(kernel))?
    }

    /// Measurements recorded for `kernel` under the current configuration.
    pub fn samples(&self, kernel: &str) -> usize {
        self.with_current_model(|model| model.samples(kernel))
            .unwrap_or(0)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    fn with_current_model<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&CostModel) -> T,
    {
        let name = self
            .current_configuration()
            .ok_or(Error::NoConfiguration)?;
        let mut models = self.shared.models.lock();
        let model = models
            .entry(name.clone())
            .or_insert_with(|| self.shared.new_model(&name));
        Ok(f(model))
    }
}

impl<B: DeviceBackend> Shared<B> {
    fn new_model(&self, configuration: &str) -> CostModel {
        CostModel::new(configuration, Arc::clone(&self.kernels))
            .with_hybrid_prior(self.config.hybrid_prior)
    }

    fn queued_cost(&self, queues: &HashMap<String, ExecutionQueue<B>>, configuration: &str) -> f32 {
        let mut models = self.models.lock();
        let model = models
            .entry(configuration.to_string())
            .or_insert_with(|| self.new_model(configuration));
        queues
            .values()
            .map(|queue| queue.pending_cost(|task| model.cost(task)))
            .sum()
    }

    /// Completion callback. Runs on the finishing queue's worker thread.
    fn task_done(&self, task: Task<B>) {
        let Some(duration) = task.duration() else {
            tracing::warn!(task = %task, "completed task carries no timing");
            return;
        };
        let actual = duration.as_secs_f64();

        // the model of the configuration the kernel was built against
        let configuration = match task.configuration() {
            Some(name) => name.to_string(),
            None => match self.current.read().as_ref() {
                Some(current) => current.name().to_string(),
                None => return,
            },
        };

        let prediction = {
            let mut models = self.models.lock();
            let model = models
                .entry(configuration.clone())
                .or_insert_with(|| self.new_model(&configuration));
            let flop = model.flop(&task);
            model.add_measurement(&task, Measurement::new(flop, actual));
            model.predict(&task)
        };

        let task_id = task.id().map_or(0, |id| id.as_u64());
        let record = CompletionRecord::new(
            task_id,
            &configuration,
            task.kernel_name(),
            &prediction,
            actual,
        );

        self.metrics.record_completion(&record);
        for observer in &self.observers {
            observer.on_completion(&record);
        }
    }
}

impl<B: DeviceBackend> fmt::Debug for Scheduler<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("configurations", &self.configurations())
            .field("current", &self.current_configuration())
            .field("queues", &self.queue_count())
            .field("observers", &self.shared.observers.len())
            .finish()
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::device::SimDevice;
    use crate::model::{unit, KernelParams};
    use crate::task::TaskDims;
    use crate::telemetry::CollectingObserver;
    use std::time::Duration;

    fn scheduler(
        entries: &[&str],
        observer: Arc<CollectingObserver>,
    ) -> (Arc<SimDevice>, Scheduler<SimDevice>) {
        let device = Arc::new(SimDevice::with_timing(
            Duration::from_micros(200),
            Duration::from_nanos(10),
        ));
        let mut kernels = KernelTable::new();
        kernels.insert("cfg", "k", KernelParams::new(1.0e9, unit).with_alpha(0.5));

        let config = Config::builder()
            .log_completions(false)
            .log_costs(false)
            .build()
            .unwrap();
        let scheduler = Scheduler::builder(Arc::clone(&device))
            .config(config)
            .kernels(kernels)
            .observer(observer)
            .build()
            .unwrap();

        let configuration =
            Configuration::from_binary(Arc::clone(&device), "cfg", &SimDevice::binary(entries))
                .unwrap();
        scheduler.insert_configuration(configuration);
        (device, scheduler)
    }

    #[test]
    fn test_add_task_without_configuration() {
        let device = Arc::new(SimDevice::new());
        let scheduler = Scheduler::new(device, Config::default()).unwrap();
        assert!(matches!(
            scheduler.add_task(Task::new("k")),
            Err(Error::NoConfiguration)
        ));
        assert!(scheduler.current_configuration().is_none());
    }

    #[test]
    fn test_task_done_feeds_model_and_observers() {
        let observer = Arc::new(CollectingObserver::new());
        let (_, scheduler) = scheduler(&["k"], Arc::clone(&observer));

        for n in [16, 64, 256] {
            scheduler
                .add_task(Task::new("k").with_dims(TaskDims::new_1d(n)))
                .unwrap();
        }
        scheduler.wait().unwrap();

        assert_eq!(scheduler.samples("k"), 3);
        let records = observer.records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.configuration == "cfg" && r.kernel == "k"));
        assert!(records[0].online.is_none());
        assert!(records[2].online.is_some());

        let snapshot = scheduler.metrics().snapshot();
        assert_eq!(snapshot.submitted, 3);
        assert_eq!(snapshot.completed, 3);
    }

    #[test]
    fn test_cost_before_measurements_is_offline() {
        let observer = Arc::new(CollectingObserver::new());
        let (_, scheduler) = scheduler(&["k"], observer);
        let task = Task::new("k").with_dims(TaskDims::new_1d(1_000_000_000));
        // 0.5 + 1e9 / 1e9
        assert_eq!(scheduler.cost(&task).unwrap(), 1.5);
        assert!(scheduler.parameters("k").is_err());
    }

    #[test]
    fn test_unknown_configuration() {
        let observer = Arc::new(CollectingObserver::new());
        let (_, scheduler) = scheduler(&["k"], observer);
        assert!(matches!(
            scheduler.set_configuration("nope"),
            Err(Error::UnknownConfiguration(_))
        ));
        assert_eq!(scheduler.current_configuration().as_deref(), Some("cfg"));
    }

    #[test]
    fn test_insert_configuration_is_idempotent() {
        let observer = Arc::new(CollectingObserver::new());
        let (device, scheduler) = scheduler(&["k"], observer);
        let again =
            Configuration::from_binary(Arc::clone(&device), "cfg", &SimDevice::binary(&["other"]))
                .unwrap();
        let kept = scheduler.insert_configuration(again);
        assert_eq!(kept.program().entry_points(), &["k".to_string()]);
        assert_eq!(scheduler.configurations(), vec!["cfg".to_string()]);
    }
}
