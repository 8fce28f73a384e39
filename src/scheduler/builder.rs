use super::scheduler::Scheduler;
use crate::config::Config;
use crate::device::DeviceBackend;
use crate::error::Result;
use crate::model::KernelTable;
use crate::telemetry::{CompletionObserver, JsonLinesObserver, TracingObserver};
use std::fmt;
use std::sync::Arc;

pub struct SchedulerBuilder<B: DeviceBackend> {
    backend: Arc<B>,
    config: Config,
    kernels: KernelTable,
    observers: Vec<Arc<dyn CompletionObserver>>,
}

impl<B: DeviceBackend> SchedulerBuilder<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            config: Config::default(),
            kernels: KernelTable::calibrated(),
            observers: Vec::new(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replace the offline table. Defaults to [`KernelTable::calibrated`].
    pub fn kernels(mut self, kernels: KernelTable) -> Self {
        self.kernels = kernels;
        self
    }

    pub fn observer<O>(mut self, observer: Arc<O>) -> Self
    where
        O: CompletionObserver + 'static,
    {
        self.observers.push(observer);
        self
    }

    /// Validates the config, then adds the logging observer and the
    /// measurement log if the config asks for them.
    pub fn build(self) -> Result<Scheduler<B>> {
        self.config.validate()?;

        let mut observers = self.observers;
        if self.config.log_completions {
            observers.push(Arc::new(TracingObserver));
        }
        if let Some(path) = &self.config.measurement_log {
            let log = JsonLinesObserver::create(path)?;
            tracing::info!(path = %path.display(), "writing measurement log");
            observers.push(Arc::new(log));
        }

        Ok(Scheduler::from_parts(
            self.backend,
            self.config,
            Arc::new(self.kernels),
            observers,
        ))
    }
}

impl<B: DeviceBackend> fmt::Debug for SchedulerBuilder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("kernels", &self.kernels.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}
