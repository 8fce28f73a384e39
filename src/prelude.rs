pub use crate::config::{Config, ConfigBuilder};
pub use crate::configuration::Configuration;
pub use crate::device::{Completion, CompletionSignal, DeviceBackend};
pub use crate::error::{Error, Result};
pub use crate::model::{CostModel, KernelParams, KernelTable, Measurement, Parameters, Prediction};
pub use crate::scheduler::{Scheduler, SchedulerBuilder};
pub use crate::task::{NdRange, RandomTasks, Task, TaskDims, TaskId};
pub use crate::telemetry::{
    CollectingObserver, CompletionObserver, CompletionRecord, JsonLinesObserver, Metrics,
    MetricsSnapshot, TracingObserver,
};

#[cfg(feature = "sim")]
pub use crate::device::SimDevice;
