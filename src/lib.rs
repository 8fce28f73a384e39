//! forecast - adaptive task scheduling for reconfigurable accelerators
//!
//! Routes compute kernels to per-kernel in-order execution queues on top of
//! an abstract device backend, and forecasts the cost of queued work with a
//! per-configuration linear model refined from every completed task.
//!
//! # Quick Start
//!
//! ```no_run
//! use forecast_rs::prelude::*;
//! use std::sync::Arc;
//!
//! forecast_rs::telemetry::init_logging("info");
//!
//! let device = Arc::new(SimDevice::new());
//! let scheduler = Scheduler::new(device, Config::default()).unwrap();
//!
//! // reads ../kernels/mmult_f_d.aocx
//! scheduler.add_configuration("mmult_f_d").unwrap();
//! for n in [64, 128, 256] {
//!     let task = Task::new("matrixMult").with_dims(TaskDims::new_2d([n, n], [16, 16]));
//!     scheduler.add_task(task).unwrap();
//! }
//! scheduler.finish().unwrap();
//! ```
//!
//! # Features
//!
//! - **Per-kernel queues**: FIFO, one task in flight per kernel name
//! - **Reconfiguration**: switch the active bitstream between submissions
//! - **Cost forecasting**: online least-squares fit with an offline fallback
//! - **Observers**: completion records to `tracing`, JSON lines, or memory
//! - **Simulated device**: a threaded in-process backend (`sim` feature)

#![warn(missing_debug_implementations)]

pub mod config;
pub mod configuration;
pub mod device;
pub mod error;
pub mod model;
pub mod prelude;
pub mod queue;
pub mod scheduler;
pub mod task;
pub mod telemetry;

pub use config::{Config, ConfigBuilder};
pub use configuration::Configuration;
pub use device::DeviceBackend;
pub use error::{Error, Result};
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use task::{Task, TaskDims, TaskId};
