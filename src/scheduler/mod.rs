//! Routing of tasks to per-kernel execution queues.
//!
//! The [`Scheduler`] owns every loaded configuration and its cost model,
//! hands out task IDs, and creates one execution queue per kernel name on
//! first use. Completions come back through `task_done` on the queue's
//! worker thread, where they are turned into measurements and forwarded to
//! the registered observers.

mod builder;
mod scheduler;

pub use builder::SchedulerBuilder;
pub use scheduler::Scheduler;
