//! Units of work submitted to the scheduler.

pub mod dims;
pub mod generator;
pub mod task;

pub use dims::{NdRange, TaskDims};
pub use generator::RandomTasks;
pub use task::{KernelGenerator, Task, TaskId};
