//! Per-kernel execution queues.
//!
//! Every kernel name gets one [`ExecutionQueue`] with its own worker thread
//! and device command queue. Tasks on a queue run strictly one after the
//! other; queues for different kernels run concurrently.

pub mod execution;
pub mod state;

pub use execution::{CompletionCallback, ExecutionQueue};
pub use state::{QueueEvent, QueueState};
