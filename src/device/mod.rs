pub mod backend;
pub mod completion;

#[cfg(feature = "sim")]
pub mod sim;

pub use backend::DeviceBackend;
pub use completion::{completion, Completion, CompletionSignal};

#[cfg(feature = "sim")]
pub use sim::{SimDevice, SimExecution, SimKernel, SimProgram, SimQueue};
