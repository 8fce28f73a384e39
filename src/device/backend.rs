//! The device seam: everything the scheduler needs from the accelerator
//! runtime and nothing more.

use super::completion::Completion;
use crate::error::Result;
use crate::task::TaskDims;

/// Trait for accelerator runtimes (OpenCL, vendor SDKs, simulators).
///
/// Implementations report failures as [`Error::Configuration`] for program
/// loads, [`Error::Compile`] for missing entry points and [`Error::Device`]
/// for submission or execution faults.
///
/// [`Error::Configuration`]: crate::error::Error::Configuration
/// [`Error::Compile`]: crate::error::Error::Compile
/// [`Error::Device`]: crate::error::Error::Device
pub trait DeviceBackend: Send + Sync + 'static {
    /// A built program (one bitstream image).
    type Program: Send + Sync + 'static;

    /// A kernel ready for dispatch. Cloned out of the configuration's cache
    /// for every dispatch, so argument binding never mutates shared state.
    type Kernel: Clone + Send + 'static;

    /// An in-order device submission queue.
    type Queue: Send + 'static;

    /// Build a program from a binary image.
    fn load_program(&self, name: &str, binary: &[u8]) -> Result<Self::Program>;

    /// Look up and compile an entry point of `program`.
    fn compile_kernel(&self, program: &Self::Program, entry_point: &str) -> Result<Self::Kernel>;

    fn create_queue(&self) -> Result<Self::Queue>;

    /// Submit without blocking. The returned [`Completion`] resolves when the
    /// device has finished (or failed) the launch.
    fn submit(&self, queue: &Self::Queue, kernel: Self::Kernel, dims: &TaskDims)
        -> Result<Completion>;
}
