//! Loaded hardware configurations (bitstream images).

use crate::config::Config;
use crate::device::DeviceBackend;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One loaded bitstream: its program and a lazily filled cache of compiled
/// kernels keyed by entry point.
pub struct Configuration<B: DeviceBackend> {
    name: String,
    backend: Arc<B>,
    program: B::Program,
    kernels: Mutex<HashMap<String, B::Kernel>>,
}

impl<B: DeviceBackend> Configuration<B> {
    /// Read `<kernels_dir>/<name>.<ext>` and build it. A missing file or a
    /// failed build leaves nothing behind.
    pub fn load(backend: Arc<B>, config: &Config, name: &str) -> Result<Self> {
        let path = config.binary_path(name);
        let binary = std::fs::read(&path).map_err(|e| {
            Error::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;

        let configuration = Self::from_binary(backend, name, &binary)?;
        tracing::info!(
            configuration = name,
            path = %path.display(),
            bytes = binary.len(),
            "loaded configuration"
        );
        Ok(configuration)
    }

    pub fn from_binary(backend: Arc<B>, name: &str, binary: &[u8]) -> Result<Self> {
        let program = backend.load_program(name, binary)?;
        Ok(Self {
            name: name.to_string(),
            backend,
            program,
            kernels: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &B::Program {
        &self.program
    }

    /// Cached kernel for `entry_point`, compiled on first request.
    pub fn kernel(&self, entry_point: &str) -> Result<B::Kernel> {
        let mut kernels = self.kernels.lock();
        if let Some(kernel) = kernels.get(entry_point) {
            return Ok(kernel.clone());
        }

        let kernel = self.backend.compile_kernel(&self.program, entry_point)?;
        tracing::debug!(
            configuration = %self.name,
            kernel = entry_point,
            "compiled kernel"
        );
        kernels.insert(entry_point.to_string(), kernel.clone());
        Ok(kernel)
    }

    pub fn cached_kernels(&self) -> usize {
        self.kernels.lock().len()
    }
}

impl<B: DeviceBackend> fmt::Debug for Configuration<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("name", &self.name)
            .field("cached_kernels", &self.cached_kernels())
            .finish()
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::device::SimDevice;

    fn write_binary(dir: &std::path::Path, name: &str, entries: &[&str]) {
        std::fs::write(dir.join(format!("{}.aocx", name)), SimDevice::binary(entries)).unwrap();
    }

    #[test]
    fn test_load_from_kernels_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_binary(dir.path(), "mmult_f_d", &["matrixMult", "matrixMultD"]);
        let config = Config::builder().kernels_dir(dir.path()).build().unwrap();

        let device = Arc::new(SimDevice::new());
        let configuration = Configuration::load(device, &config, "mmult_f_d").unwrap();
        assert_eq!(configuration.name(), "mmult_f_d");
        assert_eq!(configuration.program().entry_points().len(), 2);
    }

    #[test]
    fn test_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::builder().kernels_dir(dir.path()).build().unwrap();

        let device = Arc::new(SimDevice::new());
        let err = Configuration::load(device, &config, "nope").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_kernel_cache() {
        let device = Arc::new(SimDevice::new());
        let configuration =
            Configuration::from_binary(device, "p", &SimDevice::binary(&["a", "b"])).unwrap();

        assert_eq!(configuration.cached_kernels(), 0);
        let first = configuration.kernel("a").unwrap();
        let second = configuration.kernel("a").unwrap();
        assert_eq!(first, second);
        assert_eq!(configuration.cached_kernels(), 1);

        assert!(matches!(configuration.kernel("c"), Err(Error::Compile(_))));
        assert_eq!(configuration.cached_kernels(), 1);
    }
}
