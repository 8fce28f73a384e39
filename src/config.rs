use crate::error::{Error, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the bitstream binaries.
    pub kernels_dir: PathBuf,
    pub binary_extension: String,

    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,

    /// How many measurements the offline estimate is worth when the hybrid
    /// prediction blends it with the online fit.
    pub hybrid_prior: f64,

    pub log_completions: bool,
    pub log_costs: bool,
    pub measurement_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kernels_dir: PathBuf::from("../kernels"),
            binary_extension: "aocx".to_string(),
            thread_name_prefix: "forecast-queue".to_string(),
            stack_size: Some(2 * 1024 * 1024),
            hybrid_prior: 4.0,
            log_completions: true,
            log_costs: true,
            measurement_log: None,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.binary_extension.is_empty() {
            return Err(Error::config("binary_extension must not be empty"));
        }

        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        if let Some(size) = self.stack_size {
            if size == 0 {
                return Err(Error::config("stack_size must be > 0"));
            }
        }

        if !self.hybrid_prior.is_finite() || self.hybrid_prior < 0.0 {
            return Err(Error::config("hybrid_prior must be finite and >= 0"));
        }

        Ok(())
    }

    /// `<kernels_dir>/<name>.<ext>`
    pub fn binary_path(&self, name: &str) -> PathBuf {
        self.kernels_dir
            .join(format!("{}.{}", name, self.binary_extension))
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn kernels_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.kernels_dir = dir.into();
        self
    }

    pub fn binary_extension<S: Into<String>>(mut self, ext: S) -> Self {
        self.config.binary_extension = ext.into();
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn hybrid_prior(mut self, prior: f64) -> Self {
        self.config.hybrid_prior = prior;
        self
    }

    pub fn log_completions(mut self, enable: bool) -> Self {
        self.config.log_completions = enable;
        self
    }

    pub fn log_costs(mut self, enable: bool) -> Self {
        self.config.log_costs = enable;
        self
    }

    pub fn measurement_log<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.measurement_log = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
