use super::params::{KernelParams, KernelTable};
use super::regression::{self, Measurement, Parameters};
use crate::device::DeviceBackend;
use crate::error::Result;
use crate::task::Task;
use std::collections::HashMap;
use std::sync::Arc;

/// The three duration estimates for one task, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub flop: f64,
    /// `None` until the kernel has a well-conditioned fit.
    pub online: Option<f64>,
    pub offline: f64,
    pub hybrid: f64,
}

/// Per-configuration cost model: measurements per kernel, refit on demand.
#[derive(Debug, Clone)]
pub struct CostModel {
    configuration: String,
    kernels: Arc<KernelTable>,
    hybrid_prior: f64,
    measurements: HashMap<String, Vec<Measurement>>,
}

impl CostModel {
    pub fn new<S: Into<String>>(configuration: S, kernels: Arc<KernelTable>) -> Self {
        Self {
            configuration: configuration.into(),
            kernels,
            hybrid_prior: 4.0,
            measurements: HashMap::new(),
        }
    }

    pub fn with_hybrid_prior(mut self, prior: f64) -> Self {
        self.hybrid_prior = prior;
        self
    }

    pub fn configuration(&self) -> &str {
        &self.configuration
    }

    pub fn params(&self, kernel: &str) -> KernelParams {
        self.kernels.params_or_default(&self.configuration, kernel)
    }

    pub fn flop<B: DeviceBackend>(&self, task: &Task<B>) -> f64 {
        self.params(task.kernel_name()).flop(task.dims().work_items())
    }

    /// Record a sample for the task's kernel and return the refreshed fit,
    /// if there is one yet.
    pub fn add_measurement<B: DeviceBackend>(
        &mut self,
        task: &Task<B>,
        measurement: Measurement,
    ) -> Option<Parameters> {
        self.record(task.kernel_name(), measurement);
        self.kernel_linreg(task.kernel_name()).ok()
    }

    pub fn record(&mut self, kernel: &str, measurement: Measurement) {
        self.measurements
            .entry(kernel.to_string())
            .or_default()
            .push(measurement);
    }

    pub fn samples(&self, kernel: &str) -> usize {
        self.measurements.get(kernel).map_or(0, Vec::len)
    }

    pub fn measurements(&self, kernel: &str) -> &[Measurement] {
        self.measurements
            .get(kernel)
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn linreg<B: DeviceBackend>(&self, task: &Task<B>) -> Result<Parameters> {
        self.kernel_linreg(task.kernel_name())
    }

    /// Fails with `ModelUnderflow` below two distinct samples.
    pub fn kernel_linreg(&self, kernel: &str) -> Result<Parameters> {
        regression::linreg(kernel, self.measurements(kernel))
    }

    pub fn simple_linreg(&self, kernel: &str) -> Result<Parameters> {
        regression::simple_linreg(kernel, self.measurements(kernel))
    }

    pub fn offline_cost<B: DeviceBackend>(&self, task: &Task<B>) -> f64 {
        self.params(task.kernel_name())
            .offline_cost(task.dims().work_items())
    }

    pub fn online_cost<B: DeviceBackend>(&self, task: &Task<B>) -> Option<f64> {
        let params = self.linreg(task).ok()?;
        Some(params.predict(self.flop(task)))
    }

    pub fn predict<B: DeviceBackend>(&self, task: &Task<B>) -> Prediction {
        self.predict_kernel(task.kernel_name(), task.dims().work_items())
    }

    pub fn predict_kernel(&self, kernel: &str, work_items: usize) -> Prediction {
        let params = self.params(kernel);
        let flop = params.flop(work_items);
        let offline = params.offline_cost(work_items);
        let online = self
            .kernel_linreg(kernel)
            .ok()
            .map(|fit| fit.predict(flop));

        let hybrid = match online {
            Some(online) => {
                let n = self.samples(kernel) as f64;
                let weight = n / (n + self.hybrid_prior);
                weight * online + (1.0 - weight) * offline
            }
            None => offline,
        };

        Prediction {
            flop,
            online,
            offline,
            hybrid,
        }
    }

    /// Guarded cost: the online fit when available, the offline table
    /// otherwise. Never negative.
    pub fn cost<B: DeviceBackend>(&self, task: &Task<B>) -> f32 {
        let prediction = self.predict(task);
        let seconds = prediction.online.unwrap_or(prediction.offline);
        seconds.max(0.0) as f32
    }

    pub fn total_cost<'a, B, I>(&self, tasks: I) -> f32
    where
        B: DeviceBackend,
        I: IntoIterator<Item = &'a Task<B>>,
    {
        tasks.into_iter().map(|task| self.cost(task)).sum()
    }

    pub fn clear(&mut self) {
        self.measurements.clear();
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::device::SimDevice;
    use crate::model::params::{unit, vector_triad};
    use crate::task::TaskDims;

    fn table() -> Arc<KernelTable> {
        let mut table = KernelTable::new();
        table.insert("cfg", "triad", KernelParams::new(1000.0, vector_triad).with_alpha(0.25));
        table.insert("cfg", "line", KernelParams::new(1.0, unit));
        Arc::new(table)
    }

    fn task(kernel: &str, n: usize) -> Task<SimDevice> {
        Task::new(kernel).with_dims(TaskDims::new_1d(n))
    }

    #[test]
    fn test_cost_without_measurements_is_offline() {
        let model = CostModel::new("cfg", table());
        let t = task("triad", 500);
        // 0.25 + 1000 / 1000
        assert_eq!(model.cost(&t), 1.25f32);
        assert_eq!(model.offline_cost(&t), 1.25);
        assert!(model.online_cost(&t).is_none());
    }

    #[test]
    fn test_single_sample_falls_back() {
        let mut model = CostModel::new("cfg", table());
        let t = task("triad", 500);
        assert!(model.add_measurement(&t, Measurement::new(1000.0, 9.0)).is_none());

        let cost = model.cost(&t);
        assert!(cost.is_finite());
        assert_eq!(cost, 1.25f32);
        let prediction = model.predict(&t);
        assert_eq!(prediction.hybrid, prediction.offline);
    }

    #[test]
    fn test_online_fit_takes_over() {
        let mut model = CostModel::new("cfg", table());
        for &(x, y) in &[(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)] {
            model.record("line", Measurement::new(x, y));
        }

        let fit = model.kernel_linreg("line").unwrap();
        assert!(fit.alpha.abs() < 1e-6);
        assert!((fit.beta - 2.0).abs() < 1e-6);

        let t = task("line", 10);
        let prediction = model.predict(&t);
        assert!((prediction.online.unwrap() - 20.0).abs() < 1e-6);
        assert_eq!(prediction.offline, 10.0);
        // three samples against a prior of four
        let expected = 3.0 / 7.0 * 20.0 + 4.0 / 7.0 * 10.0;
        assert!((prediction.hybrid - expected).abs() < 1e-6);
        assert!((model.cost(&t) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_total_cost() {
        let model = CostModel::new("cfg", table());
        let tasks = vec![task("line", 2), task("line", 3), task("unknown", 1_000_000_000)];
        assert!((model.total_cost(&tasks) - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_cost_is_clamped() {
        let mut model = CostModel::new("cfg", table());
        model.record("line", Measurement::new(1.0, -5.0));
        model.record("line", Measurement::new(2.0, -10.0));
        assert_eq!(model.cost(&task("line", 4)), 0.0);
    }

    #[test]
    fn test_samples_and_clear() {
        let mut model = CostModel::new("cfg", table());
        model.record("line", Measurement::new(1.0, 1.0));
        assert_eq!(model.samples("line"), 1);
        assert_eq!(model.samples("other"), 0);
        assert!(model.simple_linreg("line").is_ok());
        model.clear();
        assert_eq!(model.measurements("line").len(), 0);
    }
}
