//! Static per-kernel FLOP metrics and calibrated peak rates.

use std::collections::HashMap;
use std::fmt;

const GFLOPS: f64 = 1_000_000_000.0;

/// Maps a problem size (work items) to a floating-point operation count.
pub type FlopFn = fn(usize) -> f64;

/// `n` elements of a square matrix: `2 * side^3`.
pub fn matrix_mult(n: usize) -> f64 {
    let side = (n as f64).sqrt();
    2.0 * side * side * side
}

/// `a[i] = b[i] * c[i] + d[i]`
pub fn vector_triad(n: usize) -> f64 {
    2.0 * n as f64
}

/// Radix-2 FFT estimate, `5 n log2 n`.
pub fn fft(n: usize) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let n = n as f64;
    5.0 * n * n.log2()
}

/// One operation per work item.
pub fn unit(n: usize) -> f64 {
    n as f64
}

/// Offline calibration of one kernel on one configuration.
#[derive(Clone, Copy)]
pub struct KernelParams {
    /// Peak sustained FLOP/s.
    pub max_flops: f64,
    /// Fixed launch overhead in seconds.
    pub alpha: f64,
    pub flop: FlopFn,
}

impl KernelParams {
    pub fn new(max_flops: f64, flop: FlopFn) -> Self {
        Self {
            max_flops,
            alpha: 0.0,
            flop,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn flop(&self, work_items: usize) -> f64 {
        (self.flop)(work_items)
    }

    /// `alpha + flop(n) / max_flops`, in seconds.
    pub fn offline_cost(&self, work_items: usize) -> f64 {
        if self.max_flops <= 0.0 {
            return self.alpha;
        }
        self.alpha + self.flop(work_items) / self.max_flops
    }
}

impl Default for KernelParams {
    fn default() -> Self {
        Self::new(GFLOPS, unit)
    }
}

impl fmt::Debug for KernelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelParams")
            .field("max_flops", &self.max_flops)
            .field("alpha", &self.alpha)
            .finish()
    }
}

/// configuration name -> kernel name -> params
#[derive(Debug, Clone, Default)]
pub struct KernelTable {
    params: HashMap<String, HashMap<String, KernelParams>>,
}

impl KernelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand-calibrated peak rates of the matrix-multiply bitstreams.
    pub fn calibrated() -> Self {
        let mut table = Self::new();
        table.insert("mmult_f_d", "matrixMult", KernelParams::new(120.0 * GFLOPS, matrix_mult));
        table.insert("mmult_f_d", "matrixMultD", KernelParams::new(63.0 * GFLOPS, matrix_mult));
        table.insert("mmult_f_d2", "matrixMult", KernelParams::new(35.0 * GFLOPS, matrix_mult));
        table.insert("mmult_f_d2", "matrixMultD", KernelParams::new(72.0 * GFLOPS, matrix_mult));
        table
    }

    pub fn insert<C, K>(&mut self, configuration: C, kernel: K, params: KernelParams)
    where
        C: Into<String>,
        K: Into<String>,
    {
        self.params
            .entry(configuration.into())
            .or_default()
            .insert(kernel.into(), params);
    }

    pub fn get(&self, configuration: &str, kernel: &str) -> Option<&KernelParams> {
        self.params.get(configuration)?.get(kernel)
    }

    /// Like [`get`](Self::get) but never fails; unknown pairs get
    /// [`KernelParams::default`].
    pub fn params_or_default(&self, configuration: &str, kernel: &str) -> KernelParams {
        match self.get(configuration, kernel) {
            Some(params) => *params,
            None => {
                tracing::debug!(configuration, kernel, "no calibration, using defaults");
                KernelParams::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.params.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flop_functions() {
        assert_eq!(matrix_mult(16), 128.0);
        assert_eq!(vector_triad(10), 20.0);
        assert_eq!(fft(8), 120.0);
        assert_eq!(fft(1), 0.0);
        assert_eq!(unit(3), 3.0);
    }

    #[test]
    fn test_calibrated_table() {
        let table = KernelTable::calibrated();
        assert_eq!(table.len(), 4);

        let params = table.get("mmult_f_d", "matrixMult").unwrap();
        assert_eq!(params.max_flops, 120.0 * GFLOPS);
        assert_eq!(params.flop(1024 * 1024), 2.0 * 1024.0 * 1024.0 * 1024.0);

        assert!(table.get("mmult_f_d2", "vector_triad").is_none());
    }

    #[test]
    fn test_offline_cost() {
        let params = KernelParams::new(100.0, unit).with_alpha(0.5);
        assert_eq!(params.offline_cost(50), 1.0);

        let table = KernelTable::new();
        let fallback = table.params_or_default("x", "y");
        assert_eq!(fallback.offline_cost(1_000_000_000), 1.0);
    }
}
