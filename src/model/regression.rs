//! Ordinary least squares over (work, duration) samples.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One observation: `x` is the flop metric, `y` the duration in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub x: f64,
    pub y: f64,
}

impl Measurement {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// `y = alpha + beta * x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub alpha: f64,
    pub beta: f64,
}

impl Parameters {
    pub fn predict(&self, x: f64) -> f64 {
        self.alpha + self.beta * x
    }
}

/// Fit intercept and slope. Needs at least two samples with distinct `x`.
pub fn linreg(kernel: &str, samples: &[Measurement]) -> Result<Parameters> {
    if samples.len() < 2 {
        return Err(Error::underflow(kernel, samples.len()));
    }

    let n = samples.len() as f64;
    let x_mean = samples.iter().map(|m| m.x).sum::<f64>() / n;
    let y_mean = samples.iter().map(|m| m.y).sum::<f64>() / n;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for m in samples {
        let dx = m.x - x_mean;
        sxy += dx * (m.y - y_mean);
        sxx += dx * dx;
    }

    if sxx <= 0.0 || !sxx.is_finite() {
        return Err(Error::underflow(kernel, distinct_x(samples)));
    }

    let beta = sxy / sxx;
    let alpha = y_mean - beta * x_mean;
    if !alpha.is_finite() || !beta.is_finite() {
        return Err(Error::underflow(kernel, distinct_x(samples)));
    }

    Ok(Parameters { alpha, beta })
}

/// Slope-only fit through the origin, `beta = Σxy / Σx²`.
pub fn simple_linreg(kernel: &str, samples: &[Measurement]) -> Result<Parameters> {
    let sxx: f64 = samples.iter().map(|m| m.x * m.x).sum();
    let sxy: f64 = samples.iter().map(|m| m.x * m.y).sum();

    if sxx <= 0.0 || !sxx.is_finite() {
        return Err(Error::underflow(kernel, samples.len()));
    }

    Ok(Parameters {
        alpha: 0.0,
        beta: sxy / sxx,
    })
}

fn distinct_x(samples: &[Measurement]) -> usize {
    let mut xs: Vec<f64> = samples.iter().map(|m| m.x).collect();
    xs.sort_by(|a, b| a.total_cmp(b));
    xs.dedup();
    xs.len()
}
