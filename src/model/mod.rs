//! Execution cost forecasting.
//!
//! Each configuration owns a [`CostModel`] that collects (flop, duration)
//! samples per kernel and fits `duration = alpha + beta * flop` by least
//! squares. Until a kernel has two distinct samples the model answers from
//! the static [`KernelTable`] instead.

pub mod cost;
pub mod params;
pub mod regression;

pub use cost::{CostModel, Prediction};
pub use params::{fft, matrix_mult, unit, vector_triad, FlopFn, KernelParams, KernelTable};
pub use regression::{linreg, simple_linreg, Measurement, Parameters};
