//! Gaussian belief over the latent factors at one time step.

use ndarray::{Array1, Array2};

/// Mean and covariance of the latent state at one time step.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianState {
    mean: Array1<f64>,
    covariance: Array2<f64>,
}

impl GaussianState {
    /// Creates a state from its mean and covariance.
    ///
    /// Shapes are not checked here; every state built inside the crate
    /// comes from a validated model.
    pub fn new(mean: Array1<f64>, covariance: Array2<f64>) -> Self {
        Self { mean, covariance }
    }

    /// State mean.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// State covariance.
    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// State dimension.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}
