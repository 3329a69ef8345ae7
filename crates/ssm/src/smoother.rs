//! Rauch-Tung-Striebel fixed-interval smoother.
//!
//! Runs backward over a [`FilterResult`] so that every step is conditioned
//! on the full sample. The recursion is carried one step past the first
//! observation to the pre-sample state, and the lag-one cross covariances
//! `Cov(x[t+1], x[t] | Y)` are produced along the way for the EM E-step.

use ndarray::Array2;
use tracing::debug;

use crate::error::{CovarianceStage, SsmError};
use crate::filter::{self, FilterResult, stack_means};
use crate::linalg::{self, Spd};
use crate::model::StateSpaceModel;
use crate::observation::Observations;
use crate::state::GaussianState;

/// Smoothed pre-sample state and its cross covariance with step 0.
#[derive(Clone, Debug, PartialEq)]
pub struct PreSample {
    /// `x[-1] | Y`, the smoothed belief about the state before step 0.
    pub state: GaussianState,
    /// `Cov(x[0], x[-1] | Y)`.
    pub cross_covariance: Array2<f64>,
}

/// Output of [`smooth`].
#[derive(Clone, Debug, PartialEq)]
pub struct SmoothResult {
    smoothed: Vec<GaussianState>,
    cross_covariances: Vec<Array2<f64>>,
    pre_sample: Option<PreSample>,
}

impl SmoothResult {
    /// Smoothed states `x[t] | Y`.
    pub fn smoothed(&self) -> &[GaussianState] {
        &self.smoothed
    }

    /// Smoothed means as a `T × n` array.
    pub fn smoothed_means(&self) -> Array2<f64> {
        stack_means(&self.smoothed)
    }

    /// Lag-one cross covariances; element `t` is `Cov(x[t+1], x[t] | Y)`,
    /// so there are `T − 1` of them.
    pub fn cross_covariances(&self) -> &[Array2<f64>] {
        &self.cross_covariances
    }

    /// Smoothed pre-sample state, or `None` when the predicted covariance
    /// of step 0 could not be factorised.
    pub fn pre_sample(&self) -> Option<&PreSample> {
        self.pre_sample.as_ref()
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.smoothed.len()
    }

    /// Returns `true` if the result holds no steps.
    pub fn is_empty(&self) -> bool {
        self.smoothed.is_empty()
    }
}

/// One backward step: the smoothed state at `t` from the filtered state
/// at `t`, and the predicted and smoothed states at `t + 1`.
///
/// Returns the smoothed state and `Cov(x[t+1], x[t] | Y)`.
fn backward_step(
    a: &Array2<f64>,
    filtered: &GaussianState,
    predicted_next: &GaussianState,
    smoothed_next: &GaussianState,
) -> Option<(GaussianState, Array2<f64>)> {
    let pred_chol = Spd::factor(predicted_next.covariance())?;
    // Jᵀ = P⁻¹[t+1|t] · A · P[t|t]
    let gain = pred_chol.solve(&a.dot(filtered.covariance())).reversed_axes();

    let mean = filtered.mean() + gain.dot(&(smoothed_next.mean() - predicted_next.mean()));
    let cov_delta = smoothed_next.covariance() - predicted_next.covariance();
    let cov = linalg::symmetrize(&(filtered.covariance() + gain.dot(&cov_delta).dot(&gain.t())));
    let cross = smoothed_next.covariance().dot(&gain.t());
    Some((GaussianState::new(mean, cov), cross))
}

/// Runs the RTS smoother over a filter result.
///
/// # Errors
///
/// Returns [`SsmError::Configuration`] if the filter result is empty or
/// was produced under a model with a different state dimension.
///
/// Returns [`SsmError::SingularCovariance`] (stage `Predicted`) when a
/// predicted covariance `P[t+1|t]`, `t + 1 ≥ 1`, is not positive definite.
/// A singular predicted covariance at step 0 only drops the pre-sample
/// state.
#[tracing::instrument(level = "debug", skip_all, fields(n_steps = filtered.len()))]
pub fn smooth(
    model: &StateSpaceModel,
    filtered: &FilterResult,
) -> Result<SmoothResult, SsmError> {
    let n_steps = filtered.len();
    if n_steps == 0 {
        return Err(SsmError::config("filter result is empty"));
    }
    let a = model.transition_matrix();
    let pred = filtered.predicted();
    let filt = filtered.filtered();
    let n = model.state_dim();
    if let Some(bad) = filt.iter().chain(pred).find(|s| s.dim() != n) {
        return Err(SsmError::config(format!(
            "filter result has state dimension {}, model state dimension is {n}",
            bad.dim()
        )));
    }

    let mut smoothed = filt.to_vec();
    let mut cross_covariances = vec![Array2::zeros((n, n)); n_steps - 1];

    for t in (0..n_steps - 1).rev() {
        let (state, cross) = backward_step(a, &filt[t], &pred[t + 1], &smoothed[t + 1])
            .ok_or_else(|| SsmError::singular(CovarianceStage::Predicted).at_step(t + 1))?;
        smoothed[t] = state;
        cross_covariances[t] = cross;
    }

    let pre_sample = backward_step(a, &model.initial_state(), &pred[0], &smoothed[0])
        .map(|(state, cross_covariance)| PreSample {
            state,
            cross_covariance,
        });
    if pre_sample.is_none() {
        debug!("step 0 predicted covariance is singular; pre-sample state not smoothed");
    }

    Ok(SmoothResult {
        smoothed,
        cross_covariances,
        pre_sample,
    })
}

/// Filters and then smooths in one call.
///
/// # Errors
///
/// Propagates the errors of [`filter::filter`] and [`smooth`].
pub fn filter_and_smooth(
    model: &StateSpaceModel,
    observations: &Observations,
) -> Result<(FilterResult, SmoothResult), SsmError> {
    let filtered = filter::filter(model, observations)?;
    let smoothed = smooth(model, &filtered)?;
    Ok((filtered, smoothed))
}
