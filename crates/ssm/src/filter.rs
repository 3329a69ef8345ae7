//! Kalman filter with per-dimension missing data.
//!
//! Each step predicts from the previous filtered state and then updates on
//! the present observation dimensions only. The innovation covariance is
//! Cholesky-factorised and solved against; it is never inverted. The
//! observed-data log-likelihood is accumulated by prediction error
//! decomposition as a by-product.

use std::f64::consts::PI;

use ndarray::{Array2, ArrayView1};
use tracing::debug;

use crate::error::{CovarianceStage, SsmError};
use crate::linalg::{self, Spd};
use crate::model::StateSpaceModel;
use crate::observation::Observations;
use crate::state::GaussianState;

/// Output of [`filter`]: one predicted and one filtered state per step.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterResult {
    predicted: Vec<GaussianState>,
    filtered: Vec<GaussianState>,
    log_likelihoods: Vec<f64>,
}

impl FilterResult {
    /// One-step-ahead predicted states `x[t | t-1]`.
    pub fn predicted(&self) -> &[GaussianState] {
        &self.predicted
    }

    /// Filtered states `x[t | t]`.
    pub fn filtered(&self) -> &[GaussianState] {
        &self.filtered
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.filtered.len()
    }

    /// Returns `true` if the result holds no steps.
    pub fn is_empty(&self) -> bool {
        self.filtered.is_empty()
    }

    /// Log-likelihood contribution of each step (0 for all-missing steps).
    pub fn step_log_likelihoods(&self) -> &[f64] {
        &self.log_likelihoods
    }

    /// Observed-data log-likelihood of the whole sequence.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihoods.iter().sum()
    }

    /// Filtered means as a `T × n` array.
    pub fn filtered_means(&self) -> Array2<f64> {
        stack_means(&self.filtered)
    }

    /// Predicted means as a `T × n` array.
    pub fn predicted_means(&self) -> Array2<f64> {
        stack_means(&self.predicted)
    }
}

pub(crate) fn stack_means(states: &[GaussianState]) -> Array2<f64> {
    let n = states.first().map_or(0, GaussianState::dim);
    Array2::from_shape_fn((states.len(), n), |(t, j)| states[t].mean()[j])
}

/// Propagates a state one step through the transition equation.
///
/// `mean = A·x + b`, `cov = A·P·Aᵀ + Q`.
pub fn predict(model: &StateSpaceModel, state: &GaussianState) -> GaussianState {
    let a = model.transition_matrix();
    let mean = a.dot(state.mean()) + model.transition_offsets();
    let cov = a.dot(state.covariance()).dot(&a.t()) + model.transition_covariance();
    GaussianState::new(mean, linalg::symmetrize(&cov))
}

/// Conditions a predicted state on the present dimensions of one
/// observation row.
///
/// Returns the filtered state and the step's log-likelihood contribution.
/// With no present dimension the predicted state is returned unchanged
/// and the contribution is 0.
///
/// # Errors
///
/// Returns [`SsmError::Configuration`] if `predicted` does not match the
/// model's state dimension, `row` does not match its observation
/// dimension, or a `present` index is out of range.
///
/// Returns [`SsmError::SingularCovariance`] (stage `Innovation`) if the
/// innovation covariance of the present dimensions is not positive
/// definite. The time index of the error is 0; [`filter`] stamps the
/// actual step.
pub fn update(
    model: &StateSpaceModel,
    predicted: &GaussianState,
    row: ArrayView1<'_, f64>,
    present: &[usize],
) -> Result<(GaussianState, f64), SsmError> {
    let n = model.state_dim();
    let m = model.obs_dim();
    if predicted.dim() != n || predicted.covariance().dim() != (n, n) {
        return Err(SsmError::config(format!(
            "predicted state has dimension {}, model state dimension is {n}",
            predicted.dim()
        )));
    }
    if row.len() != m {
        return Err(SsmError::config(format!(
            "observation row has {} entries, model observation dimension is {m}",
            row.len()
        )));
    }
    if let Some(&d) = present.iter().find(|&&d| d >= m) {
        return Err(SsmError::config(format!(
            "present dimension {d} out of range for {m} observed maturities"
        )));
    }
    if present.is_empty() {
        return Ok((predicted.clone(), 0.0));
    }

    let c_k = linalg::select_rows(model.observation_matrix(), present);
    let d_k = linalg::select_vec(model.observation_offsets().view(), present);
    let r_k = linalg::select(model.observation_covariance(), present, present);
    let y_k = linalg::select_vec(row, present);

    let p = predicted.covariance();
    let innovation = y_k - (c_k.dot(predicted.mean()) + d_k);

    // C·P is k×n; S = C·P·Cᵀ + R.
    let cp = c_k.dot(p);
    let s = linalg::symmetrize(&(cp.dot(&c_k.t()) + r_k));
    let s_chol = Spd::factor(&s).ok_or(SsmError::singular(CovarianceStage::Innovation))?;

    // Kᵀ = S⁻¹·C·P since P and S are symmetric.
    let gain_t = s_chol.solve(&cp);
    let mean = predicted.mean() + gain_t.t().dot(&innovation);
    let cov = linalg::symmetrize(&(p - gain_t.t().dot(&cp)));

    let weighted = s_chol.solve_vec(&innovation);
    let k = present.len() as f64;
    let log_likelihood =
        -0.5 * (k * (2.0 * PI).ln() + s_chol.ln_det() + innovation.dot(&weighted));

    Ok((GaussianState::new(mean, cov), log_likelihood))
}

/// Runs the Kalman filter over a full observation sequence.
///
/// Time steps are zero-based: step 0 is predicted from the pre-sample
/// state `N(μ₀, Σ₀)`.
///
/// # Errors
///
/// | Variant | Trigger |
/// |---------|---------|
/// | [`SsmError::Configuration`] | no time steps, or observation width ≠ `model.obs_dim()` |
/// | [`SsmError::SingularCovariance`] | innovation covariance not positive definite |
#[tracing::instrument(level = "debug", skip_all, fields(n_steps = observations.n_steps()))]
pub fn filter(
    model: &StateSpaceModel,
    observations: &Observations,
) -> Result<FilterResult, SsmError> {
    check_observations(model, observations)?;

    let n_steps = observations.n_steps();
    let mut predicted = Vec::with_capacity(n_steps);
    let mut filtered = Vec::with_capacity(n_steps);
    let mut log_likelihoods = Vec::with_capacity(n_steps);

    let mut state = model.initial_state();
    for t in 0..n_steps {
        let pred = predict(model, &state);
        let present = observations.present_dims(t);
        let (post, ll) = update(model, &pred, observations.row(t), &present)
            .map_err(|e| e.at_step(t))?;
        predicted.push(pred);
        filtered.push(post.clone());
        log_likelihoods.push(ll);
        state = post;
    }

    let result = FilterResult {
        predicted,
        filtered,
        log_likelihoods,
    };
    debug!(log_likelihood = result.log_likelihood(), "filter pass complete");
    Ok(result)
}

pub(crate) fn check_observations(
    model: &StateSpaceModel,
    observations: &Observations,
) -> Result<(), SsmError> {
    if observations.n_steps() == 0 {
        return Err(SsmError::config("observation sequence is empty"));
    }
    if observations.n_dims() != model.obs_dim() {
        return Err(SsmError::config(format!(
            "observation width {} does not match model observation dimension {}",
            observations.n_dims(),
            model.obs_dim()
        )));
    }
    Ok(())
}
