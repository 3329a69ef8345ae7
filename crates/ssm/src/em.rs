//! Expectation-maximisation for the model parameters.
//!
//! Each iteration smooths the data under the current parameters
//! (E-step), accumulates the expected sufficient statistics, and updates
//! the learnable parameters in closed form (M-step). The updates are
//! conditional maximisations in the order `A, b, Q, d, R, μ₀, Σ₀`, each
//! using the values already updated in the same iteration, so the
//! observed-data log-likelihood never decreases in exact arithmetic.
//!
//! ```text
//! Initialize ──> EStep ──> MStep ──> EStep ──> ... ──> Terminate
//!                  │                   │
//!                  └── n_iter reached or tolerance met ──┘
//! ```
//!
//! Missing observation dimensions are handled exactly: the residual
//! `v = y − C·x − d` of a missing dimension is replaced by its conditional
//! moments given the present dimensions of the same step.

use std::fmt;

use ndarray::{Array1, Array2};
use tracing::{debug, info, info_span, warn};

use crate::config::{EmConfig, EmParam};
use crate::error::{CovarianceStage, SsmError};
use crate::filter::check_observations;
use crate::linalg::{self, Spd, outer};
use crate::model::StateSpaceModel;
use crate::observation::Observations;
use crate::smoother::{SmoothResult, filter_and_smooth};
use crate::state::GaussianState;

/// Relative slack before a log-likelihood drop is reported.
const LIKELIHOOD_SLACK: f64 = 1e-9;

/// Phase of an EM run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmPhase {
    /// Inputs not yet checked.
    Initialize,
    /// Next step smooths under the current model.
    EStep,
    /// Next step updates the model from the last E-step.
    MStep,
    /// Run finished; further steps are no-ops.
    Terminate,
}

/// Something that went numerically wrong during EM without stopping it.
#[derive(Debug, Clone, PartialEq)]
pub enum EmDiagnostic {
    /// The log-likelihood after an M-step fell below the previous one by more
    /// than rounding.
    LikelihoodDecreased {
        /// 1-based iteration whose M-step produced the drop.
        iteration: usize,
        /// Log-likelihood before the M-step.
        previous: f64,
        /// Log-likelihood after the M-step.
        current: f64,
    },
    /// An updated covariance had a negative eigenvalue and was clamped to
    /// the nearest PSD matrix.
    CovarianceClamped {
        /// 1-based iteration of the M-step.
        iteration: usize,
        /// Covariance that was clamped.
        parameter: EmParam,
        /// Smallest eigenvalue before clamping.
        min_eigenvalue: f64,
    },
}

impl EmDiagnostic {
    /// 1-based iteration the diagnostic belongs to.
    pub fn iteration(&self) -> usize {
        match self {
            EmDiagnostic::LikelihoodDecreased { iteration, .. }
            | EmDiagnostic::CovarianceClamped { iteration, .. } => *iteration,
        }
    }

    fn into_error(self) -> SsmError {
        SsmError::NumericalDivergence {
            iteration: self.iteration(),
            reason: self.to_string(),
        }
    }
}

impl fmt::Display for EmDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmDiagnostic::LikelihoodDecreased {
                previous, current, ..
            } => write!(
                f,
                "log-likelihood decreased from {previous:.6} to {current:.6}"
            ),
            EmDiagnostic::CovarianceClamped {
                parameter,
                min_eigenvalue,
                ..
            } => write!(
                f,
                "{parameter} lost positive semi-definiteness (min eigenvalue {min_eigenvalue:.3e}) and was clamped"
            ),
        }
    }
}

/// Expected sufficient statistics from one E-step.
///
/// Index `t` runs over the `T` observation steps; the lagged state of
/// step 0 is the smoothed pre-sample state. Without one, the transition
/// sums start at step 1 and cover `T − 1` lag pairs.
#[derive(Debug, Clone)]
struct SufficientStatistics {
    n_steps: f64,
    /// Number of `(x[t], x[t-1])` pairs in the transition sums.
    n_lags: f64,
    /// Σ E[x[t] x[t]ᵀ]
    s11: Array2<f64>,
    /// Σ E[x[t] x[t-1]ᵀ]
    s10: Array2<f64>,
    /// Σ E[x[t-1] x[t-1]ᵀ]
    s00: Array2<f64>,
    /// Σ E[x[t]]
    s1: Array1<f64>,
    /// Σ E[x[t-1]]
    s0: Array1<f64>,
    /// Σ E[v[t]]
    residual_sum: Array1<f64>,
    /// Σ E[v[t] v[t]ᵀ]
    residual_outer_sum: Array2<f64>,
    pre_sample: Option<GaussianState>,
}

impl SufficientStatistics {
    fn collect(
        model: &StateSpaceModel,
        observations: &Observations,
        smoothed: &SmoothResult,
    ) -> Result<Self, SsmError> {
        let pre = smoothed.pre_sample();
        let n = model.state_dim();
        let m = model.obs_dim();
        let mut s11 = Array2::zeros((n, n));
        let mut s10 = Array2::zeros((n, n));
        let mut s00 = Array2::zeros((n, n));
        let mut s1 = Array1::zeros(n);
        let mut s0 = Array1::zeros(n);
        let mut residual_sum = Array1::zeros(m);
        let mut residual_outer_sum = Array2::zeros((m, m));

        let states = smoothed.smoothed();
        let mut n_lags = 0usize;
        for (t, cur) in states.iter().enumerate() {
            let lagged = match (t, pre) {
                (0, Some(pre)) => Some((&pre.state, &pre.cross_covariance)),
                (0, None) => None,
                _ => Some((&states[t - 1], &smoothed.cross_covariances()[t - 1])),
            };
            if let Some((prev, cross)) = lagged {
                s11 += &(cur.covariance() + &outer(cur.mean(), cur.mean()));
                s10 += &(cross + &outer(cur.mean(), prev.mean()));
                s00 += &(prev.covariance() + &outer(prev.mean(), prev.mean()));
                s1 += cur.mean();
                s0 += prev.mean();
                n_lags += 1;
            }

            let (ev, evv) =
                residual_moments(model, observations, t, cur).map_err(|e| e.at_step(t))?;
            residual_sum += &ev;
            residual_outer_sum += &evv;
        }

        Ok(Self {
            n_steps: states.len() as f64,
            n_lags: n_lags as f64,
            s11,
            s10,
            s00,
            s1,
            s0,
            residual_sum,
            residual_outer_sum,
            pre_sample: pre.map(|p| p.state.clone()),
        })
    }
}

/// Conditional mean and second moment of the observation residual
/// `v[t] = y[t] − C·x[t] − d` given all data.
fn residual_moments(
    model: &StateSpaceModel,
    observations: &Observations,
    t: usize,
    state: &GaussianState,
) -> Result<(Array1<f64>, Array2<f64>), SsmError> {
    let m = model.obs_dim();
    let r = model.observation_covariance();
    let present = observations.present_dims(t);
    if present.is_empty() {
        return Ok((Array1::zeros(m), r.clone()));
    }
    let missing: Vec<usize> = (0..m).filter(|&d| !observations.is_present(t, d)).collect();

    let c_o = linalg::select_rows(model.observation_matrix(), &present);
    let d_o = linalg::select_vec(model.observation_offsets().view(), &present);
    let y_o = linalg::select_vec(observations.row(t), &present);
    let e_o = y_o - c_o.dot(state.mean()) - d_o;
    let v_oo = outer(&e_o, &e_o) + c_o.dot(state.covariance()).dot(&c_o.t());

    let mut mean = Array1::zeros(m);
    let mut second = Array2::zeros((m, m));
    scatter_vec(&mut mean, &present, &e_o);
    scatter(&mut second, &present, &present, &v_oo);

    if !missing.is_empty() {
        let r_mo = linalg::select(r, &missing, &present);
        // G = R_mo · R_oo⁻¹; zero when the blocks are uncorrelated.
        let g = if r_mo.iter().all(|&x| x == 0.0) {
            Array2::zeros((missing.len(), present.len()))
        } else {
            let r_oo = linalg::select(r, &present, &present);
            let chol = Spd::factor(&r_oo)
                .ok_or_else(|| SsmError::singular(CovarianceStage::ObservationNoise))?;
            chol.solve(&r_mo.t().to_owned()).reversed_axes()
        };
        let r_mm = linalg::select(r, &missing, &missing);
        let mean_m = g.dot(&e_o);
        let second_mo = g.dot(&v_oo);
        let second_mm = second_mo.dot(&g.t()) + r_mm - g.dot(&r_mo.t());

        scatter_vec(&mut mean, &missing, &mean_m);
        scatter(&mut second, &missing, &present, &second_mo);
        scatter(&mut second, &present, &missing, &second_mo.t().to_owned());
        scatter(&mut second, &missing, &missing, &second_mm);
    }
    Ok((mean, second))
}

fn scatter_vec(dst: &mut Array1<f64>, idx: &[usize], src: &Array1<f64>) {
    for (k, &i) in idx.iter().enumerate() {
        dst[i] = src[k];
    }
}

fn scatter(dst: &mut Array2<f64>, rows: &[usize], cols: &[usize], src: &Array2<f64>) {
    for (a, &i) in rows.iter().enumerate() {
        for (b, &j) in cols.iter().enumerate() {
            dst[[i, j]] = src[[a, b]];
        }
    }
}

/// Mutable state of an EM run, advanced by [`EmEstimator::step`].
#[derive(Debug, Clone)]
pub struct EmState {
    model: StateSpaceModel,
    phase: EmPhase,
    iteration: usize,
    log_likelihoods: Vec<f64>,
    diagnostics: Vec<EmDiagnostic>,
    converged: bool,
    statistics: Option<SufficientStatistics>,
}

impl EmState {
    /// Starts a run from `model`.
    pub fn new(model: StateSpaceModel) -> Self {
        Self {
            model,
            phase: EmPhase::Initialize,
            iteration: 0,
            log_likelihoods: Vec::new(),
            diagnostics: Vec::new(),
            converged: false,
            statistics: None,
        }
    }

    /// Current parameters.
    pub fn model(&self) -> &StateSpaceModel {
        &self.model
    }

    /// Phase the next [`EmEstimator::step`] will execute.
    pub fn phase(&self) -> EmPhase {
        self.phase
    }

    /// Number of completed M-steps.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Log-likelihood recorded at each E-step so far.
    pub fn log_likelihoods(&self) -> &[f64] {
        &self.log_likelihoods
    }

    /// Diagnostics raised so far.
    pub fn diagnostics(&self) -> &[EmDiagnostic] {
        &self.diagnostics
    }

    /// Whether the tolerance stopped the run.
    pub fn converged(&self) -> bool {
        self.converged
    }
}

/// Result of a completed EM run.
#[derive(Debug, Clone)]
pub struct EmFit {
    model: StateSpaceModel,
    log_likelihoods: Vec<f64>,
    iterations: usize,
    converged: bool,
    diagnostics: Vec<EmDiagnostic>,
}

impl EmFit {
    /// Learned model.
    pub fn model(&self) -> &StateSpaceModel {
        &self.model
    }

    /// Consumes the fit and returns the learned model.
    pub fn into_model(self) -> StateSpaceModel {
        self.model
    }

    /// Log-likelihood trace. Entry `i` is evaluated after `i` M-steps, so
    /// a run of `k` iterations has `k + 1` entries.
    pub fn log_likelihoods(&self) -> &[f64] {
        &self.log_likelihoods
    }

    /// Log-likelihood of the data under the learned model.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihoods.last().copied().unwrap_or(f64::NEG_INFINITY)
    }

    /// Number of M-steps run.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Whether the tolerance was met before `n_iter`.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Non-fatal diagnostics raised during the run.
    pub fn diagnostics(&self) -> &[EmDiagnostic] {
        &self.diagnostics
    }
}

/// EM estimator for [`StateSpaceModel`] parameters.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use yieldkf_ssm::{EmConfig, EmEstimator, Observations, StateSpaceModel};
///
/// let model = StateSpaceModel::from_maturities(&[1.0, 2.0], 1).unwrap();
/// let obs = Observations::fully_observed(array![[0.1, 0.2], [0.2, 0.1], [0.15, 0.2]]).unwrap();
/// let fit = EmEstimator::new(EmConfig::new().with_n_iter(3))
///     .unwrap()
///     .fit(&model, &obs)
///     .unwrap();
/// assert_eq!(fit.log_likelihoods().len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct EmEstimator {
    config: EmConfig,
}

impl EmEstimator {
    /// Creates an estimator.
    ///
    /// # Errors
    ///
    /// Returns [`SsmError::Configuration`] if the configuration is invalid.
    pub fn new(config: EmConfig) -> Result<Self, SsmError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EmConfig {
        &self.config
    }

    /// Executes the current phase of `state` and returns the next phase.
    ///
    /// On error `state.model()` is unchanged.
    pub fn step(
        &self,
        state: &mut EmState,
        observations: &Observations,
    ) -> Result<EmPhase, SsmError> {
        let next = match state.phase {
            EmPhase::Initialize => {
                check_observations(&state.model, observations)?;
                EmPhase::EStep
            }
            EmPhase::EStep => self.e_step(state, observations)?,
            EmPhase::MStep => self.m_step(state)?,
            EmPhase::Terminate => EmPhase::Terminate,
        };
        state.phase = next;
        Ok(next)
    }

    /// Runs EM to termination from a copy of `model`.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`SsmError::Configuration`] | observation width ≠ `model.obs_dim()`, empty data |
    /// | [`SsmError::SingularCovariance`] | singular innovation, predicted, observation noise or state moment covariance |
    /// | [`SsmError::NumericalDivergence`] | strict mode only: likelihood drop or covariance clamp |
    pub fn fit(
        &self,
        model: &StateSpaceModel,
        observations: &Observations,
    ) -> Result<EmFit, SsmError> {
        let _span = info_span!(
            "em",
            n_iter = self.config.n_iter(),
            n_steps = observations.n_steps()
        )
        .entered();

        let mut state = EmState::new(model.clone());
        while self.step(&mut state, observations)? != EmPhase::Terminate {}

        info!(
            iterations = state.iteration,
            log_likelihood = state.log_likelihoods.last().copied(),
            converged = state.converged,
            diagnostics = state.diagnostics.len(),
            "EM finished"
        );
        Ok(EmFit {
            model: state.model,
            log_likelihoods: state.log_likelihoods,
            iterations: state.iteration,
            converged: state.converged,
            diagnostics: state.diagnostics,
        })
    }

    fn e_step(
        &self,
        state: &mut EmState,
        observations: &Observations,
    ) -> Result<EmPhase, SsmError> {
        let (filtered, smoothed) = filter_and_smooth(&state.model, observations)?;
        let log_likelihood = filtered.log_likelihood();
        let previous = state.log_likelihoods.last().copied();

        if let Some(prev) = previous {
            if log_likelihood < prev - LIKELIHOOD_SLACK * prev.abs().max(1.0) {
                let diagnostic = EmDiagnostic::LikelihoodDecreased {
                    iteration: state.iteration,
                    previous: prev,
                    current: log_likelihood,
                };
                if self.config.strict() {
                    return Err(diagnostic.into_error());
                }
                warn!(iteration = state.iteration, "{diagnostic}");
                state.diagnostics.push(diagnostic);
            }
        }
        state.log_likelihoods.push(log_likelihood);
        debug!(iteration = state.iteration, log_likelihood, "E-step");

        if state.iteration >= self.config.n_iter() {
            return Ok(EmPhase::Terminate);
        }
        if let (Some(tol), Some(prev)) = (self.config.tolerance(), previous) {
            if (log_likelihood - prev).abs() < tol {
                state.converged = true;
                return Ok(EmPhase::Terminate);
            }
        }

        state.statistics = Some(SufficientStatistics::collect(
            &state.model,
            observations,
            &smoothed,
        )?);
        Ok(EmPhase::MStep)
    }

    fn m_step(&self, state: &mut EmState) -> Result<EmPhase, SsmError> {
        let stats = state
            .statistics
            .as_ref()
            .ok_or_else(|| SsmError::config("M-step reached without E-step statistics"))?;
        let iteration = state.iteration + 1;
        let (model, clamped) = self.maximize(&state.model, stats, iteration)?;

        for diagnostic in clamped {
            warn!(iteration, "{diagnostic}");
            state.diagnostics.push(diagnostic);
        }
        state.model = model;
        state.iteration = iteration;
        state.statistics = None;
        Ok(EmPhase::EStep)
    }

    /// Builds the updated model without touching `current`.
    fn maximize(
        &self,
        current: &StateSpaceModel,
        stats: &SufficientStatistics,
        iteration: usize,
    ) -> Result<(StateSpaceModel, Vec<EmDiagnostic>), SsmError> {
        let vars = self.config.em_vars();
        let t = stats.n_steps;
        let lags = stats.n_lags;
        let mut next = current.clone();
        let mut clamped = Vec::new();

        let mut a = current.transition_matrix().clone();
        let mut b = current.transition_offsets().clone();
        // A single step with no pre-sample state carries no transition information.
        let has_lags = lags > 0.0;

        if has_lags && vars.contains(EmParam::TransitionMatrix) {
            let s00 = Spd::factor(&stats.s00)
                .ok_or_else(|| SsmError::singular(CovarianceStage::StateMoments))?;
            // A = (S10 − b·s0ᵀ)·S00⁻¹, solved as Aᵀ = S00⁻¹·(S10 − b·s0ᵀ)ᵀ.
            let rhs = &stats.s10 - &outer(&b, &stats.s0);
            a = s00.solve(&rhs.t().to_owned()).reversed_axes();
            next.set_transition_matrix(a.clone());
        }
        if has_lags && vars.contains(EmParam::TransitionOffsets) {
            b = (&stats.s1 - &a.dot(&stats.s0)) / lags;
            next.set_transition_offsets(b.clone());
        }
        if has_lags && vars.contains(EmParam::TransitionCovariance) {
            let drift = &stats.s1 - &a.dot(&stats.s0);
            let q = &stats.s11 - &stats.s10.dot(&a.t()) - &a.dot(&stats.s10.t())
                + &a.dot(&stats.s00).dot(&a.t())
                - &outer(&drift, &b)
                - &outer(&b, &drift)
                + &(outer(&b, &b) * lags);
            let q = self.settle(q / lags, EmParam::TransitionCovariance, iteration, &mut clamped)?;
            next.set_transition_covariance(q);
        }

        let mut delta = Array1::zeros(current.obs_dim());
        if vars.contains(EmParam::ObservationOffsets) {
            delta = &stats.residual_sum / t;
            next.set_observation_offsets(current.observation_offsets() + &delta);
        }
        if vars.contains(EmParam::ObservationCovariance) {
            let r = &stats.residual_outer_sum
                - &outer(&delta, &stats.residual_sum)
                - &outer(&stats.residual_sum, &delta)
                + &(outer(&delta, &delta) * t);
            let r = self.settle(r / t, EmParam::ObservationCovariance, iteration, &mut clamped)?;
            next.set_observation_covariance(r);
        }

        // Without a smoothed pre-sample state μ₀ and Σ₀ keep their values.
        let Some(pre) = &stats.pre_sample else {
            if vars.contains(EmParam::InitialStateMean)
                || vars.contains(EmParam::InitialStateCovariance)
            {
                debug!(iteration, "no pre-sample state; initial state not updated");
            }
            return Ok((next, clamped));
        };
        let mut mu0 = current.initial_state_mean().clone();
        if vars.contains(EmParam::InitialStateMean) {
            mu0 = pre.mean().clone();
            next.set_initial_state_mean(mu0.clone());
        }
        if vars.contains(EmParam::InitialStateCovariance) {
            let dev = pre.mean() - &mu0;
            let sigma = pre.covariance() + &outer(&dev, &dev);
            let sigma =
                self.settle(sigma, EmParam::InitialStateCovariance, iteration, &mut clamped)?;
            next.set_initial_state_covariance(sigma);
        }

        Ok((next, clamped))
    }

    /// Symmetrises an updated covariance and clamps it to PSD if needed.
    fn settle(
        &self,
        cov: Array2<f64>,
        parameter: EmParam,
        iteration: usize,
        clamped: &mut Vec<EmDiagnostic>,
    ) -> Result<Array2<f64>, SsmError> {
        if cov.iter().any(|x| !x.is_finite()) {
            return Err(SsmError::NumericalDivergence {
                iteration,
                reason: format!("{parameter} update is not finite"),
            });
        }
        let sym = linalg::symmetrize(&cov);
        let min_eigenvalue = linalg::min_eigenvalue(&sym);
        if min_eigenvalue >= -self.config.psd_tolerance() * linalg::scale(&sym) {
            return Ok(sym);
        }
        let diagnostic = EmDiagnostic::CovarianceClamped {
            iteration,
            parameter,
            min_eigenvalue,
        };
        if self.config.strict() {
            return Err(diagnostic.into_error());
        }
        clamped.push(diagnostic);
        Ok(linalg::clamp_psd(&sym))
    }
}

/// Runs `max_iterations` EM iterations with the default learnable set and
/// returns the learned model.
///
/// # Errors
///
/// See [`EmEstimator::fit`]; `max_iterations == 0` is a
/// [`SsmError::Configuration`].
pub fn fit(
    model: &StateSpaceModel,
    observations: &Observations,
    max_iterations: usize,
) -> Result<StateSpaceModel, SsmError> {
    EmEstimator::new(EmConfig::new().with_n_iter(max_iterations))?
        .fit(model, observations)
        .map(EmFit::into_model)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;
    use crate::config::EmVars;

    fn small_model() -> StateSpaceModel {
        StateSpaceModel::from_maturities(&[1.0, 2.0, 5.0], 2)
            .unwrap()
            .with_transition_matrix(array![[0.9, 0.0], [0.0, 0.7]])
            .unwrap()
            .with_transition_covariance(array![[0.05, 0.0], [0.0, 0.01]])
            .unwrap()
            .with_observation_covariance(Array2::<f64>::eye(3) * 0.02)
            .unwrap()
    }

    fn small_obs() -> Observations {
        Observations::from_rows(&[
            vec![Some(1.0), Some(1.2), Some(1.9)],
            vec![Some(1.1), None, Some(2.0)],
            vec![Some(0.9), Some(1.1), Some(1.6)],
            vec![None, None, None],
            vec![Some(1.0), Some(1.3), Some(2.1)],
            vec![Some(1.05), Some(1.2), None],
        ])
        .unwrap()
    }

    #[test]
    fn phases_advance_in_order() {
        let est = EmEstimator::new(EmConfig::new().with_n_iter(2)).unwrap();
        let obs = small_obs();
        let mut state = EmState::new(small_model());
        assert_eq!(state.phase(), EmPhase::Initialize);

        let mut phases = Vec::new();
        loop {
            let next = est.step(&mut state, &obs).unwrap();
            phases.push(next);
            if next == EmPhase::Terminate {
                break;
            }
        }
        assert_eq!(
            phases,
            vec![
                EmPhase::EStep,
                EmPhase::MStep,
                EmPhase::EStep,
                EmPhase::MStep,
                EmPhase::EStep,
                EmPhase::Terminate
            ]
        );
        assert_eq!(state.iteration(), 2);
        assert_eq!(state.log_likelihoods().len(), 3);
        // Terminate is absorbing.
        assert_eq!(est.step(&mut state, &obs).unwrap(), EmPhase::Terminate);
    }

    /// `Σ₀ = 0` and a rank-one `Q` leave the step-0 predicted covariance
    /// singular, so the smoother has no pre-sample state.
    fn degenerate_start() -> (StateSpaceModel, Observations) {
        let model = StateSpaceModel::from_maturities(&[1.0, 2.0], 2)
            .unwrap()
            .with_transition_matrix(array![[0.0, 1.0], [1.0, 0.0]])
            .unwrap()
            .with_transition_covariance(array![[1.0, 0.0], [0.0, 0.0]])
            .unwrap()
            .with_initial_state_covariance(Array2::zeros((2, 2)))
            .unwrap();
        let obs = Observations::fully_observed(array![
            [1.0, 2.0],
            [0.5, -0.3],
            [1.2, 0.8],
            [-0.4, 0.1]
        ])
        .unwrap();
        (model, obs)
    }

    #[test]
    fn statistics_without_pre_sample_skip_first_lag() {
        let (model, obs) = degenerate_start();
        let (_, smoothed) = filter_and_smooth(&model, &obs).unwrap();
        assert!(smoothed.pre_sample().is_none());

        let stats = SufficientStatistics::collect(&model, &obs, &smoothed).unwrap();
        assert_eq!(stats.n_steps, 4.0);
        assert_eq!(stats.n_lags, 3.0);
        assert!(stats.pre_sample.is_none());
        let s1: Array1<f64> = smoothed.smoothed()[1..]
            .iter()
            .fold(Array1::zeros(2), |acc, s| acc + s.mean());
        assert_abs_diff_eq!(stats.s1, s1, epsilon = 1e-12);
    }

    #[test]
    fn maximize_without_pre_sample_keeps_initial_state() {
        let (model, obs) = degenerate_start();
        let (_, smoothed) = filter_and_smooth(&model, &obs).unwrap();
        let stats = SufficientStatistics::collect(&model, &obs, &smoothed).unwrap();
        let est = EmEstimator::new(EmConfig::new().with_em_vars(EmVars::all())).unwrap();
        let (next, _) = est.maximize(&model, &stats, 1).unwrap();
        assert_eq!(next.initial_state_mean(), model.initial_state_mean());
        assert_eq!(
            next.initial_state_covariance(),
            model.initial_state_covariance()
        );
        assert_ne!(next.transition_matrix(), model.transition_matrix());
    }

    /// A state about to run its second E-step after an implausibly good
    /// first one.
    fn state_after_inflated_likelihood() -> EmState {
        let mut state = EmState::new(small_model());
        state.phase = EmPhase::EStep;
        state.iteration = 1;
        state.log_likelihoods.push(1e9);
        state
    }

    #[test]
    fn likelihood_drop_is_recorded_in_lenient_mode() {
        let est = EmEstimator::new(EmConfig::new()).unwrap();
        let mut state = state_after_inflated_likelihood();
        let next = est.step(&mut state, &small_obs()).unwrap();
        assert_eq!(next, EmPhase::MStep);
        assert_eq!(state.log_likelihoods().len(), 2);
        match state.diagnostics() {
            [EmDiagnostic::LikelihoodDecreased {
                iteration,
                previous,
                current,
            }] => {
                assert_eq!(*iteration, 1);
                assert_eq!(*previous, 1e9);
                assert_eq!(*current, state.log_likelihoods()[1]);
            }
            other => panic!("expected one likelihood drop, got {other:?}"),
        }
    }

    #[test]
    fn likelihood_drop_is_error_in_strict_mode() {
        let est = EmEstimator::new(EmConfig::new().with_strict(true)).unwrap();
        let mut state = state_after_inflated_likelihood();
        let err = est.step(&mut state, &small_obs()).unwrap_err();
        assert!(matches!(err, SsmError::NumericalDivergence { iteration: 1, .. }));
        assert_eq!(state.phase(), EmPhase::EStep);
        assert!(state.diagnostics().is_empty());
        assert_eq!(state.model(), &small_model());
    }

    #[test]
    fn initialize_checks_width() {
        let est = EmEstimator::new(EmConfig::new()).unwrap();
        let obs = Observations::fully_observed(array![[1.0, 2.0]]).unwrap();
        let mut state = EmState::new(small_model());
        let err = est.step(&mut state, &obs).unwrap_err();
        assert!(matches!(err, SsmError::Configuration { .. }));
        assert_eq!(state.phase(), EmPhase::Initialize);
    }

    #[test]
    fn empty_learnable_set_keeps_model() {
        let model = small_model();
        let est = EmEstimator::new(EmConfig::new().with_n_iter(3).with_em_vars(EmVars::none()))
            .unwrap();
        let fit = est.fit(&model, &small_obs()).unwrap();
        assert_eq!(fit.model(), &model);
        let first = fit.log_likelihoods()[0];
        assert!(fit.log_likelihoods().iter().all(|&ll| ll == first));
    }

    #[test]
    fn caller_model_not_mutated() {
        let model = small_model();
        let before = model.clone();
        let learned = fit(&model, &small_obs(), 3).unwrap();
        assert_eq!(model, before);
        assert_ne!(learned, before);
    }

    #[test]
    fn zero_iterations_rejected() {
        let err = fit(&small_model(), &small_obs(), 0).unwrap_err();
        assert!(matches!(err, SsmError::Configuration { .. }));
    }

    #[test]
    fn tolerance_stops_early() {
        let est = EmEstimator::new(
            EmConfig::new()
                .with_n_iter(500)
                .with_tolerance(Some(1e-3))
                .with_em_vars(EmVars::none().with(EmParam::TransitionMatrix)),
        )
        .unwrap();
        let fit = est.fit(&small_model(), &small_obs()).unwrap();
        assert!(fit.converged());
        assert!(fit.iterations() < 500);
        assert_eq!(fit.log_likelihoods().len(), fit.iterations() + 1);
    }

    #[test]
    fn learned_covariances_stay_psd() {
        let est = EmEstimator::new(
            EmConfig::new()
                .with_n_iter(10)
                .with_em_vars(EmVars::all()),
        )
        .unwrap();
        let fit = est.fit(&small_model(), &small_obs()).unwrap();
        let m = fit.model();
        for cov in [
            m.transition_covariance(),
            m.observation_covariance(),
            m.initial_state_covariance(),
        ] {
            assert!(crate::is_positive_semidefinite(cov, 1e-8));
        }
    }

    #[test]
    fn residual_moments_fully_observed() {
        let model = small_model();
        let obs = Observations::fully_observed(array![[1.0, 2.0, 3.0]]).unwrap();
        let state = GaussianState::new(array![0.5, 0.1], Array2::<f64>::eye(2) * 0.1);
        let (ev, evv) = residual_moments(&model, &obs, 0, &state).unwrap();
        let c = model.observation_matrix();
        let e = array![1.0, 2.0, 3.0] - c.dot(state.mean());
        assert_abs_diff_eq!(ev, e, epsilon = 1e-12);
        let expected = outer(&e, &e) + c.dot(state.covariance()).dot(&c.t());
        assert_abs_diff_eq!(evv, expected, epsilon = 1e-12);
    }

    #[test]
    fn residual_moments_missing_with_diagonal_noise() {
        let model = small_model();
        let obs = Observations::from_rows(&[vec![Some(1.0), None, Some(3.0)]]).unwrap();
        let state = GaussianState::new(array![0.5, 0.1], Array2::<f64>::eye(2) * 0.1);
        let (ev, evv) = residual_moments(&model, &obs, 0, &state).unwrap();
        // Uncorrelated noise: the missing residual is its prior.
        assert_eq!(ev[1], 0.0);
        assert_abs_diff_eq!(evv[[1, 1]], 0.02, epsilon = 1e-15);
        assert_eq!(evv[[0, 1]], 0.0);
        assert_eq!(evv[[1, 2]], 0.0);
    }

    #[test]
    fn residual_moments_missing_with_correlated_noise() {
        let r = array![[1.0, 0.5], [0.5, 2.0]];
        let model = StateSpaceModel::from_maturities(&[1.0, 2.0], 1)
            .unwrap()
            .with_observation_covariance(r)
            .unwrap();
        let obs = Observations::from_rows(&[vec![Some(2.0), None]]).unwrap();
        let state = GaussianState::new(array![1.0], array![[0.25]]);
        let (ev, evv) = residual_moments(&model, &obs, 0, &state).unwrap();
        // e_o = 1, V_oo = 1 + 0.25, G = 0.5.
        assert_abs_diff_eq!(ev[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ev[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(evv[[0, 0]], 1.25, epsilon = 1e-12);
        assert_abs_diff_eq!(evv[[1, 0]], 0.625, epsilon = 1e-12);
        assert_abs_diff_eq!(evv[[0, 1]], 0.625, epsilon = 1e-12);
        // G·V_oo·Gᵀ + R_mm − G·R_om = 0.3125 + 2 − 0.25
        assert_abs_diff_eq!(evv[[1, 1]], 2.0625, epsilon = 1e-12);
    }

    #[test]
    fn residual_moments_all_missing() {
        let model = small_model();
        let obs = Observations::from_rows(&[vec![None, None, None]]).unwrap();
        let state = GaussianState::new(array![0.0, 0.0], Array2::eye(2));
        let (ev, evv) = residual_moments(&model, &obs, 0, &state).unwrap();
        assert!(ev.iter().all(|&v| v == 0.0));
        assert_eq!(&evv, model.observation_covariance());
    }

    #[test]
    fn strict_clamp_is_error() {
        let est = EmEstimator::new(EmConfig::new().with_strict(true)).unwrap();
        let mut clamped = Vec::new();
        let err = est
            .settle(
                array![[1.0, 2.0], [2.0, 1.0]],
                EmParam::ObservationCovariance,
                3,
                &mut clamped,
            )
            .unwrap_err();
        assert!(matches!(err, SsmError::NumericalDivergence { iteration: 3, .. }));
        assert!(clamped.is_empty());
    }

    #[test]
    fn lenient_clamp_records_diagnostic() {
        let est = EmEstimator::new(EmConfig::new()).unwrap();
        let mut clamped = Vec::new();
        let out = est
            .settle(
                array![[1.0, 2.0], [2.0, 1.0]],
                EmParam::TransitionCovariance,
                2,
                &mut clamped,
            )
            .unwrap();
        assert!(crate::is_positive_semidefinite(&out, 1e-10));
        assert_eq!(clamped.len(), 1);
        assert!(matches!(
            clamped[0],
            EmDiagnostic::CovarianceClamped {
                iteration: 2,
                parameter: EmParam::TransitionCovariance,
                ..
            }
        ));
    }

    #[test]
    fn diagnostic_display() {
        let d = EmDiagnostic::LikelihoodDecreased {
            iteration: 4,
            previous: -10.0,
            current: -11.0,
        };
        assert_eq!(d.iteration(), 4);
        assert_eq!(
            d.to_string(),
            "log-likelihood decreased from -10.000000 to -11.000000"
        );
        let err = d.into_error();
        assert_eq!(
            err.to_string(),
            "numerical divergence at EM iteration 4: log-likelihood decreased from -10.000000 to -11.000000"
        );
    }
}
