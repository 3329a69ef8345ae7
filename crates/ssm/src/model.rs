//! Linear-Gaussian state-space model.
//!
//! ```text
//! x[t] = A · x[t-1] + b + w[t],   w[t] ~ N(0, Q)     (transition)
//! y[t] = C · x[t]   + d + v[t],   v[t] ~ N(0, R)     (observation)
//! x[0] ~ N(μ₀, Σ₀)                                    (pre-sample state)
//! ```
//!
//! For a yield curve, row `i` of `C` holds the polynomial loadings
//! `maturityᵢʲ` of factor `j` (level, slope, convexity, ...).

use ndarray::{Array1, Array2};

use crate::error::SsmError;
use crate::linalg;
use crate::state::GaussianState;

/// Names of the latent yield-curve factors, in loading order.
pub const FACTOR_NAMES: [&str; 3] = ["level", "slope", "convexity"];

/// Relative tolerance used when validating covariance symmetry and PSD.
const COVARIANCE_TOLERANCE: f64 = 1e-8;

/// A linear-Gaussian state-space model with `n` latent factors and `m`
/// observed series.
///
/// Construct with [`StateSpaceModel::from_maturities`] (or
/// [`StateSpaceModel::from_observation_matrix`]) and adjust the defaults
/// with the `with_*` setters, each of which validates its input.
///
/// | Field | Shape | Default |
/// |-------|-------|---------|
/// | transition matrix `A` | n×n | identity |
/// | transition offsets `b` | n | zeros |
/// | transition covariance `Q` | n×n | identity |
/// | observation matrix `C` | m×n | from maturities |
/// | observation offsets `d` | m | zeros |
/// | observation covariance `R` | m×m | identity |
/// | initial state mean `μ₀` | n | zeros |
/// | initial state covariance `Σ₀` | n×n | identity |
#[derive(Clone, Debug, PartialEq)]
pub struct StateSpaceModel {
    transition_matrix: Array2<f64>,
    transition_offsets: Array1<f64>,
    transition_covariance: Array2<f64>,
    observation_matrix: Array2<f64>,
    observation_offsets: Array1<f64>,
    observation_covariance: Array2<f64>,
    initial_state_mean: Array1<f64>,
    initial_state_covariance: Array2<f64>,
}

/// Unvalidated parameter bundle for [`StateSpaceModel::new`].
#[derive(Clone, Debug, PartialEq)]
pub struct ModelMatrices {
    /// Transition matrix `A`, n×n.
    pub transition_matrix: Array2<f64>,
    /// Transition offsets `b`, length n.
    pub transition_offsets: Array1<f64>,
    /// Transition noise covariance `Q`, n×n.
    pub transition_covariance: Array2<f64>,
    /// Factor loadings `C`, m×n.
    pub observation_matrix: Array2<f64>,
    /// Observation offsets `d`, length m.
    pub observation_offsets: Array1<f64>,
    /// Observation noise covariance `R`, m×m.
    pub observation_covariance: Array2<f64>,
    /// Pre-sample state mean `μ₀`, length n.
    pub initial_state_mean: Array1<f64>,
    /// Pre-sample state covariance `Σ₀`, n×n.
    pub initial_state_covariance: Array2<f64>,
}

impl StateSpaceModel {
    /// Builds the model whose observation matrix loads factor `j` on
    /// maturity `τᵢ` with weight `τᵢʲ`.
    ///
    /// # Errors
    ///
    /// Returns [`SsmError::Configuration`] if `maturities` is empty,
    /// `n_factors` is zero, or a maturity is not finite.
    ///
    /// # Example
    ///
    /// ```
    /// use yieldkf_ssm::StateSpaceModel;
    ///
    /// let model = StateSpaceModel::from_maturities(&[1.0, 5.0, 10.0], 3).unwrap();
    /// assert_eq!(model.observation_matrix()[[2, 2]], 100.0);
    /// assert_eq!(model.state_dim(), 3);
    /// assert_eq!(model.obs_dim(), 3);
    /// ```
    pub fn from_maturities(maturities: &[f64], n_factors: usize) -> Result<Self, SsmError> {
        if maturities.is_empty() {
            return Err(SsmError::config("maturity list is empty"));
        }
        if n_factors < 1 {
            return Err(SsmError::config("factor count must be at least 1"));
        }
        if let Some(bad) = maturities.iter().find(|m| !m.is_finite()) {
            return Err(SsmError::config(format!("maturity {bad} is not finite")));
        }
        let c = Array2::from_shape_fn((maturities.len(), n_factors), |(i, j)| {
            maturities[i].powi(j as i32)
        });
        Self::from_observation_matrix(c)
    }

    /// Builds a model around an explicit `m × n` observation matrix with
    /// default values elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`SsmError::Configuration`] if either dimension is zero or
    /// `c` has non-finite entries.
    pub fn from_observation_matrix(c: Array2<f64>) -> Result<Self, SsmError> {
        let (m, n) = c.dim();
        if m == 0 || n == 0 {
            return Err(SsmError::config(format!(
                "observation matrix must be non-empty, got {m}x{n}"
            )));
        }
        check_finite("observation matrix", c.iter())?;
        Ok(Self {
            transition_matrix: Array2::eye(n),
            transition_offsets: Array1::zeros(n),
            transition_covariance: Array2::eye(n),
            observation_matrix: c,
            observation_offsets: Array1::zeros(m),
            observation_covariance: Array2::eye(m),
            initial_state_mean: Array1::zeros(n),
            initial_state_covariance: Array2::eye(n),
        })
    }

    /// Builds a model from fully explicit matrices.
    ///
    /// Dimensions are taken from the observation matrix; every other
    /// parameter goes through the matching `with_*` validation.
    ///
    /// # Errors
    ///
    /// Returns [`SsmError::Configuration`] on any shape, finiteness,
    /// symmetry or PSD violation.
    pub fn new(matrices: ModelMatrices) -> Result<Self, SsmError> {
        Self::from_observation_matrix(matrices.observation_matrix)?
            .with_transition_matrix(matrices.transition_matrix)?
            .with_transition_offsets(matrices.transition_offsets)?
            .with_transition_covariance(matrices.transition_covariance)?
            .with_observation_offsets(matrices.observation_offsets)?
            .with_observation_covariance(matrices.observation_covariance)?
            .with_initial_state_mean(matrices.initial_state_mean)?
            .with_initial_state_covariance(matrices.initial_state_covariance)
    }

    /// Copies the parameters out into a [`ModelMatrices`].
    pub fn to_matrices(&self) -> ModelMatrices {
        ModelMatrices {
            transition_matrix: self.transition_matrix.clone(),
            transition_offsets: self.transition_offsets.clone(),
            transition_covariance: self.transition_covariance.clone(),
            observation_matrix: self.observation_matrix.clone(),
            observation_offsets: self.observation_offsets.clone(),
            observation_covariance: self.observation_covariance.clone(),
            initial_state_mean: self.initial_state_mean.clone(),
            initial_state_covariance: self.initial_state_covariance.clone(),
        }
    }

    /// Sets the transition matrix `A` (n×n).
    pub fn with_transition_matrix(mut self, a: Array2<f64>) -> Result<Self, SsmError> {
        let n = self.state_dim();
        check_shape("transition matrix", a.dim(), (n, n))?;
        check_finite("transition matrix", a.iter())?;
        self.transition_matrix = a;
        Ok(self)
    }

    /// Sets the transition offsets `b` (n).
    pub fn with_transition_offsets(mut self, b: Array1<f64>) -> Result<Self, SsmError> {
        check_len("transition offsets", b.len(), self.state_dim())?;
        check_finite("transition offsets", b.iter())?;
        self.transition_offsets = b;
        Ok(self)
    }

    /// Sets the transition covariance `Q` (n×n, symmetric PSD).
    pub fn with_transition_covariance(mut self, q: Array2<f64>) -> Result<Self, SsmError> {
        self.transition_covariance = check_covariance("transition covariance", q, self.state_dim())?;
        Ok(self)
    }

    /// Sets the observation offsets `d` (m).
    pub fn with_observation_offsets(mut self, d: Array1<f64>) -> Result<Self, SsmError> {
        check_len("observation offsets", d.len(), self.obs_dim())?;
        check_finite("observation offsets", d.iter())?;
        self.observation_offsets = d;
        Ok(self)
    }

    /// Sets the observation covariance `R` (m×m, symmetric PSD).
    pub fn with_observation_covariance(mut self, r: Array2<f64>) -> Result<Self, SsmError> {
        self.observation_covariance = check_covariance("observation covariance", r, self.obs_dim())?;
        Ok(self)
    }

    /// Sets the initial state mean `μ₀` (n).
    pub fn with_initial_state_mean(mut self, mu: Array1<f64>) -> Result<Self, SsmError> {
        check_len("initial state mean", mu.len(), self.state_dim())?;
        check_finite("initial state mean", mu.iter())?;
        self.initial_state_mean = mu;
        Ok(self)
    }

    /// Sets the initial state covariance `Σ₀` (n×n, symmetric PSD).
    pub fn with_initial_state_covariance(mut self, sigma: Array2<f64>) -> Result<Self, SsmError> {
        self.initial_state_covariance =
            check_covariance("initial state covariance", sigma, self.state_dim())?;
        Ok(self)
    }

    /// Returns a copy with `eps` added to the diagonal of `R`.
    ///
    /// This is the retry path after an
    /// [`SsmError::SingularCovariance`](crate::SsmError::SingularCovariance).
    ///
    /// # Errors
    ///
    /// Returns [`SsmError::Configuration`] if `eps` is negative or not finite.
    pub fn with_observation_regularization(&self, eps: f64) -> Result<Self, SsmError> {
        if !eps.is_finite() || eps < 0.0 {
            return Err(SsmError::config(format!(
                "regularization must be finite and non-negative, got {eps}"
            )));
        }
        let mut out = self.clone();
        out.observation_covariance
            .diag_mut()
            .mapv_inplace(|v| v + eps);
        Ok(out)
    }

    /// Number of latent factors `n`.
    pub fn state_dim(&self) -> usize {
        self.transition_matrix.nrows()
    }

    /// Number of observed series `m`.
    pub fn obs_dim(&self) -> usize {
        self.observation_matrix.nrows()
    }

    /// Transition matrix `A`.
    pub fn transition_matrix(&self) -> &Array2<f64> {
        &self.transition_matrix
    }

    /// Transition offsets `b`.
    pub fn transition_offsets(&self) -> &Array1<f64> {
        &self.transition_offsets
    }

    /// Transition covariance `Q`.
    pub fn transition_covariance(&self) -> &Array2<f64> {
        &self.transition_covariance
    }

    /// Observation matrix `C`.
    pub fn observation_matrix(&self) -> &Array2<f64> {
        &self.observation_matrix
    }

    /// Observation offsets `d`.
    pub fn observation_offsets(&self) -> &Array1<f64> {
        &self.observation_offsets
    }

    /// Observation covariance `R`.
    pub fn observation_covariance(&self) -> &Array2<f64> {
        &self.observation_covariance
    }

    /// Initial state mean `μ₀`.
    pub fn initial_state_mean(&self) -> &Array1<f64> {
        &self.initial_state_mean
    }

    /// Initial state covariance `Σ₀`.
    pub fn initial_state_covariance(&self) -> &Array2<f64> {
        &self.initial_state_covariance
    }

    /// Pre-sample belief `N(μ₀, Σ₀)`.
    pub fn initial_state(&self) -> GaussianState {
        GaussianState::new(
            self.initial_state_mean.clone(),
            self.initial_state_covariance.clone(),
        )
    }

    // Raw setters for the M-step; callers have already symmetrised and
    // shape-checked the update.

    pub(crate) fn set_transition_matrix(&mut self, a: Array2<f64>) {
        self.transition_matrix = a;
    }

    pub(crate) fn set_transition_offsets(&mut self, b: Array1<f64>) {
        self.transition_offsets = b;
    }

    pub(crate) fn set_transition_covariance(&mut self, q: Array2<f64>) {
        self.transition_covariance = q;
    }

    pub(crate) fn set_observation_offsets(&mut self, d: Array1<f64>) {
        self.observation_offsets = d;
    }

    pub(crate) fn set_observation_covariance(&mut self, r: Array2<f64>) {
        self.observation_covariance = r;
    }

    pub(crate) fn set_initial_state_mean(&mut self, mu: Array1<f64>) {
        self.initial_state_mean = mu;
    }

    pub(crate) fn set_initial_state_covariance(&mut self, sigma: Array2<f64>) {
        self.initial_state_covariance = sigma;
    }
}

fn check_shape(
    name: &str,
    got: (usize, usize),
    expected: (usize, usize),
) -> Result<(), SsmError> {
    if got != expected {
        return Err(SsmError::config(format!(
            "{name} must be {}x{}, got {}x{}",
            expected.0, expected.1, got.0, got.1
        )));
    }
    Ok(())
}

fn check_len(name: &str, got: usize, expected: usize) -> Result<(), SsmError> {
    if got != expected {
        return Err(SsmError::config(format!(
            "{name} must have length {expected}, got {got}"
        )));
    }
    Ok(())
}

fn check_finite<'a>(name: &str, mut values: impl Iterator<Item = &'a f64>) -> Result<(), SsmError> {
    if values.any(|v| !v.is_finite()) {
        return Err(SsmError::config(format!("{name} contains non-finite values")));
    }
    Ok(())
}

/// Validates a covariance and returns its exactly symmetric version.
fn check_covariance(name: &str, m: Array2<f64>, dim: usize) -> Result<Array2<f64>, SsmError> {
    if !m.is_square() {
        let (r, c) = m.dim();
        return Err(SsmError::config(format!("{name} must be square, got {r}x{c}")));
    }
    check_shape(name, m.dim(), (dim, dim))?;
    check_finite(name, m.iter())?;
    let tol = COVARIANCE_TOLERANCE * linalg::scale(&m);
    if linalg::asymmetry(&m) > tol {
        return Err(SsmError::config(format!("{name} is not symmetric")));
    }
    let sym = linalg::symmetrize(&m);
    let min_eig = linalg::min_eigenvalue(&sym);
    if min_eig < -tol {
        return Err(SsmError::config(format!(
            "{name} is not positive semi-definite (min eigenvalue {min_eig:.3e})"
        )));
    }
    Ok(sym)
}
