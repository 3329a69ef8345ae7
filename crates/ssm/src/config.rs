//! Configuration for EM parameter estimation.

use std::fmt;
use std::str::FromStr;

use crate::error::SsmError;

/// A model parameter the EM estimator can learn.
///
/// The observation matrix `C` is fixed by the maturities and has no
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmParam {
    /// Transition matrix `A`.
    TransitionMatrix,
    /// Transition offsets `b`.
    TransitionOffsets,
    /// Transition covariance `Q`.
    TransitionCovariance,
    /// Observation offsets `d`.
    ObservationOffsets,
    /// Observation covariance `R`.
    ObservationCovariance,
    /// Initial state mean `μ₀`.
    InitialStateMean,
    /// Initial state covariance `Σ₀`.
    InitialStateCovariance,
}

impl EmParam {
    /// All parameters, in M-step update order.
    pub const ALL: [EmParam; 7] = [
        EmParam::TransitionMatrix,
        EmParam::TransitionOffsets,
        EmParam::TransitionCovariance,
        EmParam::ObservationOffsets,
        EmParam::ObservationCovariance,
        EmParam::InitialStateMean,
        EmParam::InitialStateCovariance,
    ];

    /// Snake-case name, as used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            EmParam::TransitionMatrix => "transition_matrix",
            EmParam::TransitionOffsets => "transition_offsets",
            EmParam::TransitionCovariance => "transition_covariance",
            EmParam::ObservationOffsets => "observation_offsets",
            EmParam::ObservationCovariance => "observation_covariance",
            EmParam::InitialStateMean => "initial_state_mean",
            EmParam::InitialStateCovariance => "initial_state_covariance",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for EmParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EmParam {
    type Err = SsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmParam::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| SsmError::config(format!("unknown EM parameter '{s}'")))
    }
}

/// The set of parameters learned by EM.
///
/// Defaults to `{A, Q, R}`.
///
/// # Example
///
/// ```
/// use yieldkf_ssm::{EmParam, EmVars};
///
/// let vars = EmVars::none()
///     .with(EmParam::TransitionMatrix)
///     .with(EmParam::ObservationOffsets);
/// assert!(vars.contains(EmParam::ObservationOffsets));
/// assert!(!vars.contains(EmParam::TransitionCovariance));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmVars(u8);

impl EmVars {
    /// No learnable parameters; EM then only evaluates the likelihood.
    pub fn none() -> Self {
        Self(0)
    }

    /// Every parameter except `C`.
    pub fn all() -> Self {
        EmParam::ALL.into_iter().fold(Self::none(), Self::with)
    }

    /// Returns the set with `param` added.
    pub fn with(self, param: EmParam) -> Self {
        Self(self.0 | param.bit())
    }

    /// Returns the set with `param` removed.
    pub fn without(self, param: EmParam) -> Self {
        Self(self.0 & !param.bit())
    }

    /// Whether `param` is learned.
    pub fn contains(self, param: EmParam) -> bool {
        self.0 & param.bit() != 0
    }

    /// Whether no parameter is learned.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Learned parameters in M-step order.
    pub fn iter(self) -> impl Iterator<Item = EmParam> {
        EmParam::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl Default for EmVars {
    fn default() -> Self {
        Self::none()
            .with(EmParam::TransitionMatrix)
            .with(EmParam::TransitionCovariance)
            .with(EmParam::ObservationCovariance)
    }
}

impl FromIterator<EmParam> for EmVars {
    fn from_iter<I: IntoIterator<Item = EmParam>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with)
    }
}

/// Configuration for [`EmEstimator`](crate::EmEstimator).
///
/// # Example
///
/// ```
/// use yieldkf_ssm::EmConfig;
///
/// let config = EmConfig::new()
///     .with_n_iter(20)
///     .with_tolerance(Some(1e-6));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct EmConfig {
    n_iter: usize,
    tolerance: Option<f64>,
    em_vars: EmVars,
    strict: bool,
    psd_tolerance: f64,
}

impl EmConfig {
    /// Creates a configuration with defaults.
    ///
    /// Defaults: `n_iter = 5`, no tolerance, `em_vars = {A, Q, R}`,
    /// `strict = false`, `psd_tolerance = 1e-10`.
    pub fn new() -> Self {
        Self {
            n_iter: 5,
            tolerance: None,
            em_vars: EmVars::default(),
            strict: false,
            psd_tolerance: 1e-10,
        }
    }

    /// Sets the maximum number of EM iterations.
    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    /// Sets the absolute log-likelihood change below which EM stops early.
    pub fn with_tolerance(mut self, tolerance: Option<f64>) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the learnable parameters.
    pub fn with_em_vars(mut self, em_vars: EmVars) -> Self {
        self.em_vars = em_vars;
        self
    }

    /// Turns diagnostics into errors.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the tolerance (relative to the matrix scale) for negative
    /// eigenvalues of updated covariances.
    pub fn with_psd_tolerance(mut self, psd_tolerance: f64) -> Self {
        self.psd_tolerance = psd_tolerance;
        self
    }

    // --- Accessors ---

    /// Returns the maximum number of iterations.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Returns the convergence tolerance.
    pub fn tolerance(&self) -> Option<f64> {
        self.tolerance
    }

    /// Returns the learnable parameters.
    pub fn em_vars(&self) -> EmVars {
        self.em_vars
    }

    /// Returns whether strict mode is on.
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Returns the PSD tolerance.
    pub fn psd_tolerance(&self) -> f64 {
        self.psd_tolerance
    }

    /// Validates this configuration.
    ///
    /// Requires `n_iter ≥ 1` and finite, non-negative tolerances.
    pub fn validate(&self) -> Result<(), SsmError> {
        if self.n_iter == 0 {
            return Err(SsmError::config("n_iter must be at least 1"));
        }
        if let Some(tol) = self.tolerance {
            if !tol.is_finite() || tol < 0.0 {
                return Err(SsmError::config(format!(
                    "tolerance must be finite and non-negative, got {tol}"
                )));
            }
        }
        if !self.psd_tolerance.is_finite() || self.psd_tolerance < 0.0 {
            return Err(SsmError::config(format!(
                "psd_tolerance must be finite and non-negative, got {}",
                self.psd_tolerance
            )));
        }
        Ok(())
    }
}

impl Default for EmConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EmConfig::new();
        assert_eq!(cfg.n_iter(), 5);
        assert_eq!(cfg.tolerance(), None);
        assert!(!cfg.strict());
        assert!((cfg.psd_tolerance() - 1e-10).abs() < f64::EPSILON);
        let vars: Vec<_> = cfg.em_vars().iter().collect();
        assert_eq!(
            vars,
            vec![
                EmParam::TransitionMatrix,
                EmParam::TransitionCovariance,
                EmParam::ObservationCovariance
            ]
        );
    }

    #[test]
    fn builder_chain() {
        let cfg = EmConfig::new()
            .with_n_iter(12)
            .with_tolerance(Some(1e-4))
            .with_em_vars(EmVars::all())
            .with_strict(true)
            .with_psd_tolerance(1e-8);
        assert_eq!(cfg.n_iter(), 12);
        assert_eq!(cfg.tolerance(), Some(1e-4));
        assert_eq!(cfg.em_vars(), EmVars::all());
        assert!(cfg.strict());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_zero_iterations() {
        let err = EmConfig::new().with_n_iter(0).validate().unwrap_err();
        assert!(err.to_string().contains("n_iter"));
    }

    #[test]
    fn validate_bad_tolerance() {
        assert!(EmConfig::new().with_tolerance(Some(-1.0)).validate().is_err());
        assert!(EmConfig::new().with_tolerance(Some(f64::NAN)).validate().is_err());
        assert!(EmConfig::new().with_psd_tolerance(f64::INFINITY).validate().is_err());
    }

    #[test]
    fn param_names_round_trip() {
        for p in EmParam::ALL {
            assert_eq!(p.name().parse::<EmParam>().unwrap(), p);
            assert_eq!(p.to_string(), p.name());
        }
        assert!("observation_matrix".parse::<EmParam>().is_err());
    }

    #[test]
    fn vars_set_operations() {
        let vars = EmVars::all().without(EmParam::InitialStateMean);
        assert!(!vars.contains(EmParam::InitialStateMean));
        assert_eq!(vars.iter().count(), 6);
        assert!(EmVars::none().is_empty());
        let collected: EmVars = [EmParam::TransitionOffsets].into_iter().collect();
        assert!(collected.contains(EmParam::TransitionOffsets));
        assert_eq!(collected.iter().count(), 1);
    }
}
