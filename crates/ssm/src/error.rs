//! Error types for the yieldkf-ssm crate.

use std::fmt;

/// Which covariance failed to factorise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovarianceStage {
    /// Innovation covariance `S = C·P·Cᵀ + R` in the filter update.
    Innovation,
    /// One-step-ahead predicted state covariance, inverted by the smoother.
    Predicted,
    /// Observation noise block of the present dimensions, used by the EM
    /// residual moments when some dimensions are missing.
    ObservationNoise,
    /// Accumulated second moment of the lagged states, inverted by the
    /// transition-matrix M-step.
    StateMoments,
}

impl fmt::Display for CovarianceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Innovation => "innovation",
            Self::Predicted => "predicted state",
            Self::ObservationNoise => "observation noise",
            Self::StateMoments => "state moment",
        };
        f.write_str(name)
    }
}

/// Error type for all fallible operations in the yieldkf-ssm crate.
///
/// Every failure is local and synchronous. No variant carries a partially
/// updated model.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SsmError {
    /// Returned when the model or its inputs are malformed: empty maturity
    /// list, non-square or asymmetric covariance, mismatched dimensions,
    /// non-finite values, or an invalid EM configuration.
    #[error("configuration error: {reason}")]
    Configuration {
        /// Description of the violated requirement.
        reason: String,
    },

    /// Returned when a covariance that must be inverted is not positive
    /// definite. Adding a small value to the diagonal of the observation
    /// covariance is the usual retry.
    #[error("singular {stage} covariance at step {t}")]
    SingularCovariance {
        /// Covariance that failed.
        stage: CovarianceStage,
        /// Zero-based time index of the failure.
        t: usize,
    },

    /// Returned in strict EM mode when the log-likelihood decreases or an
    /// updated covariance loses positive semi-definiteness.
    #[error("numerical divergence at EM iteration {iteration}: {reason}")]
    NumericalDivergence {
        /// EM iteration (1-based) that produced the divergence.
        iteration: usize,
        /// Description of the divergence.
        reason: String,
    },
}

impl SsmError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn singular(stage: CovarianceStage) -> Self {
        Self::SingularCovariance { stage, t: 0 }
    }

    /// Stamps the time index onto a [`SsmError::SingularCovariance`].
    pub(crate) fn at_step(self, step: usize) -> Self {
        match self {
            Self::SingularCovariance { stage, .. } => Self::SingularCovariance { stage, t: step },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_configuration() {
        let err = SsmError::config("maturity list is empty");
        assert_eq!(
            err.to_string(),
            "configuration error: maturity list is empty"
        );
    }

    #[test]
    fn error_singular_covariance() {
        let err = SsmError::SingularCovariance {
            stage: CovarianceStage::Innovation,
            t: 7,
        };
        assert_eq!(err.to_string(), "singular innovation covariance at step 7");
    }

    #[test]
    fn error_singular_predicted() {
        let err = SsmError::singular(CovarianceStage::Predicted).at_step(3);
        assert_eq!(
            err.to_string(),
            "singular predicted state covariance at step 3"
        );
    }

    #[test]
    fn error_numerical_divergence() {
        let err = SsmError::NumericalDivergence {
            iteration: 2,
            reason: "log-likelihood decreased".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "numerical divergence at EM iteration 2: log-likelihood decreased"
        );
    }

    #[test]
    fn at_step_leaves_other_variants() {
        let err = SsmError::config("bad").at_step(5);
        assert!(matches!(err, SsmError::Configuration { .. }));
    }

    #[test]
    fn error_is_std_error() {
        fn assert_impl<T: std::error::Error>() {}
        assert_impl::<SsmError>();
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_impl<T: Send + Sync>() {}
        assert_impl::<SsmError>();
    }
}
